use crate::apps::ms70cdr_control::Controller;
use crate::event::Event;
use crate::midi::{MidiError, Transport};
use crate::output::LedBank;
use crate::time::Instant;
use embedded_hal::digital::v2::OutputPin;

/// One pass of the cooperative main loop: drain the pedal, feed events,
/// write what the controller asks for and refresh the LEDs.
pub struct ControlLoop<T, P> {
    controller: Controller,
    transport: T,
    leds: LedBank<P>,
}

impl<T: Transport, P: OutputPin> ControlLoop<T, P> {
    pub fn new(controller: Controller, transport: T, leds: LedBank<P>) -> Self {
        ControlLoop { controller, transport, leds }
    }

    pub fn tick(&mut self, now: Instant, events: impl IntoIterator<Item = Event>) -> Result<(), MidiError> {
        while let Some(packet) = self.transport.receive()? {
            match self.controller.session().address() {
                Some(address) => self.handle(now, Event::Packet(address, packet))?,
                None => trace!("no device, dropped {:?}", packet),
            }
        }
        for event in events {
            self.handle(now, event)?;
        }
        self.handle(now, Event::Poll)?;

        self.leds.render(&self.controller.leds()).map_err(|_| MidiError::OutputPinError)
    }

    fn handle(&mut self, now: Instant, event: Event) -> Result<(), MidiError> {
        let actions = self.controller.handle_event(now, event)?;
        actions.apply(&mut self.transport)
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn controller_mut(&mut self) -> &mut Controller {
        &mut self.controller
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn leds(&self) -> &LedBank<P> {
        &self.leds
    }

    pub fn into_parts(self) -> (Controller, T, LedBank<P>) {
        (self.controller, self.transport, self.leds)
    }
}
