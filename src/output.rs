//! Front panel LEDs.
//! LED 0 shows a usable pedal, LED 1 a successful identification,
//! LEDs 2-7 the on/off state of effect slots 0-5.

use crate::devices::zoom::ms70cdr::MAX_SLOTS;
use crate::session::{DeviceSession, DeviceStatus};
use embedded_hal::digital::v2::OutputPin;

pub const LED_COUNT: usize = 8;

const READY_LED: usize = 0;
const IDENTIFIED_LED: usize = 1;
const FIRST_EFFECT_LED: usize = 2;

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct LedStates(pub [bool; LED_COUNT]);

impl LedStates {
    /// All off
    pub const DARK: LedStates = LedStates([false; LED_COUNT]);

    pub fn from_session(session: &DeviceSession) -> Self {
        let mut leds = LedStates::DARK;
        leds.0[READY_LED] = matches!(session.status(),
            DeviceStatus::Ready | DeviceStatus::Identified | DeviceStatus::IdentifiedNotSupported | DeviceStatus::EditorOn);
        leds.0[IDENTIFIED_LED] = session.is_identified();

        // effect bits are garbage without a patch
        let patch = session.patch();
        if patch.is_valid() {
            for slot in 0..MAX_SLOTS.min(patch.max_effects() as usize) {
                leds.0[FIRST_EFFECT_LED + slot] = patch.effect_enabled(slot as u8);
            }
        }
        leds
    }

    pub fn is_on(&self, led: usize) -> bool {
        self.0.get(led).copied().unwrap_or(false)
    }
}

/// Drives eight output pins from LED states
pub struct LedBank<P> {
    pins: [P; LED_COUNT],
    shown: Option<LedStates>,
}

impl<P: OutputPin> LedBank<P> {
    pub fn new(pins: [P; LED_COUNT]) -> Self {
        LedBank { pins, shown: None }
    }

    /// Only touches the pins when the states changed
    pub fn render(&mut self, leds: &LedStates) -> Result<(), P::Error> {
        if self.shown.as_ref() == Some(leds) {
            return Ok(());
        }
        for (pin, on) in self.pins.iter_mut().zip(leds.0.iter()) {
            if *on {
                pin.set_high()?;
            } else {
                pin.set_low()?;
            }
        }
        self.shown = Some(*leds);
        Ok(())
    }

    pub fn shown(&self) -> Option<LedStates> {
        self.shown
    }

    pub fn release(self) -> [P; LED_COUNT] {
        self.pins
    }
}
