use crate::input::Button;
use crate::midi::{MidiError, Packet, SysexPackets, Transport};
use crate::session::DeviceAddress;
use heapless::Vec;

/// Largest burst produced by one event: a full patch dump, its flush and a request
pub const MAX_ACTIONS: usize = 64;

/// Everything the outside world can tell the controller
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Event {
    /// Device enumerated by the host stack
    Mounted(DeviceAddress),
    /// Descriptors checked, MIDI endpoints usable
    Configured(DeviceAddress),
    Unmounted(DeviceAddress),
    Packet(DeviceAddress, Packet),
    ButtonReleased(Button),
    /// Nothing happened, still give the controller a chance to progress
    Poll,
}

/// Transport side effects requested by the controller, applied in order
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Action {
    Write(Packet),
    Flush,
}

#[derive(Debug, Default)]
pub struct Actions {
    actions: Vec<Action, MAX_ACTIONS>,
}

impl Actions {
    pub fn push(&mut self, action: Action) -> Result<(), MidiError> {
        self.actions.push(action).map_err(|_| MidiError::BufferFull)
    }

    /// Frame a sysex message and flush it
    pub fn send_sysex(&mut self, message: &[u8]) -> Result<(), MidiError> {
        for packet in SysexPackets::new(message)? {
            self.push(Action::Write(packet))?;
        }
        self.push(Action::Flush)
    }

    /// Single packet message, flushed
    pub fn send_packet(&mut self, packet: Packet) -> Result<(), MidiError> {
        self.push(Action::Write(packet))?;
        self.push(Action::Flush)
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, Action> {
        self.actions.iter()
    }

    /// Outbound packets only
    pub fn packets(&self) -> impl Iterator<Item = Packet> + '_ {
        self.actions.iter().filter_map(|action| match action {
            Action::Write(packet) => Some(*packet),
            Action::Flush => None,
        })
    }

    pub fn apply(&self, transport: &mut impl Transport) -> Result<(), MidiError> {
        for action in self.actions.iter() {
            match action {
                Action::Write(packet) => transport.write_packet(*packet)?,
                Action::Flush => transport.flush()?,
            }
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Actions {
    type Item = &'a Action;
    type IntoIter = core::slice::Iter<'a, Action>;

    fn into_iter(self) -> Self::IntoIter {
        self.actions.iter()
    }
}
