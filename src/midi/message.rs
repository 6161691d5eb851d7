use crate::midi::{Channel, Cull, Packet, Program, U7};

/// Lifecycle of an inbound message, shared by sysex and program change
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MessageState {
    #[default]
    Empty,
    Reading,
    Complete,
}

/// Last Program Change received from the device, consumed once
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ProgramChangeMessage {
    program: Program,
    channel: u8,
    state: MessageState,
}

impl ProgramChangeMessage {
    /// Decode the body of a CIN 0xC packet, status byte then program
    pub fn capture(&mut self, packet: &Packet) {
        let body = packet.body();
        self.channel = Channel::from_status(body[0]).number();
        self.program = U7::cull(body[1]);
        self.state = MessageState::Complete;
    }

    pub fn is_complete(&self) -> bool {
        self.state == MessageState::Complete
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn program(&self) -> Program {
        self.program
    }

    /// 1-16
    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// Take the program out, leaving the message Empty
    pub fn consume(&mut self) -> Option<Program> {
        if !self.is_complete() {
            return None;
        }
        let program = self.program;
        self.clear();
        Some(program)
    }

    pub fn clear(&mut self) {
        *self = ProgramChangeMessage::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_channel_and_program() {
        let mut pc = ProgramChangeMessage::default();
        assert_eq!(pc.state(), MessageState::Empty);
        pc.capture(&Packet::from_raw([0x0C, 0xC3, 0x21, 0x00]));
        assert!(pc.is_complete());
        assert_eq!(pc.channel(), 4);
        assert_eq!(u8::from(pc.program()), 0x21);
    }

    #[test]
    fn consume_once() {
        let mut pc = ProgramChangeMessage::default();
        pc.capture(&Packet::from_raw([0x0C, 0xC0, 7, 0x00]));
        assert_eq!(pc.consume().map(u8::from), Some(7));
        assert_eq!(pc.consume(), None);
        assert_eq!(pc.channel(), 0);
    }
}
