mod u7;
mod packet;
mod sysex;
mod message;

pub use u7::{U7, Cull, Saturate};
pub use packet::{CodeIndexNumber, Packet};
pub use sysex::{SysexCapture, SysexPackets, SysexMessage, SYSEX_START, SYSEX_END, MAX_SYSEX_LEN, packet_count};
pub use message::{MessageState, ProgramChangeMessage};

pub type Program = U7;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
/// MIDI channel, stored as 0-15
pub struct Channel(u8);

/// "Natural" channel builder, takes integers 1-16 as input, clamps to that range
pub fn channel(ch: u8) -> Channel {
    Channel(ch.max(1).min(16) - 1)
}

impl Channel {
    /// Channel from the low nibble of a channel status byte
    pub fn from_status(status: u8) -> Self {
        Channel(status & 0x0F)
    }

    /// 1-16
    pub fn number(&self) -> u8 {
        self.0 + 1
    }

    /// 0-15, as encoded in status bytes
    pub fn nibble(&self) -> u8 {
        self.0
    }
}

/// Host side of the USB-MIDI link to the pedal.
/// Enumeration, descriptor checks and endpoint I/O belong to the implementor.
pub trait Transport {
    /// Queue a single packet for the device
    fn write_packet(&mut self, packet: Packet) -> Result<(), MidiError>;

    /// Push queued packets out, called once after a complete message
    fn flush(&mut self) -> Result<(), MidiError>;

    /// Next packet received from the device, if any
    fn receive(&mut self) -> Result<Option<Packet>, MidiError>;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum MidiError {
    InvalidCodeIndexNumber(u8),
    InvalidU7(u8),
    InvalidChannel(u8),
    /// Effect slot beyond the six a patch holds
    InvalidEffectSlot(u8),
    /// Outbound message does not start with 0xF0 and end with 0xF7
    NotASysex,
    SysexOutOfBounds,
    /// Inbound message longer than the capture buffer
    SysexBufferFull,
    /// Too many actions produced by a single event
    BufferFull,
    TransportError,
    /// LED pin refused a write
    OutputPinError,
}
