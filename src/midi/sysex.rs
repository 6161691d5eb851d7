use crate::midi::{CodeIndexNumber, MessageState, MidiError, Packet};
use heapless::Vec;

/// Sysex sequence start, _not_ a channel status byte
pub const SYSEX_START: u8 = 0xF0;
/// Sysex sequence terminator, _not_ a status byte
pub const SYSEX_END: u8 = 0xF7;

/// Largest message the pedal exchanges, a full patch dump
pub const MAX_SYSEX_LEN: usize = 146;

pub type SysexMessage = Vec<u8, MAX_SYSEX_LEN>;

/// Number of USB-MIDI packets needed to carry `len` sysex bytes
pub fn packet_count(len: usize) -> usize {
    (len + 2) / 3
}

/// Splits a complete sysex message into USB-MIDI packets.
/// Every packet carries three bytes with CIN 0x4 except the last one,
/// which uses 0x5, 0x6 or 0x7 depending on how many bytes remain.
#[derive(Debug, Clone)]
pub struct SysexPackets<'a> {
    message: &'a [u8],
    // bytes already packed
    sent: usize,
}

impl<'a> SysexPackets<'a> {
    pub fn new(message: &'a [u8]) -> Result<Self, MidiError> {
        match (message.first(), message.last()) {
            (Some(&SYSEX_START), Some(&SYSEX_END)) => Ok(SysexPackets { message, sent: 0 }),
            _ => Err(MidiError::NotASysex),
        }
    }
}

impl<'a> Iterator for SysexPackets<'a> {
    type Item = Packet;

    fn next(&mut self) -> Option<Self::Item> {
        let remaining = self.message.len().checked_sub(self.sent).filter(|r| *r > 0)?;
        let (cin, len) = if remaining > 3 {
            (CodeIndexNumber::Sysex, 3)
        } else {
            (CodeIndexNumber::end_sysex(remaining).ok()?, remaining)
        };
        let packet = Packet::with_payload(cin, &self.message[self.sent..self.sent + len]).ok()?;
        self.sent += len;
        Some(packet)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = packet_count(self.message.len() - self.sent);
        (left, Some(left))
    }
}

impl<'a> ExactSizeIterator for SysexPackets<'a> {}

/// Reassembles one sysex message at a time from USB-MIDI packets.
/// The whole packet body is scanned regardless of CIN, padding is harmless
/// since the terminator is detected explicitly.
#[derive(Debug, Default)]
pub struct SysexCapture {
    buffer: SysexMessage,
    state: MessageState,
}

impl SysexCapture {
    pub fn new() -> Self {
        SysexCapture::default()
    }

    /// Scan a packet body, returns the resulting capture state.
    /// Overflowing the buffer drops the partial message.
    pub fn push_packet(&mut self, packet: &Packet) -> Result<MessageState, MidiError> {
        for byte in packet.body().iter().copied() {
            if byte == SYSEX_START {
                // a new message always restarts capture
                self.buffer.clear();
                self.state = MessageState::Reading;
                self.append(byte)?;
            } else if self.state == MessageState::Reading {
                self.append(byte)?;
                if byte == SYSEX_END {
                    self.state = MessageState::Complete;
                    break;
                }
            }
        }
        Ok(self.state)
    }

    fn append(&mut self, byte: u8) -> Result<(), MidiError> {
        if self.buffer.push(byte).is_err() {
            self.clear();
            return Err(MidiError::SysexBufferFull);
        }
        Ok(())
    }

    pub fn state(&self) -> MessageState {
        self.state
    }

    pub fn is_complete(&self) -> bool {
        self.state == MessageState::Complete
    }

    /// The captured message, only once the terminator was seen
    pub fn message(&self) -> Option<&[u8]> {
        if self.is_complete() {
            Some(&self.buffer)
        } else {
            None
        }
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.state = MessageState::Empty;
    }
}
