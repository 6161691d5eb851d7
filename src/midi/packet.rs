//! USB-MIDI Event Packet definitions
//! USB-MIDI is a superset of the MIDI protocol

use crate::midi::{Channel, MidiError, Program};
use core::convert::TryFrom;
use CodeIndexNumber::*;

use num_enum::{TryFromPrimitive, TryFromPrimitiveError};

/// Status nibble of a Program Change channel message
const PROGRAM_CHANGE_STATUS: u8 = 0xC0;

#[derive(Default, Clone, Copy, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Packet {
    bytes: [u8; 4],
}

impl Packet {
    pub fn from_raw(bytes: [u8; 4]) -> Self {
        Packet { bytes }
    }

    /// Build a packet from a CIN and up to three payload bytes, zero padded
    pub fn with_payload(cin: CodeIndexNumber, payload: &[u8]) -> Result<Self, MidiError> {
        if payload.len() > 3 {
            return Err(MidiError::SysexOutOfBounds);
        }
        let mut bytes = [0; 4];
        bytes[0] = cin as u8;
        bytes[1..payload.len() + 1].copy_from_slice(payload);
        Ok(Packet { bytes })
    }

    pub fn program_change(channel: Channel, program: Program) -> Self {
        Packet {
            bytes: [ProgramChange as u8, PROGRAM_CHANGE_STATUS | channel.nibble(), u8::from(program), 0],
        }
    }

    pub fn cable_number(&self) -> u8 {
        self.bytes[0] >> 4
    }

    pub fn code_index_number(&self) -> Result<CodeIndexNumber, MidiError> {
        Ok(CodeIndexNumber::try_from(self.bytes[0] & 0x0F)?)
    }

    /// The three MIDI bytes following the header, padding included
    pub fn body(&self) -> &[u8] {
        &self.bytes[1..]
    }

    pub fn bytes(&self) -> &[u8; 4] {
        &self.bytes
    }
}

/// The Code Index Number(CIN) indicates the classification
/// of the bytes in the MIDI_x fields
#[allow(unused)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, TryFromPrimitive)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum CodeIndexNumber {
    /// Miscellaneous function codes. Reserved for future extensions
    MiscFunction = 0x00,
    /// Cable events. Reserved for future expansion.
    CableEvents = 0x1,
    /// Two-byte System Common messages like MTC, SongSelect, etc.
    SystemCommonLen2 = 0x2,
    /// Three-byte System Common messages like SPP, etc.
    SystemCommonLen3 = 0x3,
    /// SysEx starts or continues
    Sysex = 0x4,
    /// Single-byte System Common Message or SysEx ends with following single byte.
    SysexEndsNext1 = 0x5,
    /// SysEx ends with following two bytes
    SysexEndsNext2 = 0x6,
    /// SysEx ends with following three bytes
    SysexEndsNext3 = 0x7,

    /// Note Off
    NoteOff = 0x8,
    /// Note On
    NoteOn = 0x9,
    /// Poly-KeyPess
    PolyKeypress = 0xA,
    /// Control Change
    ControlChange = 0xB,
    /// Program Change
    ProgramChange = 0xC,
    /// Channel Pressure
    ChannelPressure = 0xD,
    /// Pitch Bend Change
    PitchbendChange = 0xE,

    /// Single Byte
    SingleByte = 0xF,
}

impl From<TryFromPrimitiveError<CodeIndexNumber>> for MidiError {
    fn from(err: TryFromPrimitiveError<CodeIndexNumber>) -> Self {
        MidiError::InvalidCodeIndexNumber(err.number)
    }
}

impl CodeIndexNumber {
    /// CIN of the packet carrying the last `len` bytes of a sysex
    pub fn end_sysex(len: usize) -> Result<CodeIndexNumber, MidiError> {
        match len {
            1 => Ok(SysexEndsNext1),
            2 => Ok(SysexEndsNext2),
            3 => Ok(SysexEndsNext3),
            _ => Err(MidiError::SysexOutOfBounds)
        }
    }

    pub fn is_sysex(&self) -> bool {
        matches!(self, Sysex | SysexEndsNext1 | SysexEndsNext2 | SysexEndsNext3)
    }

    pub fn payload_len(&self) -> usize {
        match self {
            MiscFunction | CableEvents => 0,
            SysexEndsNext1 | SingleByte => 1,
            SystemCommonLen2 | SysexEndsNext2 | ProgramChange | ChannelPressure => 2,
            _ => 3,
        }
    }
}
