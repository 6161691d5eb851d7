//! Zoom MS-70CDR editor protocol and patch dump layout.
//! The pedal answers the universal identity request, accepts editor mode
//! and exchanges its current patch as a single 146 bytes sysex dump.

use crate::midi::{MidiError, SYSEX_END, SYSEX_START, U7};
use core::convert::TryFrom;

pub const ZOOM: u8 = 0x52;
pub const MS_70CDR: u8 = 0x61;

const UNIVERSAL_NON_REALTIME: u8 = 0x7E;

/// Dump type tag at offset 4 of a patch message
pub const PATCH_DATA: u8 = 0x28;

const EDIT_ENABLE: u8 = 0x50;
const EDIT_DISABLE: u8 = 0x51;
const PARAMETER_EDIT: u8 = 0x31;
const PROGRAM_REQUEST: u8 = 0x33;
const PATCH_REQUEST: u8 = 0x29;

pub const PATCH_LEN: usize = 146;
pub const IDENTITY_RESPONSE_LEN: usize = 15;

/// Patch slots addressable by the pedal
pub const MAX_SLOTS: usize = 6;

pub const IDENTITY_REQUEST: [u8; 6] = [SYSEX_START, UNIVERSAL_NON_REALTIME, 0x00, 0x06, 0x01, SYSEX_END];
pub const EDITOR_ON: [u8; 6] = [SYSEX_START, ZOOM, 0x00, MS_70CDR, EDIT_ENABLE, SYSEX_END];
pub const EDITOR_OFF: [u8; 6] = [SYSEX_START, ZOOM, 0x00, MS_70CDR, EDIT_DISABLE, SYSEX_END];
pub const CURRENT_PROGRAM_REQUEST: [u8; 6] = [SYSEX_START, ZOOM, 0x00, MS_70CDR, PROGRAM_REQUEST, SYSEX_END];
pub const CURRENT_PATCH_REQUEST: [u8; 6] = [SYSEX_START, ZOOM, 0x00, MS_70CDR, PATCH_REQUEST, SYSEX_END];

// byte offsets inside the patch dump
const SLOT_LOW_IDX: usize = 129;
const SLOT_MID_IDX: usize = 125;
const SLOT_HIGH_IDX: usize = 130;
const HEADER_TYPE_IDX: usize = 4;
const IDENTITY_MODEL_IDX: usize = 6;

/// Byte holding the on/off bit of each effect slot
const EFFECT_STATE_IDX: [usize; MAX_SLOTS] = [6, 26, 47, 67, 88, 108];

/// Identity reply from the pedal, matched on size and model byte
pub fn is_identity_response(message: &[u8]) -> bool {
    message.len() == IDENTITY_RESPONSE_LEN && message[IDENTITY_MODEL_IDX] == MS_70CDR
}

/// Current patch dump
pub fn is_patch_dump(message: &[u8]) -> bool {
    message.len() == PATCH_LEN && message[HEADER_TYPE_IDX] == PATCH_DATA
}

/// 10 bytes parameter message, shared by effect toggling and parameter editing.
/// `F0 52 00 61 31 <effect> <param> <value> 00 F7`
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ParamEdit([u8; 10]);

impl Default for ParamEdit {
    fn default() -> Self {
        ParamEdit([SYSEX_START, ZOOM, 0x00, MS_70CDR, PARAMETER_EDIT, 0x00, 0x00, 0x00, 0x00, SYSEX_END])
    }
}

impl ParamEdit {
    const EFFECT: usize = 5;
    const PARAM: usize = 6;
    const VALUE: usize = 7;

    /// Switch an effect slot on or off
    pub fn toggle_effect(effect: U7, on: bool) -> Self {
        let mut edit = ParamEdit::default();
        edit.0[Self::EFFECT] = u8::from(effect);
        edit.0[Self::VALUE] = on as u8;
        edit
    }

    /// Parameters are numbered from 0, the pedal expects them shifted by 2.
    /// The shifted number must still be a data byte.
    pub fn parameter(effect: U7, param: U7, value: U7) -> Result<Self, MidiError> {
        let shifted = U7::try_from(u8::from(param) + 2)?;
        let mut edit = ParamEdit::default();
        edit.0[Self::EFFECT] = u8::from(effect);
        edit.0[Self::PARAM] = u8::from(shifted);
        edit.0[Self::VALUE] = u8::from(value);
        Ok(edit)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

bitfield! {
    /// Byte 130, high bit of the selected slot and count of usable effects
    pub struct SlotHigh(u8); impl Debug;
    pub slot_high, set_slot_high: 0;
    pub max_effects, set_max_effects: 4, 2;
}

bitfield! {
    /// Byte 125
    pub struct SlotMid(u8); impl Debug;
    pub slot_mid, set_slot_mid: 3;
}

bitfield! {
    /// Byte 129
    pub struct SlotLow(u8); impl Debug;
    pub slot_low, set_slot_low: 6;
}

bitfield! {
    /// First byte of an effect block, LSB switches the effect
    pub struct EffectState(u8); impl Debug;
    pub enabled, set_enabled: 0;
}

/// Working copy of the current patch dump, sysex framing included.
/// Derived fields are meaningless unless `is_valid()`.
#[derive(Clone, PartialEq, Eq)]
pub struct PatchBlob([u8; PATCH_LEN]);

impl Default for PatchBlob {
    fn default() -> Self {
        PatchBlob([0; PATCH_LEN])
    }
}

impl core::fmt::Debug for PatchBlob {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "PatchBlob({:02x?})", &self.0[..])
    }
}

impl PatchBlob {
    pub fn from_slice(dump: &[u8]) -> Result<Self, MidiError> {
        let mut blob = PatchBlob::default();
        if dump.len() != PATCH_LEN {
            return Err(MidiError::SysexOutOfBounds);
        }
        blob.0.copy_from_slice(dump);
        Ok(blob)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_valid(&self) -> bool {
        self.0[0] == SYSEX_START && self.0[HEADER_TYPE_IDX] == PATCH_DATA
    }

    /// Number of effects the patch can hold, 3 bits
    pub fn max_effects(&self) -> u8 {
        SlotHigh(self.0[SLOT_HIGH_IDX]).max_effects()
    }

    /// Slot bits as stored, in reverse order of the pedal's numbering
    fn slot_index(&self) -> u8 {
        ((SlotHigh(self.0[SLOT_HIGH_IDX]).slot_high() as u8) << 2)
            | ((SlotMid(self.0[SLOT_MID_IDX]).slot_mid() as u8) << 1)
            | SlotLow(self.0[SLOT_LOW_IDX]).slot_low() as u8
    }

    /// Selected effect as the pedal reports it, `6 - index`
    pub fn effect_number(&self) -> u8 {
        6u8.wrapping_sub(self.slot_index())
    }

    /// Selected effect slot, zero based, the inverse of `set_current_effect`
    pub fn current_effect(&self) -> u8 {
        self.effect_number().wrapping_sub(1)
    }

    /// Select slot `n` (0-5), only the three slot bits are touched
    pub fn set_current_effect(&mut self, n: u8) {
        if n as usize >= MAX_SLOTS {
            return;
        }
        let index = 5 - n;

        let mut low = SlotLow(self.0[SLOT_LOW_IDX]);
        low.set_slot_low(index & 0b001 != 0);
        self.0[SLOT_LOW_IDX] = low.0;

        let mut mid = SlotMid(self.0[SLOT_MID_IDX]);
        mid.set_slot_mid(index & 0b010 != 0);
        self.0[SLOT_MID_IDX] = mid.0;

        let mut high = SlotHigh(self.0[SLOT_HIGH_IDX]);
        high.set_slot_high(index & 0b100 != 0);
        self.0[SLOT_HIGH_IDX] = high.0;
    }

    fn effect_offset(&self, n: u8) -> Option<usize> {
        if n < self.max_effects() {
            EFFECT_STATE_IDX.get(n as usize).copied()
        } else {
            None
        }
    }

    /// False for slots outside `[0, max_effects)`
    pub fn effect_enabled(&self, n: u8) -> bool {
        self.effect_offset(n)
            .map(|idx| EffectState(self.0[idx]).enabled())
            .unwrap_or(false)
    }

    /// Flips the effect switch, the byte moves by exactly one since the switch is its LSB
    pub fn toggle_effect_enabled(&mut self, n: u8) {
        if let Some(idx) = self.effect_offset(n) {
            let mut state = EffectState(self.0[idx]);
            let enabled = state.enabled();
            state.set_enabled(!enabled);
            self.0[idx] = state.0;
        }
    }
}
