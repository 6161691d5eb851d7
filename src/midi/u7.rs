use crate::midi::MidiError;
use core::convert::TryFrom;

/// Just strip higher bits
pub trait Cull<T>: Sized {
    fn cull(_: T) -> Self;
}

/// Saturate to T::MAX
pub trait Saturate<T>: Sized {
    fn saturate(_: T) -> Self;
}

/// A primitive value that can be from 0-0x7F
#[derive(Copy, Clone, Debug, Eq, PartialOrd, PartialEq, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct U7(u8);

impl TryFrom<u8> for U7 {
    type Error = MidiError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        if value > U7::MAX.0 {
            Err(MidiError::InvalidU7(value))
        } else {
            Ok(U7(value))
        }
    }
}

impl From<U7> for u8 {
    fn from(value: U7) -> u8 {
        value.0
    }
}

impl Cull<u8> for U7 {
    fn cull(value: u8) -> U7 {
        U7(value & 0b0111_1111)
    }
}

impl Saturate<u8> for U7 {
    fn saturate(value: u8) -> U7 {
        U7(value.min(U7::MAX.0))
    }
}

impl U7 {
    pub const MAX: U7 = U7(0x7F);
    pub const MIN: U7 = U7(0);

    /// Clamp into `[min, max]`, bounds given as raw bytes
    pub fn clamp_to(value: u8, min: u8, max: u8) -> U7 {
        U7::saturate(value.max(min).min(max))
    }
}
