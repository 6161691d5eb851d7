//! Front panel buttons, debounced elsewhere and reported on release.

/// Buttons on the remote
pub const BUTTON_COUNT: u8 = 8;

const PROGRAM_DOWN: u8 = 0;
const PROGRAM_UP: u8 = 1;
const FIRST_EFFECT: u8 = 2;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Button(pub u8);

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ButtonAction {
    ProgramDown,
    ProgramUp,
    /// Select and toggle an effect slot, 0-5
    ToggleEffect(u8),
}

impl Button {
    pub fn action(&self) -> Option<ButtonAction> {
        match self.0 {
            PROGRAM_DOWN => Some(ButtonAction::ProgramDown),
            PROGRAM_UP => Some(ButtonAction::ProgramUp),
            n if n < BUTTON_COUNT => Some(ButtonAction::ToggleEffect(n - FIRST_EFFECT)),
            _ => None,
        }
    }
}
