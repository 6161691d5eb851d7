use crate::devices::zoom::ms70cdr::PatchBlob;
use crate::midi::Program;

/// Bus address assigned by the USB host stack
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress(pub u8);

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeviceStatus {
    #[default]
    Disconnected,
    Connected,
    Ready,
    Identified,
    IdentifiedNotSupported,
    EditorOn,
}

/// The one pedal the remote talks to
#[derive(Debug, Default)]
pub struct DeviceSession {
    address: Option<DeviceAddress>,
    status: DeviceStatus,
    program: Program,
    current_effect: u8,
    max_effects: u8,
    patch: PatchBlob,
}

impl DeviceSession {
    pub fn mount(&mut self, address: DeviceAddress) {
        *self = DeviceSession::default();
        self.address = Some(address);
        self.status = DeviceStatus::Connected;
    }

    pub fn unmount(&mut self) {
        *self = DeviceSession::default();
    }

    pub fn address(&self) -> Option<DeviceAddress> {
        self.address
    }

    /// Packets from other devices are not ours
    pub fn owns(&self, address: DeviceAddress) -> bool {
        self.address == Some(address)
    }

    pub fn status(&self) -> DeviceStatus {
        self.status
    }

    pub fn set_status(&mut self, status: DeviceStatus) {
        if self.status != status {
            debug!("device {:?} -> {:?}", self.status, status);
            self.status = status;
        }
    }

    /// Identified pedal, editor mode or not
    pub fn is_identified(&self) -> bool {
        matches!(self.status, DeviceStatus::Identified | DeviceStatus::EditorOn)
    }

    pub fn program(&self) -> Program {
        self.program
    }

    pub fn set_program(&mut self, program: Program) {
        self.program = program;
    }

    pub fn current_effect(&self) -> u8 {
        self.current_effect
    }

    pub fn max_effects(&self) -> u8 {
        self.max_effects
    }

    pub fn patch(&self) -> &PatchBlob {
        &self.patch
    }

    pub fn patch_mut(&mut self) -> &mut PatchBlob {
        &mut self.patch
    }

    /// Replace the working patch and derive the cached fields from it
    pub fn load_patch(&mut self, patch: PatchBlob) {
        self.patch = patch;
        self.refresh();
    }

    /// Re-derive slot and effect count after local edits
    pub fn refresh(&mut self) {
        if self.patch.is_valid() {
            self.max_effects = self.patch.max_effects();
            self.current_effect = self.patch.current_effect();
        }
    }
}
