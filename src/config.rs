use crate::midi::{channel, Channel};
use crate::time::Duration;

/// Programs the pedal exposes through the remote
pub const PROGRAM_RANGE: (u8, u8) = (1, 49);

#[derive(Clone, Copy, Debug)]
pub struct ControllerConfig {
    /// Max wait for the pedal's answer before giving up on a task
    pub response_timeout: Duration,
    /// Queue a new identification after a timeout
    pub reidentify_on_timeout: bool,
    /// Channel of outbound Program Change
    pub channel: Channel,
    /// Inclusive program bounds
    pub program_range: (u8, u8),
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            response_timeout: Duration::millis(1000),
            reidentify_on_timeout: true,
            // status 0xC1 on the wire
            channel: channel(2),
            program_range: PROGRAM_RANGE,
        }
    }
}
