//! Remote control core for the Zoom MS-70CDR, driven over USB-MIDI host mode.
//! Hardware stays outside: the USB host stack implements `midi::Transport`
//! and feeds lifecycle events, LEDs are plain `embedded-hal` output pins.

#![cfg_attr(not(test), no_std)]

#[macro_use]
extern crate bitfield;

#[macro_use]
extern crate log;

pub mod midi;
pub mod devices;
pub mod apps;
pub mod session;
pub mod event;
pub mod input;
pub mod output;
pub mod config;
pub mod time;
pub mod runtime;

#[cfg(feature = "rtt")]
pub mod log_rtt;

pub use apps::ms70cdr_control::{Controller, ControllerState, SessionTask, SharedController, TaskPhase};
pub use config::ControllerConfig;
pub use event::{Action, Actions, Event};
pub use runtime::ControlLoop;
