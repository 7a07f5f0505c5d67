//! CAN communications core for a race-car vehicle control unit.
//!
//! Decodes inverter and aero actuator broadcasts into a shared state table,
//! and periodically composes outgoing telemetry and command frames.
//!
//! # Crate Structure
//!
//! - [`state`]: device state table with per-subsystem ownership
//! - [`frame`]: CAN frames, the static dictionary, decoders and command encoders
//! - [`transport`]: mailbox-bounded transmit and deferred receive dispatch
//! - [`broadcast`]: periodic segment/channel composer
//! - [`Vcu`]: everything wired together from a [`VcuConfig`]

mod config;
mod error;
mod inverter;
mod vcu;

pub use config::{BroadcastSection, InverterSection, TransportSection, VcuConfig};
pub use error::{Result, VcuError};
pub use inverter::InverterLink;
pub use vcu::{Vcu, VcuStats, TELEMETRY_POINTS};

/// Re-export state types.
pub mod state {
    pub use vcucan_state::*;
}

/// Re-export frame types.
pub mod frame {
    pub use vcucan_frame::*;
}

/// Re-export transport types.
pub mod transport {
    pub use vcucan_transport::*;
}

/// Re-export broadcast types.
pub mod broadcast {
    pub use vcucan_broadcast::*;
}
