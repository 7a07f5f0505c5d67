use std::io;
use std::path::PathBuf;

use vcucan_broadcast::BroadcastError;
use vcucan_frame::FrameError;
use vcucan_state::StateError;
use vcucan_transport::TransportError;

/// Errors from configuring and running the VCU communications stack.
#[derive(Debug, thiserror::Error)]
pub enum VcuError {
    /// Dictionary, decode, or encode error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport setup or transmit error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Composer setup or registration error.
    #[error("broadcast error: {0}")]
    Broadcast(#[from] BroadcastError),

    /// Refused state write.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// The inverter is silent or a module error is set; a disable was sent instead.
    #[error("inverter not ready: {0}")]
    InverterNotReady(&'static str),

    /// Configuration rejected by [`crate::VcuConfig::validate`].
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Configuration file is not valid JSON or has unknown fields.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, VcuError>;
