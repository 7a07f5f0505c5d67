use std::fmt;

use vcucan::broadcast::BroadcastError;
use vcucan::frame::FrameError;
use vcucan::transport::TransportError;
use vcucan::VcuError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const HEALTH_CHECK_FAILED: i32 = 30;
pub const CONFIG_INVALID: i32 = 40;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn usage(message: impl Into<String>) -> Self {
        Self::new(USAGE, message)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::InvalidId { .. } | FrameError::DataTooLong { .. } => {
            CliError::usage(format!("{context}: {err}"))
        }
        FrameError::TooShort { .. } | FrameError::InvalidField { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::Dictionary(_) => CliError::new(CONFIG_INVALID, format!("{context}: {err}")),
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}

pub fn transport_error(context: &str, err: TransportError) -> CliError {
    match err {
        TransportError::InvalidConfig(_) => {
            CliError::new(CONFIG_INVALID, format!("{context}: {err}"))
        }
        other => CliError::new(TRANSPORT_ERROR, format!("{context}: {other}")),
    }
}

pub fn vcu_error(context: &str, err: VcuError) -> CliError {
    match err {
        VcuError::Frame(err) => frame_error(context, err),
        VcuError::Transport(err) => transport_error(context, err),
        VcuError::Broadcast(BroadcastError::Transport(err)) => transport_error(context, err),
        VcuError::Broadcast(err) => CliError::new(CONFIG_INVALID, format!("{context}: {err}")),
        VcuError::Config(_) | VcuError::Json(_) => {
            CliError::new(CONFIG_INVALID, format!("{context}: {err}"))
        }
        VcuError::Io { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
        VcuError::InverterNotReady(_) => {
            CliError::new(HEALTH_CHECK_FAILED, format!("{context}: {err}"))
        }
        other => CliError::new(INTERNAL, format!("{context}: {other}")),
    }
}
