use std::time::Duration;

/// A failure reported by the peripheral driver.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct PeripheralError(pub String);

impl PeripheralError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Errors that can occur in CAN transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// A transmit request carried no data bytes.
    #[error("refusing to transmit an empty frame")]
    EmptyFrame,

    /// No transmit mailbox became free in time.
    #[error("no transmit mailbox free after {0:?}")]
    MailboxTimeout(Duration),

    /// The peripheral refused a frame.
    #[error("peripheral send failed: {0}")]
    Peripheral(#[from] PeripheralError),

    /// The peripheral could not be started.
    #[error("failed to start peripheral: {0}")]
    Start(PeripheralError),

    /// The transport configuration does not fit the peripheral.
    #[error("invalid transport configuration: {0}")]
    InvalidConfig(String),

    /// The receive dispatch thread is already running.
    #[error("receiver already started")]
    ReceiverTaken,

    /// A worker thread could not be spawned.
    #[error("failed to spawn {name} thread: {source}")]
    Spawn {
        name: &'static str,
        source: std::io::Error,
    },

    /// The transport has been shut down.
    #[error("transport shut down")]
    Shutdown,
}

pub type Result<T> = std::result::Result<T, TransportError>;
