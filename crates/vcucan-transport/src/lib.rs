//! CAN transport for the VCU.
//!
//! Sits between the hardware peripheral and the rest of the stack:
//! - transmit is bounded by the peripheral's hardware mailboxes
//! - reception is deferred: the interrupt path only copies frames into a
//!   fixed [`BlockPool`] and queues them for a single dispatch thread
//!
//! The peripheral itself is behind the [`Peripheral`] trait. [`VirtualBus`]
//! is an in-memory implementation for tests and simulation.

pub mod error;
pub mod mailbox;
pub mod peripheral;
pub mod pool;
pub mod shutdown;
pub mod transport;
pub mod virtual_bus;

pub use error::{PeripheralError, Result, TransportError};
pub use mailbox::Mailboxes;
pub use peripheral::Peripheral;
pub use pool::{BlockPool, Handle, PoolExhausted};
pub use shutdown::ShutdownToken;
pub use transport::{
    FrameHandler, InterruptHandle, ReceiverHandle, Transport, TransportConfig, TransportStats,
    DEFAULT_RX_POOL_CAPACITY,
};
pub use virtual_bus::{VirtualBus, DEFAULT_MAILBOXES};
