use crate::point::{PointId, Subsystem};

/// Errors that can occur when accessing the device state table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StateError {
    /// A setter tried to write a point owned by another subsystem.
    #[error("{writer} may not write {point} (owned by {owner})")]
    NotOwner {
        point: PointId,
        owner: Subsystem,
        writer: Subsystem,
    },

    /// A point name did not match any known point.
    #[error("unknown state point '{0}'")]
    UnknownPoint(String),

    /// A subsystem name did not match any known subsystem.
    #[error("unknown subsystem '{0}'")]
    UnknownSubsystem(String),
}

pub type Result<T> = std::result::Result<T, StateError>;
