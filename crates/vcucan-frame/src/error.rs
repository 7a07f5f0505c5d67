use vcucan_state::{PointId, StateError, Subsystem};

use crate::frame::FrameId;

/// Errors that can occur while building, decoding, or encoding frames.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    /// The identifier does not fit the requested id kind.
    #[error("identifier 0x{id:X} out of range (extended: {extended})")]
    InvalidId { id: u32, extended: bool },

    /// More than eight data bytes were supplied.
    #[error("frame data too long ({len} bytes, max 8)")]
    DataTooLong { len: usize },

    /// A command was re-sliced from a frame of the wrong length.
    #[error("frame too short ({actual} bytes, need {needed})")]
    TooShort { needed: usize, actual: usize },

    /// A command field held a value outside its defined range.
    #[error("invalid {field} value {value}")]
    InvalidField { field: &'static str, value: u32 },

    /// The dictionary could not be built.
    #[error(transparent)]
    Dictionary(#[from] DictionaryError),

    /// A decoded value was refused by the state store.
    #[error("state write failed: {0}")]
    State(#[from] StateError),
}

/// Errors detected while validating dictionary entries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DictionaryError {
    /// Two entries share an identifier.
    #[error("duplicate identifier {id} ('{first}' and '{second}')")]
    DuplicateId {
        id: FrameId,
        first: &'static str,
        second: &'static str,
    },

    /// An entry identifier is not a valid CAN identifier.
    #[error("entry '{entry}' has invalid identifier 0x{id:X}")]
    InvalidId { entry: &'static str, id: u32 },

    /// A segment is empty, wider than a word, or runs past byte 8.
    #[error("entry '{entry}': segment {point} (start {start}, size {size}) out of bounds")]
    SegmentOutOfBounds {
        entry: &'static str,
        point: PointId,
        start: u8,
        size: u8,
    },

    /// Two segments of one entry cover the same byte.
    #[error("entry '{entry}': segments {first} and {second} overlap")]
    OverlappingSegments {
        entry: &'static str,
        first: PointId,
        second: PointId,
    },

    /// A segment writes a point its entry's subsystem does not own.
    #[error("entry '{entry}' (owned by {entry_owner}) writes {point} owned by {owner}")]
    ForeignPoint {
        entry: &'static str,
        entry_owner: Subsystem,
        point: PointId,
        owner: Subsystem,
    },

    /// A segment-driven entry has no segments, or a fixed-layout entry has some.
    #[error("entry '{entry}': {reason}")]
    InvalidLayout {
        entry: &'static str,
        reason: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
