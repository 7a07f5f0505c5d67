//! Periodic broadcast of VCU telemetry over CAN.
//!
//! A [`Composer`] owns a fixed number of segments (one outgoing frame each)
//! and channels (a byte range of a segment fed by a [`ChannelSource`]).
//! Every period it assembles each segment in registration order, hands the
//! frame to the transport, and advances a rolling counter.

pub mod composer;
pub mod error;
pub mod source;

pub use composer::{
    BroadcastHandle, ChannelHandle, Composer, ComposerConfig, ComposerStats, CycleReport,
    SegmentGuard, SegmentHandle,
};
pub use error::{BroadcastError, Result};
pub use source::{ChannelSource, RollingCounterSource, SharedBytes, StatePointSource};
