//! CAN frames and the message dictionary for the VCU.
//!
//! Incoming frames are matched against a [`Dictionary`] built once at startup
//! and decoded by a [`Codec`] into the shared [`vcucan_state::StateStore`].
//! Outgoing inverter commands are encoded from fixed 8-byte templates:
//! - [`InverterCommand`] at `base + 0x20`
//! - [`ParameterRequest`] at `base + 0x21`

pub mod codec;
pub mod command;
pub mod dictionary;
pub mod error;
pub mod frame;
pub mod ids;

pub use codec::{decode_entry, Codec, CodecStats, DecodeOutcome};
pub use command::{Direction, InverterCommand, ParameterRequest};
pub use dictionary::{
    DecodeStrategy, Dictionary, DictionaryBuilder, DictionaryConfig, DictionaryEntry,
    SegmentDescriptor,
};
pub use error::{DictionaryError, FrameError, Result};
pub use frame::{Frame, FrameData, FrameId, MAX_DATA_LEN, MAX_EXTENDED_ID, MAX_STANDARD_ID};
