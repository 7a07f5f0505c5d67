use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Buf;
use tracing::{trace, warn};
use vcucan_state::{PointId, StateSetter, StateStore};

use crate::dictionary::{DecodeStrategy, Dictionary, DictionaryEntry};
use crate::error::{FrameError, Result};
use crate::frame::Frame;

/// Result of offering one frame to the codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeOutcome {
    /// The frame matched an entry and every point was written.
    Decoded { entry: &'static str },
    /// No entry has this identifier. Nothing was written.
    Unmatched,
    /// The frame was shorter than the entry's layout. Nothing was written.
    Truncated {
        entry: &'static str,
        needed: usize,
        actual: usize,
    },
}

/// Counters kept by a [`Codec`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    pub decoded: u64,
    pub unmatched: u64,
    pub truncated: u64,
}

#[derive(Debug, Default)]
struct Counters {
    decoded: AtomicU64,
    unmatched: AtomicU64,
    truncated: AtomicU64,
}

/// Decodes incoming frames into the device state store.
#[derive(Debug)]
pub struct Codec {
    dictionary: Dictionary,
    counters: Counters,
}

impl Codec {
    pub fn new(dictionary: Dictionary) -> Self {
        Self {
            dictionary,
            counters: Counters::default(),
        }
    }

    pub fn dictionary(&self) -> &Dictionary {
        &self.dictionary
    }

    /// Decode `frame` into `store` through the owning subsystem's setter.
    ///
    /// Unknown identifiers and short frames are discarded without touching the
    /// store; only their counters move.
    pub fn decode(&self, frame: &Frame, store: &StateStore) -> Result<DecodeOutcome> {
        let Some(entry) = self.dictionary.lookup(frame.id()) else {
            self.counters.unmatched.fetch_add(1, Ordering::Relaxed);
            trace!(id = %frame.id(), "no dictionary entry, frame discarded");
            return Ok(DecodeOutcome::Unmatched);
        };

        let needed = entry.required_len();
        if frame.len() < needed {
            self.counters.truncated.fetch_add(1, Ordering::Relaxed);
            warn!(
                id = %frame.id(),
                entry = entry.name,
                needed,
                actual = frame.len(),
                "truncated frame discarded"
            );
            return Ok(DecodeOutcome::Truncated {
                entry: entry.name,
                needed,
                actual: frame.len(),
            });
        }

        decode_entry(entry, frame.data(), &store.setter(entry.owner))?;
        self.counters.decoded.fetch_add(1, Ordering::Relaxed);
        Ok(DecodeOutcome::Decoded { entry: entry.name })
    }

    pub fn stats(&self) -> CodecStats {
        CodecStats {
            decoded: self.counters.decoded.load(Ordering::Relaxed),
            unmatched: self.counters.unmatched.load(Ordering::Relaxed),
            truncated: self.counters.truncated.load(Ordering::Relaxed),
        }
    }
}

/// Run `entry`'s strategy over `data`, writing through `setter`.
///
/// Fails with [`FrameError::TooShort`] before writing anything when `data` is
/// shorter than [`DictionaryEntry::required_len`].
pub fn decode_entry<S: StateSetter>(entry: &DictionaryEntry, data: &[u8], setter: &S) -> Result<()> {
    let needed = entry.required_len();
    if data.len() < needed {
        return Err(FrameError::TooShort {
            needed,
            actual: data.len(),
        });
    }
    match entry.strategy {
        DecodeStrategy::LittleEndianSegments => {
            for segment in &entry.segments {
                let mut raw = &data[segment.start as usize..segment.end()];
                let value = raw.get_uint_le(segment.size as usize) as u32;
                setter.set(segment.point, value)?;
            }
        }
        DecodeStrategy::AnalogInputs => {
            let mut buf = data;
            let halves = [buf.get_u32_le(), buf.get_u32_le()];
            let mut points = entry.strategy.fixed_points().iter();
            for mut half in halves {
                for _ in 0..3 {
                    if let Some(&point) = points.next() {
                        setter.set(point, half & 0x3FF)?;
                    }
                    half >>= 10;
                }
            }
        }
        DecodeStrategy::InternalStates => {
            let b = |i: usize| u32::from(data[i]);
            let fields = [
                (PointId::VsmState, b(0) | (b(1) << 8)),
                (PointId::InverterState, b(2)),
                (PointId::RelayState, b(3)),
                (PointId::InverterRunMode, b(4) & 0x01),
                (PointId::ActiveDischargeState, (b(4) & 0xE0) >> 5),
                (PointId::InverterCommandMode, b(5)),
                (PointId::InverterEnableState, b(6) & 0x01),
                (PointId::InverterEnableLockout, (b(6) >> 7) & 0x01),
                (PointId::DirectionCommand, b(7) & 0x01),
                (PointId::BmsActive, (b(7) >> 1) & 0x01),
                (PointId::BmsLimitingTorque, (b(7) >> 2) & 0x01),
            ];
            for (point, value) in fields {
                setter.set(point, value)?;
            }
        }
        DecodeStrategy::Diagnostic => {
            let mut buf = data;
            setter.set(PointId::DiagnosticDataLo, buf.get_u32())?;
            setter.set(PointId::DiagnosticDataHi, buf.get_u32())?;
        }
    }
    Ok(())
}
