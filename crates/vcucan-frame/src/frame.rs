use std::fmt;

use crate::error::{FrameError, Result};

/// Classic CAN carries at most eight data bytes.
pub const MAX_DATA_LEN: usize = 8;

/// Largest 11-bit identifier.
pub const MAX_STANDARD_ID: u32 = 0x7FF;

/// Largest 29-bit identifier.
pub const MAX_EXTENDED_ID: u32 = 0x1FFF_FFFF;

/// Frame payload storage. The capacity bound makes `len <= 8` unrepresentable to break.
pub type FrameData = heapless::Vec<u8, MAX_DATA_LEN>;

/// A CAN identifier together with its kind.
///
/// Standard and extended frames with the same numeric id are different
/// messages on the bus, so the kind is part of the lookup key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId {
    raw: u32,
    extended: bool,
}

impl FrameId {
    /// An 11-bit identifier.
    pub fn standard(raw: u32) -> Result<Self> {
        Self::new(raw, false)
    }

    /// A 29-bit identifier.
    pub fn extended(raw: u32) -> Result<Self> {
        Self::new(raw, true)
    }

    pub fn new(raw: u32, extended: bool) -> Result<Self> {
        let max = if extended {
            MAX_EXTENDED_ID
        } else {
            MAX_STANDARD_ID
        };
        if raw > max {
            return Err(FrameError::InvalidId { id: raw, extended });
        }
        Ok(Self { raw, extended })
    }

    pub fn raw(self) -> u32 {
        self.raw
    }

    pub fn is_extended(self) -> bool {
        self.extended
    }
}

impl fmt::Display for FrameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.extended {
            write!(f, "0x{:08X}x", self.raw)
        } else {
            write!(f, "0x{:03X}", self.raw)
        }
    }
}

/// One classic CAN data frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    id: FrameId,
    data: FrameData,
}

impl Frame {
    /// Build a frame from a validated identifier.
    pub fn new(id: FrameId, data: &[u8]) -> Result<Self> {
        let data =
            FrameData::from_slice(data).map_err(|_| FrameError::DataTooLong { len: data.len() })?;
        Ok(Self { id, data })
    }

    /// Build a standard (11-bit) frame.
    pub fn standard(id: u32, data: &[u8]) -> Result<Self> {
        Self::new(FrameId::standard(id)?, data)
    }

    /// Build an extended (29-bit) frame.
    pub fn extended(id: u32, data: &[u8]) -> Result<Self> {
        Self::new(FrameId::extended(id)?, data)
    }

    pub fn id(&self) -> FrameId {
        self.id
    }

    pub fn raw_id(&self) -> u32 {
        self.id.raw()
    }

    pub fn is_extended(&self) -> bool {
        self.id.is_extended()
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]", self.id, self.data.len())?;
        for byte in &self.data {
            write!(f, " {byte:02X}")?;
        }
        Ok(())
    }
}
