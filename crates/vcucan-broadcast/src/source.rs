use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use vcucan_frame::{FrameData, MAX_DATA_LEN};
use vcucan_state::{ModuleErrors, PointId, StateStore};

use crate::error::{BroadcastError, Result};

/// Bytes for one broadcast channel.
///
/// Sources are read from the broadcast thread while their owners may write
/// them from elsewhere, so each source guards its own data.
pub trait ChannelSource: Send + Sync {
    /// Number of bytes this source contributes. Must not change after registration.
    fn len(&self) -> usize;

    /// Copy the current bytes into `dst`, which is exactly `len()` long.
    fn copy_to(&self, dst: &mut [u8]);

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ChannelSource + ?Sized> ChannelSource for Arc<T> {
    fn len(&self) -> usize {
        (**self).len()
    }

    fn copy_to(&self, dst: &mut [u8]) {
        (**self).copy_to(dst)
    }
}

/// Fixed-length byte buffer written by another thread.
///
/// Clones share the same buffer: keep one clone to write, register another.
#[derive(Debug, Clone)]
pub struct SharedBytes {
    bytes: Arc<Mutex<FrameData>>,
}

impl SharedBytes {
    /// A buffer holding `initial`.
    pub fn new(initial: &[u8]) -> Result<Self> {
        let bytes = FrameData::from_slice(initial).map_err(|_| BroadcastError::ChannelOverflow {
            offset: 0,
            len: initial.len(),
        })?;
        Ok(Self {
            bytes: Arc::new(Mutex::new(bytes)),
        })
    }

    /// A zero-filled buffer of `len` bytes.
    pub fn zeroed(len: usize) -> Result<Self> {
        if len > MAX_DATA_LEN {
            return Err(BroadcastError::ChannelOverflow { offset: 0, len });
        }
        Self::new(&[0u8; MAX_DATA_LEN][..len])
    }

    /// Replace the contents. The length must match the buffer's.
    pub fn set(&self, data: &[u8]) -> Result<()> {
        let mut bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        if data.len() != bytes.len() {
            return Err(BroadcastError::SourceLength {
                expected: bytes.len(),
                actual: data.len(),
            });
        }
        bytes.copy_from_slice(data);
        Ok(())
    }

    pub fn get(&self) -> FrameData {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ChannelSource for SharedBytes {
    fn len(&self) -> usize {
        self.bytes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn copy_to(&self, dst: &mut [u8]) {
        let bytes = self.bytes.lock().unwrap_or_else(PoisonError::into_inner);
        dst.copy_from_slice(&bytes[..dst.len()]);
    }
}

/// Low `width` bytes of a state point, little-endian.
#[derive(Debug, Clone)]
pub struct StatePointSource {
    store: Arc<StateStore>,
    point: PointId,
    width: usize,
}

impl StatePointSource {
    /// `width` is clamped to `1..=4`.
    pub fn new(store: Arc<StateStore>, point: PointId, width: usize) -> Self {
        Self {
            store,
            point,
            width: width.clamp(1, 4),
        }
    }

    pub fn point(&self) -> PointId {
        self.point
    }
}

impl ChannelSource for StatePointSource {
    fn len(&self) -> usize {
        self.width
    }

    fn copy_to(&self, dst: &mut [u8]) {
        let value = self.store.read(self.point).to_le_bytes();
        dst.copy_from_slice(&value[..dst.len()]);
    }
}

/// The module error bitmask, 4 bytes little-endian.
impl ChannelSource for ModuleErrors {
    fn len(&self) -> usize {
        4
    }

    fn copy_to(&self, dst: &mut [u8]) {
        dst.copy_from_slice(&self.bits().to_le_bytes()[..dst.len()]);
    }
}

/// A composer's rolling counter, 2 bytes little-endian.
#[derive(Debug, Clone)]
pub struct RollingCounterSource {
    counter: Arc<AtomicU16>,
}

impl RollingCounterSource {
    pub fn new(counter: Arc<AtomicU16>) -> Self {
        Self { counter }
    }
}

impl ChannelSource for RollingCounterSource {
    fn len(&self) -> usize {
        2
    }

    fn copy_to(&self, dst: &mut [u8]) {
        let value = self.counter.load(Ordering::Acquire).to_le_bytes();
        dst.copy_from_slice(&value[..dst.len()]);
    }
}
