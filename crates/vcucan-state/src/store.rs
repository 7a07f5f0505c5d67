use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::warn;

use crate::error::{Result, StateError};
use crate::flags::ModuleErrors;
use crate::point::{PointId, Subsystem};

/// Write access to the state table on behalf of one subsystem.
///
/// Decode strategies are written against this trait so tests can substitute a
/// recording setter.
pub trait StateSetter {
    /// The subsystem this setter writes for.
    fn subsystem(&self) -> Subsystem;

    /// Write one point. Fails if the point belongs to another subsystem.
    fn set(&self, point: PointId, value: u32) -> Result<()>;
}

/// Shared table of decoded device state.
///
/// Allocated once with one atomic cell per [`PointId`]; never resized.
/// Values are published with `Release` and read with `Acquire`, so a reader
/// that sees a value also sees every write the producer made before it.
pub struct StateStore {
    values: [AtomicU32; PointId::COUNT],
    // Nanoseconds since `epoch` plus one; zero means never written.
    updated: [AtomicU64; Subsystem::COUNT],
    epoch: Instant,
    module_errors: Arc<ModuleErrors>,
}

impl StateStore {
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicU32::new(0)),
            updated: std::array::from_fn(|_| AtomicU64::new(0)),
            epoch: Instant::now(),
            module_errors: Arc::new(ModuleErrors::new()),
        }
    }

    /// Current value of a point. Unwritten points read as zero.
    pub fn read(&self, point: PointId) -> u32 {
        self.values[point.index()].load(Ordering::Acquire)
    }

    /// Current value reinterpreted as a signed 16-bit quantity.
    ///
    /// Most inverter words are two's-complement `i16` on the wire.
    pub fn read_i16(&self, point: PointId) -> i16 {
        self.read(point) as u16 as i16
    }

    /// Obtain the setter for `owner`. Only that subsystem's points are writable.
    pub fn setter(&self, owner: Subsystem) -> SubsystemSetter<'_> {
        SubsystemSetter { store: self, owner }
    }

    /// Copy of every point, in storage order.
    pub fn snapshot(&self) -> Vec<(PointId, u32)> {
        PointId::ALL
            .iter()
            .map(|&point| (point, self.read(point)))
            .collect()
    }

    /// Time elapsed since `subsystem` last wrote any point, or `None` if it never has.
    pub fn last_update(&self, subsystem: Subsystem) -> Option<Duration> {
        let stamp = self.updated[subsystem.index()].load(Ordering::Acquire);
        if stamp == 0 {
            return None;
        }
        let at = Duration::from_nanos(stamp - 1);
        Some(self.epoch.elapsed().saturating_sub(at))
    }

    /// Whether `subsystem` has been silent for longer than `timeout`.
    ///
    /// A subsystem that never wrote is only stale once the store itself is
    /// older than `timeout`, so startup does not count as a timeout.
    pub fn is_stale(&self, subsystem: Subsystem, timeout: Duration) -> bool {
        match self.last_update(subsystem) {
            Some(age) => age > timeout,
            None => self.epoch.elapsed() > timeout,
        }
    }

    /// Sticky module error flags shared with the transport and composer.
    pub fn module_errors(&self) -> &Arc<ModuleErrors> {
        &self.module_errors
    }

    fn write(&self, owner: Subsystem, point: PointId, value: u32) {
        self.values[point.index()].store(value, Ordering::Release);
        let nanos = u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX - 1);
        self.updated[owner.index()].store(nanos + 1, Ordering::Release);
    }
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for StateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateStore")
            .field("points", &PointId::COUNT)
            .field("module_errors", &self.module_errors.bits())
            .finish()
    }
}

/// Setter bound to one subsystem.
#[derive(Debug, Clone, Copy)]
pub struct SubsystemSetter<'a> {
    store: &'a StateStore,
    owner: Subsystem,
}

impl StateSetter for SubsystemSetter<'_> {
    fn subsystem(&self) -> Subsystem {
        self.owner
    }

    fn set(&self, point: PointId, value: u32) -> Result<()> {
        let owner = point.owner();
        if owner != self.owner {
            warn!(%point, %owner, writer = %self.owner, "write to foreign point refused");
            return Err(StateError::NotOwner {
                point,
                owner,
                writer: self.owner,
            });
        }
        self.store.write(self.owner, point, value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn unwritten_points_read_zero() {
        let store = StateStore::new();
        assert!(store.snapshot().iter().all(|(_, value)| *value == 0));
        assert_eq!(store.last_update(Subsystem::Inverter), None);
    }

    #[test]
    fn owner_setter_writes() {
        let store = StateStore::new();
        let setter = store.setter(Subsystem::Inverter);
        setter.set(PointId::MotorSpeed, 0xFFFF_F830).unwrap();
        assert_eq!(store.read(PointId::MotorSpeed), 0xFFFF_F830);
        assert_eq!(store.read_i16(PointId::MotorSpeed), -2000);
        assert!(store.last_update(Subsystem::Inverter).is_some());
        assert_eq!(store.last_update(Subsystem::Drs), None);
    }

    #[test]
    fn foreign_setter_is_refused() {
        let store = StateStore::new();
        let err = store
            .setter(Subsystem::Drs)
            .set(PointId::MotorTemp, 42)
            .unwrap_err();
        assert_eq!(
            err,
            StateError::NotOwner {
                point: PointId::MotorTemp,
                owner: Subsystem::Inverter,
                writer: Subsystem::Drs,
            }
        );
        assert_eq!(store.read(PointId::MotorTemp), 0);
        assert_eq!(store.last_update(Subsystem::Drs), None);
    }

    #[test]
    fn staleness_tracks_last_write() {
        let store = StateStore::new();
        let timeout = Duration::from_millis(20);
        assert!(!store.is_stale(Subsystem::Inverter, timeout));

        thread::sleep(Duration::from_millis(30));
        assert!(store.is_stale(Subsystem::Inverter, timeout));

        store
            .setter(Subsystem::Inverter)
            .set(PointId::VsmState, 6)
            .unwrap();
        assert!(!store.is_stale(Subsystem::Inverter, timeout));
    }

    #[test]
    fn concurrent_readers_see_whole_words() {
        let store = Arc::new(StateStore::new());
        let writer = {
            let store = Arc::clone(&store);
            thread::spawn(move || {
                let setter = store.setter(Subsystem::Drs);
                for i in 0..10_000u32 {
                    let word = if i % 2 == 0 { 0 } else { u32::MAX };
                    setter.set(PointId::DrsPosition, word).unwrap();
                }
            })
        };
        for _ in 0..10_000 {
            let value = store.read(PointId::DrsPosition);
            assert!(value == 0 || value == u32::MAX);
        }
        writer.join().unwrap();
    }
}
