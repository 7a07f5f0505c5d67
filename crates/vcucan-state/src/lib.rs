//! Device state table for the VCU CAN core.
//!
//! Every decoded value lands in one [`StateStore`] cell identified by a
//! [`PointId`]. Each point is owned by exactly one [`Subsystem`]:
//! - reads are open to everyone through [`StateStore::read`]
//! - writes go through the owner's [`StateSetter`] only
//!
//! All cells are plain atomic words; there are no locks in the store.

pub mod error;
pub mod flags;
pub mod point;
pub mod store;

pub use error::{Result, StateError};
pub use flags::{ModuleError, ModuleErrors};
pub use point::{PointId, Subsystem};
pub use store::{StateSetter, StateStore, SubsystemSetter};
