//! IMSM metadata codec, super loader, geometry/volume construction, the
//! monitor state machine, and the proposed-update protocol.
//!
//! Modules are layered bottom-up: [`mpb`] has no knowledge of devices or
//! disks, [`loader`] assembles one from a set of them, [`geometry`] and
//! [`volume`] build new device records against a loaded container, and
//! [`monitor`] / [`update`] / [`spare`] operate on an already-assembled
//! [`mpb::Mpb`] during the life of a running array.

pub mod geometry;
pub mod info;
pub mod loader;
pub mod monitor;
pub mod mpb;
pub mod spare;
pub mod update;
pub mod volume;

pub use loader::{load_super, LoadedSuper, LoaderError, Member, ResolvedSlot};
pub use mpb::{DiskStatus, MapState, Mpb, MpbError};
