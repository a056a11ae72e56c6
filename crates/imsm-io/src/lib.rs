//! Block device abstraction and IMSM anchor I/O.
//!
//! `device` defines the [`device::BlockDevice`] trait the core crate reads
//! and writes metadata through, with a `std::fs::File`-backed
//! implementation. `anchor` implements the fixed-offset anchor read/write
//! scheme IMSM uses to locate its variable-length metadata block without
//! a partition table or superblock pointer.

pub mod anchor;
pub mod device;

pub use anchor::AnchorIoError;
pub use device::{BlockDevice, BlockDeviceError, FileBlockDevice};
