//! Wire-level primitives shared by the IMSM crates.
//!
//! This crate has no knowledge of the MPB layout itself; it only provides the
//! byte-level building blocks (`no_std`-friendly) that `imsm-core` assembles
//! into the actual metadata structures: endian-tagged integers and
//! fixed-width ASCII strings.
#![cfg_attr(not(feature = "std"), no_std)]

/// Fixed-width ASCII strings.
pub mod ascii;
/// Endian-tagged integer types.
pub mod types;

/// Width of a canonicalised disk serial number, shared by the SCSI
/// identity layer and the on-disk disk record.
pub const MAX_RAID_SERIAL_LEN: usize = 16;
