//! Endian-tagged integer wrappers used by every on-disk struct in `imsm-core`.
pub mod endian;
pub mod number;

pub use endian::{BigEndian, Endian, EndianType, Endianness, LittleEndian, NativeEndian};
pub use number::{U16, U32, U64};
