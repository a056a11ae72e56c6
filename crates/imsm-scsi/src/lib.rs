//! SCSI INQUIRY page 0x80 (unit serial number) retrieval, used to derive
//! the stable per-disk identity IMSM keys its disk records on.

pub mod inquiry;
pub mod sg;

pub use inquiry::{read_serial, ScsiChannel, ScsiError, SgFdChannel};
