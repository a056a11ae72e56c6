//! Hand-transcribed subset of the Linux `<scsi/sg.h>` uAPI: the
//! `sg_io_hdr` struct and the constants needed to issue one `SG_IO` INQUIRY.
//! This ABI has been stable since the driver's introduction, so a small
//! hand-written subset is preferable to depending on a generated bindings
//! crate for three struct fields and two constants.

/// `ioctl(2)` request number for `SG_IO`.
pub const SG_IO: libc::c_ulong = 0x2285;

/// `dxfer_direction` value for "data flows from the device to us".
pub const SG_DXFER_FROM_DEV: libc::c_int = -3;

/// Mask applied to `sg_io_hdr::info` to test transport-level success.
pub const SG_INFO_OK_MASK: libc::c_uint = 0x1;
/// Value indicating the SCSI command completed without a transport error
/// (the target may still have returned a SCSI-level check condition).
pub const SG_INFO_OK: libc::c_uint = 0x0;

/// The `sg_io_hdr_t` structure passed to `ioctl(fd, SG_IO, ...)`.
#[repr(C)]
pub struct SgIoHdr {
    pub interface_id: libc::c_int,
    pub dxfer_direction: libc::c_int,
    pub cmd_len: libc::c_uchar,
    pub mx_sb_len: libc::c_uchar,
    pub iovec_count: libc::c_ushort,
    pub dxfer_len: libc::c_uint,
    pub dxferp: *mut libc::c_void,
    pub cmdp: *mut libc::c_uchar,
    pub sbp: *mut libc::c_uchar,
    pub timeout: libc::c_uint,
    pub flags: libc::c_uint,
    pub pack_id: libc::c_int,
    pub usr_ptr: *mut libc::c_void,
    pub status: libc::c_uchar,
    pub masked_status: libc::c_uchar,
    pub msg_status: libc::c_uchar,
    pub sb_len_wr: libc::c_uchar,
    pub host_status: libc::c_ushort,
    pub driver_status: libc::c_ushort,
    pub resid: libc::c_int,
    pub duration: libc::c_uint,
    pub info: libc::c_uint,
}

impl Default for SgIoHdr {
    fn default() -> Self {
        // SAFETY: every field of sg_io_hdr is a plain integer or pointer;
        // an all-zero bit pattern is the kernel's own documented "unused"
        // representation for this struct.
        unsafe { core::mem::zeroed() }
    }
}
