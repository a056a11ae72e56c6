//! SCSI INQUIRY page 0x80 ("unit serial number") retrieval and
//! canonicalisation into IMSM's fixed 16-byte disk serial.

use crate::sg::{SgIoHdr, SG_DXFER_FROM_DEV, SG_INFO_OK, SG_INFO_OK_MASK, SG_IO};
use imsm_common::MAX_RAID_SERIAL_LEN;
use std::os::fd::RawFd;

/// INQUIRY timeout, matching `scsi_get_serial`'s 5000ms.
pub const INQUIRY_TIMEOUT_MS: u32 = 5_000;
/// MODE SENSE/SELECT timeout, unused by this engine's core but named here
/// for fidelity with the original SCSI channel's two distinct timeouts.
pub const MODE_TIMEOUT_MS: u32 = 30_000;

const INQUIRY_OPCODE: u8 = 0x12;
const SERIAL_PAGE: u8 = 0x80;
const SCSI_SERIAL_BUF_LEN: usize = 255;
const SENSE_BUF_LEN: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum ScsiError {
    #[error("SG_IO ioctl failed: {0}")]
    Ioctl(#[source] std::io::Error),
    #[error("device returned a SCSI or transport error for {cmd}")]
    CommandFailed { cmd: &'static str },
}

/// A channel capable of issuing a raw `SG_IO` INQUIRY. Abstracted so tests
/// can substitute a canned response instead of opening a real `/dev/sg*`
/// node.
pub trait ScsiChannel {
    /// Issues INQUIRY with the given EVPD flag and page code, writing the
    /// response into `buf`. Returns an error if the transport or device
    /// reports a failure.
    fn inquiry(&mut self, evpd: bool, page: u8, buf: &mut [u8]) -> Result<(), ScsiError>;
}

/// A [`ScsiChannel`] over a raw generic-SCSI (`/dev/sg*`) file descriptor.
pub struct SgFdChannel {
    fd: RawFd,
}

impl SgFdChannel {
    /// Wraps an already-open `/dev/sg*` file descriptor. Ownership of the
    /// fd is not taken; the caller closes it.
    pub fn new(fd: RawFd) -> Self {
        Self { fd }
    }
}

impl ScsiChannel for SgFdChannel {
    fn inquiry(&mut self, evpd: bool, page: u8, buf: &mut [u8]) -> Result<(), ScsiError> {
        let mut cmd = [
            INQUIRY_OPCODE,
            evpd as u8,
            page,
            0,
            buf.len() as u8,
            0,
        ];
        let mut sense = [0u8; SENSE_BUF_LEN];
        let mut hdr = SgIoHdr {
            interface_id: b'S' as libc::c_int,
            dxfer_direction: SG_DXFER_FROM_DEV,
            cmd_len: cmd.len() as libc::c_uchar,
            mx_sb_len: sense.len() as libc::c_uchar,
            dxfer_len: buf.len() as libc::c_uint,
            dxferp: buf.as_mut_ptr() as *mut libc::c_void,
            cmdp: cmd.as_mut_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: INQUIRY_TIMEOUT_MS,
            ..Default::default()
        };

        // SAFETY: `hdr` is a valid, fully-initialized sg_io_hdr; `cmd`,
        // `sense`, and `buf` all outlive the call and are sized exactly as
        // the struct's length fields describe.
        let rc = unsafe { libc::ioctl(self.fd, SG_IO, &mut hdr as *mut SgIoHdr) };
        if rc != 0 {
            return Err(ScsiError::Ioctl(std::io::Error::last_os_error()));
        }
        if (hdr.info & SG_INFO_OK_MASK) != SG_INFO_OK {
            tracing::debug!(
                status = hdr.status,
                host_status = hdr.host_status,
                driver_status = hdr.driver_status,
                "INQUIRY reported a SCSI or transport error"
            );
            return Err(ScsiError::CommandFailed { cmd: "INQUIRY" });
        }
        Ok(())
    }
}

/// Issues INQUIRY page 0x80 and canonicalises the response into IMSM's
/// fixed-width disk serial: non-whitespace bytes from the response's
/// ASCII payload (starting at offset 4, length given by its own byte 3),
/// packed left, truncated to [`MAX_RAID_SERIAL_LEN`], NUL-terminated in
/// the final byte. Matches `imsm_read_serial`'s canonicalisation exactly.
pub fn read_serial(channel: &mut impl ScsiChannel) -> Result<[u8; MAX_RAID_SERIAL_LEN], ScsiError> {
    let mut raw = [0u8; SCSI_SERIAL_BUF_LEN];
    channel.inquiry(true, SERIAL_PAGE, &mut raw)?;

    let mut serial = [0u8; MAX_RAID_SERIAL_LEN];
    let rsp_len = raw[3] as usize;
    let mut cnt = 0usize;
    for &byte in raw.iter().skip(4).take(rsp_len) {
        if cnt == MAX_RAID_SERIAL_LEN {
            break;
        }
        if !byte.is_ascii_whitespace() {
            serial[cnt] = byte;
            cnt += 1;
        }
    }
    serial[MAX_RAID_SERIAL_LEN - 1] = 0;
    Ok(serial)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CannedChannel {
        response: Vec<u8>,
    }

    impl ScsiChannel for CannedChannel {
        fn inquiry(&mut self, _evpd: bool, _page: u8, buf: &mut [u8]) -> Result<(), ScsiError> {
            let len = buf.len().min(self.response.len());
            buf[..len].copy_from_slice(&self.response[..len]);
            Ok(())
        }
    }

    fn canned_response(serial: &str) -> Vec<u8> {
        let mut resp = vec![0u8; 4 + serial.len()];
        resp[3] = serial.len() as u8;
        resp[4..].copy_from_slice(serial.as_bytes());
        resp
    }

    #[test]
    fn strips_whitespace_and_truncates() {
        let mut channel = CannedChannel {
            response: canned_response("WD-WCC 1234 5678 9012"),
        };
        let serial = read_serial(&mut channel).unwrap();
        // 16 bytes, non-whitespace chars packed left, last byte forced to NUL
        assert_eq!(&serial[..15], b"WD-WCC123456789");
        assert_eq!(serial[15], 0);
    }

    #[test]
    fn short_serial_is_nul_padded_by_zeroed_buffer() {
        let mut channel = CannedChannel {
            response: canned_response("ABC"),
        };
        let serial = read_serial(&mut channel).unwrap();
        assert_eq!(&serial[..3], b"ABC");
        assert_eq!(&serial[3..], [0u8; MAX_RAID_SERIAL_LEN - 3]);
    }
}
