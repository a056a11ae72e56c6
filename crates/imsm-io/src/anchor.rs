//! Anchor read/write: locating and moving the IMSM metadata block.
//!
//! IMSM has no partition table entry or superblock pointer; every member
//! disk carries its own copy of the metadata at a fixed offset from the end
//! of the device. The final 512-byte sector of that block — the "anchor" —
//! always sits at `device_size - 1024`; the device's very last sector is
//! left unused. When the metadata grows past one sector, the extra sectors
//! are written immediately *before* the anchor, so the anchor's on-disk
//! position never moves no matter how large the metadata block gets.
//!
//! This means the in-memory buffer and the on-disk byte range are ordered
//! oppositely: buffer offset `0` (the anchor, containing `sig`/`mpb_size`
//! and enough of the header to be self-describing) is the *highest* disk
//! address in the block, and the "extended" tail of the buffer occupies the
//! disk addresses immediately below it.

use crate::device::{BlockDevice, BlockDeviceError};

/// Sector size IMSM assumes for all of its on-disk alignment.
pub const SECTOR_SIZE: u64 = 512;

/// Distance from the end of the device to the start of the anchor sector.
/// The anchor is the second-to-last sector; the last sector is reserved.
pub const ANCHOR_OFFSET_FROM_END: u64 = SECTOR_SIZE * 2;

#[derive(Debug, thiserror::Error)]
pub enum AnchorIoError {
    #[error(transparent)]
    Device(#[from] BlockDeviceError),
    #[error("device is smaller than the minimum anchor region ({min} bytes)")]
    DeviceTooSmall { min: u64 },
    #[error("mpb_size {0} is not a multiple of the sector size")]
    Misaligned(u64),
}

/// Reads only the fixed 512-byte anchor sector, without knowledge of the
/// full metadata block's size. Callers decode `mpb_size` out of this sector
/// and pass it to [`read_extended`] to fetch the rest.
pub fn read_anchor_sector<D: BlockDevice>(dev: &mut D) -> Result<[u8; SECTOR_SIZE as usize], AnchorIoError> {
    let size = dev.size()?;
    let offset = anchor_offset(size)?;
    let mut buf = [0u8; SECTOR_SIZE as usize];
    dev.read_at(offset, &mut buf)?;
    Ok(buf)
}

/// Reads the sectors preceding the anchor holding the rest of a metadata
/// block of total size `mpb_size` (already rounded up to a sector
/// multiple). Returns only the extension — bytes `[512, mpb_size)` of the
/// logical buffer; callers prepend the anchor sector themselves.
pub fn read_extended<D: BlockDevice>(
    dev: &mut D,
    mpb_size: u32,
) -> Result<Vec<u8>, AnchorIoError> {
    let mpb_size = mpb_size as u64;
    if mpb_size % SECTOR_SIZE != 0 {
        return Err(AnchorIoError::Misaligned(mpb_size));
    }
    if mpb_size <= SECTOR_SIZE {
        return Ok(Vec::new());
    }
    let size = dev.size()?;
    let extension_len = mpb_size - SECTOR_SIZE;
    let extension_offset = size
        .checked_sub(ANCHOR_OFFSET_FROM_END)
        .and_then(|o| o.checked_sub(extension_len))
        .ok_or(AnchorIoError::DeviceTooSmall {
            min: ANCHOR_OFFSET_FROM_END + extension_len,
        })?;
    let mut buf = vec![0u8; extension_len as usize];
    dev.read_at(extension_offset, &mut buf)?;
    Ok(buf)
}

/// Writes a full logical metadata buffer (anchor sector first, extension
/// following) back to its split on-disk position.
pub fn write_mpb<D: BlockDevice>(dev: &mut D, buf: &[u8]) -> Result<(), AnchorIoError> {
    let mpb_size = buf.len() as u64;
    if mpb_size % SECTOR_SIZE != 0 {
        return Err(AnchorIoError::Misaligned(mpb_size));
    }
    let size = dev.size()?;
    if mpb_size > SECTOR_SIZE {
        let extension = &buf[SECTOR_SIZE as usize..];
        let extension_offset = size
            .checked_sub(ANCHOR_OFFSET_FROM_END)
            .and_then(|o| o.checked_sub(extension.len() as u64))
            .ok_or(AnchorIoError::DeviceTooSmall {
                min: ANCHOR_OFFSET_FROM_END + extension.len() as u64,
            })?;
        dev.write_at(extension_offset, extension)?;
    }
    let anchor_offset = anchor_offset(size)?;
    dev.write_at(anchor_offset, &buf[..SECTOR_SIZE as usize])?;
    dev.sync()?;
    Ok(())
}

/// Overwrites the anchor sector with zeros, erasing the signature so the
/// device no longer reads back as carrying IMSM metadata. Mirrors
/// `store_zero_imsm`, which leaves the rest of any extended block in place
/// — only the signature needs to go for the metadata to be considered gone.
pub fn zero_anchor<D: BlockDevice>(dev: &mut D) -> Result<(), AnchorIoError> {
    let size = dev.size()?;
    let offset = anchor_offset(size)?;
    dev.write_at(offset, &[0u8; SECTOR_SIZE as usize])?;
    dev.sync()?;
    Ok(())
}

fn anchor_offset(device_size: u64) -> Result<u64, AnchorIoError> {
    device_size
        .checked_sub(ANCHOR_OFFSET_FROM_END)
        .ok_or(AnchorIoError::DeviceTooSmall {
            min: ANCHOR_OFFSET_FROM_END,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::FileBlockDevice;
    use std::io::Write as _;

    fn fixture(len: usize) -> (tempfile::NamedTempFile, FileBlockDevice) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; len]).unwrap();
        tmp.flush().unwrap();
        let file = std::fs::File::options()
            .read(true)
            .write(true)
            .open(tmp.path())
            .unwrap();
        (tmp, FileBlockDevice::from_file(file))
    }

    #[test]
    fn single_sector_round_trip() {
        let (_tmp, mut dev) = fixture(8192);
        let mut buf = [0u8; 512];
        buf[0] = 0xAA;
        buf[511] = 0xBB;
        write_mpb(&mut dev, &buf).unwrap();

        let anchor = read_anchor_sector(&mut dev).unwrap();
        assert_eq!(anchor[0], 0xAA);
        assert_eq!(anchor[511], 0xBB);
        assert!(read_extended(&mut dev, 512).unwrap().is_empty());
    }

    #[test]
    fn multi_sector_round_trip_preserves_order() {
        let (_tmp, mut dev) = fixture(8192);
        let mut buf = vec![0u8; 1536];
        buf[0..4].copy_from_slice(b"ANCH");
        buf[512..516].copy_from_slice(b"EXT1");
        buf[1024..1028].copy_from_slice(b"EXT2");
        write_mpb(&mut dev, &buf).unwrap();

        let anchor = read_anchor_sector(&mut dev).unwrap();
        assert_eq!(&anchor[0..4], b"ANCH");

        let extended = read_extended(&mut dev, 1536).unwrap();
        assert_eq!(extended.len(), 1024);
        assert_eq!(&extended[0..4], b"EXT1");
        assert_eq!(&extended[512..516], b"EXT2");

        // anchor sits immediately after the extension on disk
        let size = dev.size().unwrap();
        let mut disk_tail = vec![0u8; 1536];
        dev.read_at(size - ANCHOR_OFFSET_FROM_END - 1024, &mut disk_tail)
            .unwrap();
        assert_eq!(&disk_tail[0..4], b"EXT1");
        assert_eq!(&disk_tail[1024..1028], b"ANCH");
    }

    #[test]
    fn zero_anchor_erases_signature() {
        let (_tmp, mut dev) = fixture(8192);
        let buf = [0xFFu8; 512];
        write_mpb(&mut dev, &buf).unwrap();
        zero_anchor(&mut dev).unwrap();
        let anchor = read_anchor_sector(&mut dev).unwrap();
        assert_eq!(anchor, [0u8; 512]);
    }

    #[test]
    fn device_too_small_is_rejected() {
        let (_tmp, mut dev) = fixture(512);
        assert!(read_anchor_sector(&mut dev).is_err());
    }
}
