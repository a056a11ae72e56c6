//! A minimal block-device abstraction the rest of the workspace reads and
//! writes metadata through, so tests can substitute a plain file for a real
//! disk without the core ever touching `std::fs` directly.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Errors that can occur opening or accessing a block device.
#[derive(Debug, thiserror::Error)]
pub enum BlockDeviceError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("requested range is out of bounds")]
    OutOfBounds,
}

/// A byte-addressable random-access device.
///
/// Implementations need not be sector-aligned internally; IMSM anchors and
/// extended metadata live at arbitrary byte offsets computed from the
/// device's total size, so reads and writes are offset/length pairs rather
/// than the sector-index API a filesystem block device would expose.
pub trait BlockDevice {
    /// Total size of the device in bytes.
    fn size(&mut self) -> Result<u64, BlockDeviceError>;

    /// Reads `buf.len()` bytes starting at `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError>;

    /// Writes `buf` starting at `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BlockDeviceError>;

    /// Flushes any buffered writes to stable storage.
    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        Ok(())
    }
}

/// A [`BlockDevice`] backed by an open `std::fs::File` (a real block device
/// node, or a plain file standing in for one in tests).
pub struct FileBlockDevice {
    file: File,
}

impl FileBlockDevice {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, BlockDeviceError> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self { file })
    }

    pub fn from_file(file: File) -> Self {
        Self { file }
    }
}

impl BlockDevice for FileBlockDevice {
    fn size(&mut self) -> Result<u64, BlockDeviceError> {
        let current = self.file.stream_position()?;
        let end = self.file.seek(SeekFrom::End(0))?;
        self.file.seek(SeekFrom::Start(current))?;
        Ok(end)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<(), BlockDeviceError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> Result<(), BlockDeviceError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)?;
        Ok(())
    }

    fn sync(&mut self) -> Result<(), BlockDeviceError> {
        self.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    fn fixture(len: usize) -> (tempfile::NamedTempFile, FileBlockDevice) {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(&vec![0u8; len]).unwrap();
        tmp.flush().unwrap();
        let file = File::options()
            .read(true)
            .write(true)
            .open(tmp.path())
            .unwrap();
        (tmp, FileBlockDevice::from_file(file))
    }

    #[test]
    fn reports_size() {
        let (_tmp, mut dev) = fixture(4096);
        assert_eq!(dev.size().unwrap(), 4096);
    }

    #[test]
    fn round_trips_at_offset() {
        let (_tmp, mut dev) = fixture(4096);
        dev.write_at(512, &[0xAB; 16]).unwrap();
        let mut buf = [0u8; 16];
        dev.read_at(512, &mut buf).unwrap();
        assert_eq!(buf, [0xAB; 16]);
        // untouched regions stay zero
        let mut before = [0u8; 16];
        dev.read_at(496, &mut before).unwrap();
        assert_eq!(before, [0u8; 16]);
    }

    #[test]
    fn read_past_end_errors() {
        let (_tmp, mut dev) = fixture(64);
        let mut buf = [0u8; 16];
        assert!(dev.read_at(60, &mut buf).is_err());
    }
}
