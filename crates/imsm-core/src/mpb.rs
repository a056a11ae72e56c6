//! The Metadata Parameter Block: on-disk layout, checksum, and the
//! offset-walking accessors that reach into its variable-length tail.
//!
//! The MPB has no fixed size: it carries `num_disks` disk records and
//! `num_raid_devs` device records, each of the latter carrying one or two
//! variable-length maps. Rather than modeling that with language-level
//! variable-length arrays, every growable region is addressed by an
//! explicit offset walk over a `Vec<u8>`; only the fixed-size *heads* of
//! each record are given a `#[repr(C, packed)]` Pod view so field access
//! still goes through the shared endian-tagged integer types.

use bitflags::bitflags;
use imsm_common::types::{Endian, LittleEndian, U16, U32};
use imsm_common::MAX_RAID_SERIAL_LEN;

/// 24-byte literal prefix of every valid signature; the remaining 8 bytes
/// hold a dotted version string (`"1.0.00"`, `"1.1.00"`, `"1.2.02"`), NUL-padded.
pub const MPB_SIGNATURE_PREFIX: &[u8] = b"Intel Raid ISM Cfg Sig. ";
pub const MPB_SIG_LEN: usize = MPB_SIGNATURE_PREFIX.len();
pub const MAX_SIGNATURE_LENGTH: usize = 32;

pub const MPB_VERSION_RAID0: &str = "1.0.00";
pub const MPB_VERSION_RAID1: &str = "1.1.00";
pub const MPB_VERSION_RAID5: &str = "1.2.02";

/// Trailing reserved region on every member disk, never part of a member extent.
pub const MPB_SECTOR_CNT: u32 = 418;
pub const IMSM_RESERVED_SECTORS: u32 = 4096;
pub const IMSM_MAX_DEVICES: usize = 255;

pub const SECTOR_SIZE: usize = 512;

pub(crate) const SUPER_HEAD_SIZE: usize = 216;
pub(crate) const DISK_RECORD_SIZE: usize = 48;
pub(crate) const DEV_HEAD_SIZE: usize = 80;
pub(crate) const VOL_HEAD_SIZE: usize = 32;
pub(crate) const MAP_HEAD_SIZE: usize = 48;

bitflags! {
    /// Disk status flags (`imsm_disk::status`).
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DiskStatus: u32 {
        const SPARE = 0x01;
        const CONFIGURED = 0x02;
        const FAILED = 0x04;
        const USABLE = 0x08;
    }
}

/// `map_state` values. 2 and 3 are carried forward exactly as the original
/// source assigns them; see `DESIGN.md` for why that FIXME is not treated
/// as a bug to fix here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum MapState {
    Normal = 0,
    Uninitialized = 1,
    Degraded = 2,
    Failed = 3,
}

impl MapState {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Normal),
            1 => Some(Self::Uninitialized),
            2 => Some(Self::Degraded),
            3 => Some(Self::Failed),
            _ => None,
        }
    }
}

/// On-disk `raid_level` values (the only ones this engine writes).
pub const IMSM_T_RAID0: u8 = 0;
pub const IMSM_T_RAID1: u8 = 1;
pub const IMSM_T_RAID5: u8 = 5;

/// Effective RAID level reported upward, distinguishing RAID-10 (stored as
/// `raid_level == 1` with more than two members) from plain RAID-1.
pub fn effective_raid_level(raid_level: u8, num_members: u8) -> u8 {
    if raid_level == IMSM_T_RAID1 {
        if num_members == 2 {
            1
        } else {
            10
        }
    } else {
        raid_level
    }
}

#[derive(Debug, thiserror::Error, Clone, Copy, PartialEq, Eq)]
pub enum MpbError {
    #[error("buffer too short to contain an MPB header")]
    Truncated,
    #[error("signature does not match the IMSM prefix")]
    BadSignature,
    #[error("unrecognised signature version suffix")]
    BadVersion,
    #[error("declared mpb_size ({declared}) does not match the supplied buffer length ({actual})")]
    BadSize { declared: u32, actual: usize },
    #[error("checksum mismatch: computed {computed:#010x}, stored {stored:#010x}")]
    BadChecksum { computed: u32, stored: u32 },
    #[error("index {index} out of range (0..{limit})")]
    OutOfRange { index: usize, limit: usize },
    #[error("container already holds the maximum of 2 volumes")]
    OverCapacity,
}

/// Fixed-size head of `struct imsm_super`.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawSuperHead {
    pub sig: [u8; MAX_SIGNATURE_LENGTH],
    pub check_sum: U32<LittleEndian>,
    pub mpb_size: U32<LittleEndian>,
    pub family_num: U32<LittleEndian>,
    pub generation_num: U32<LittleEndian>,
    pub reserved0: [U32<LittleEndian>; 2],
    pub num_disks: u8,
    pub num_raid_devs: u8,
    pub fill: [u8; 2],
    pub filler: [U32<LittleEndian>; 39],
}

const _: () = assert!(core::mem::size_of::<RawSuperHead>() == SUPER_HEAD_SIZE);

/// Fixed-size `struct imsm_disk`.
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawDiskRecord {
    pub serial: [u8; MAX_RAID_SERIAL_LEN],
    pub total_blocks: U32<LittleEndian>,
    pub scsi_id: U32<LittleEndian>,
    pub status: U32<LittleEndian>,
    pub filler: [U32<LittleEndian>; 5],
}

const _: () = assert!(core::mem::size_of::<RawDiskRecord>() == DISK_RECORD_SIZE);

/// Fixed-size head of `struct imsm_dev` (everything before `vol`).
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawDeviceHead {
    pub volume: [u8; MAX_RAID_SERIAL_LEN],
    pub size_low: U32<LittleEndian>,
    pub size_high: U32<LittleEndian>,
    pub status: U32<LittleEndian>,
    pub reserved_blocks: U32<LittleEndian>,
    pub filler: [U32<LittleEndian>; 12],
}

const _: () = assert!(core::mem::size_of::<RawDeviceHead>() == DEV_HEAD_SIZE);

/// Fixed-size head of `struct imsm_vol` (everything before the first map).
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawVolHead {
    pub reserved0: [U32<LittleEndian>; 2],
    pub migr_state: u8,
    pub migr_type: u8,
    pub dirty: u8,
    pub fill: [u8; 1],
    pub filler: [U32<LittleEndian>; 5],
}

const _: () = assert!(core::mem::size_of::<RawVolHead>() == VOL_HEAD_SIZE);

/// Fixed-size head of `struct imsm_map` (everything before `disk_ord_tbl`).
#[repr(C, packed)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct RawMapHead {
    pub pba_of_lba0: U32<LittleEndian>,
    pub blocks_per_member: U32<LittleEndian>,
    pub num_data_stripes: U32<LittleEndian>,
    pub blocks_per_strip: U16<LittleEndian>,
    pub map_state: u8,
    pub raid_level: u8,
    pub num_members: u8,
    pub reserved: [u8; 3],
    pub filler: [U32<LittleEndian>; 7],
}

const _: () = assert!(core::mem::size_of::<RawMapHead>() == MAP_HEAD_SIZE);

/// Total on-disk size of one map given its member count.
pub fn map_size(num_members: u8) -> usize {
    MAP_HEAD_SIZE + 4 * num_members as usize
}

/// Worst-case buffer size for a container holding `num_disks` disks: two
/// device records (the maximum `num_raid_devs`), each carrying both a
/// current and a migration map sized for every disk in the container.
pub fn disks_to_mpb_size(num_disks: u8) -> usize {
    let num_disks = num_disks as usize;
    let disk_table = num_disks * DISK_RECORD_SIZE;
    let one_map = map_size(num_disks as u8);
    let one_device = DEV_HEAD_SIZE + VOL_HEAD_SIZE + 2 * one_map;
    SUPER_HEAD_SIZE + disk_table + 2 * one_device
}

/// The 32-bit modular checksum: sum of every little-endian 32-bit word in
/// `bytes[0..len)`, minus the stored `check_sum` word (which lives at byte
/// offset 0x20). An MPB is valid iff this equals the stored checksum.
pub fn checksum(bytes: &[u8], len: usize) -> u32 {
    let mut sum: u32 = 0;
    let mut i = 0;
    while i < len {
        let word = u32::from_le_bytes(bytes[i..i + 4].try_into().unwrap());
        sum = sum.wrapping_add(word);
        i += 4;
    }
    let stored = u32::from_le_bytes(bytes[0x20..0x24].try_into().unwrap());
    sum.wrapping_sub(stored)
}

/// An owned, decoded MPB buffer with offset-walking accessors.
#[derive(Clone)]
pub struct Mpb {
    buf: Vec<u8>,
}

impl Mpb {
    fn head(&self) -> &RawSuperHead {
        bytemuck::from_bytes(&self.buf[..SUPER_HEAD_SIZE])
    }

    fn head_mut(&mut self) -> &mut RawSuperHead {
        bytemuck::from_bytes_mut(&mut self.buf[..SUPER_HEAD_SIZE])
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn mpb_size(&self) -> u32 {
        self.head().mpb_size.get()
    }

    pub fn family_num(&self) -> u32 {
        self.head().family_num.get()
    }

    pub fn set_family_num(&mut self, value: u32) {
        self.head_mut().family_num.set(value);
    }

    pub fn generation_num(&self) -> u32 {
        self.head().generation_num.get()
    }

    pub fn bump_generation(&mut self) -> u32 {
        let next = self.generation_num().wrapping_add(1);
        self.head_mut().generation_num.set(next);
        next
    }

    pub fn num_disks(&self) -> u8 {
        self.head().num_disks
    }

    pub fn num_raid_devs(&self) -> u8 {
        self.head().num_raid_devs
    }

    pub fn version(&self) -> Option<&str> {
        let sig = self.head().sig;
        let version_bytes = &sig[MPB_SIG_LEN..];
        let end = version_bytes.iter().position(|b| *b == 0).unwrap_or(version_bytes.len());
        core::str::from_utf8(&version_bytes[..end]).ok()
    }

    /// Builds a brand-new, empty container: header plus a zeroed disk
    /// table, no device records. `version` picks which RAID levels the
    /// container may later hold (`MPB_VERSION_RAID0`/`RAID1`/`RAID5`).
    pub fn new_container(num_disks: u8, version: &str) -> Self {
        let mut buf = vec![0u8; SUPER_HEAD_SIZE + num_disks as usize * DISK_RECORD_SIZE];
        {
            let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
            head.sig[..MPB_SIG_LEN].copy_from_slice(MPB_SIGNATURE_PREFIX);
            let version_bytes = version.as_bytes();
            head.sig[MPB_SIG_LEN..MPB_SIG_LEN + version_bytes.len()].copy_from_slice(version_bytes);
            head.num_disks = num_disks;
            head.num_raid_devs = 0;
            head.mpb_size.set(buf.len() as u32);
        }
        let sum = checksum(&buf, buf.len());
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
        head.check_sum.set(sum);
        Self { buf }
    }

    /// Parses a buffer into a decoded `Mpb`, validating signature, declared
    /// size, and checksum. Does not consult an external device — callers
    /// supply whatever bytes the anchor/extended I/O produced.
    pub fn decode(bytes: &[u8]) -> Result<Self, MpbError> {
        if bytes.len() < SUPER_HEAD_SIZE {
            return Err(MpbError::Truncated);
        }
        if &bytes[..MPB_SIG_LEN] != MPB_SIGNATURE_PREFIX {
            return Err(MpbError::BadSignature);
        }
        let head: &RawSuperHead = bytemuck::from_bytes(&bytes[..SUPER_HEAD_SIZE]);
        let version_bytes = &head.sig[MPB_SIG_LEN..];
        let version_end = version_bytes
            .iter()
            .position(|b| *b == 0)
            .unwrap_or(version_bytes.len());
        if core::str::from_utf8(&version_bytes[..version_end]).is_err() {
            return Err(MpbError::BadVersion);
        }
        let mpb_size = head.mpb_size.get();
        if mpb_size as usize != bytes.len() {
            return Err(MpbError::BadSize {
                declared: mpb_size,
                actual: bytes.len(),
            });
        }
        let computed = checksum(bytes, mpb_size as usize);
        let stored = head.check_sum.get();
        if computed != stored {
            return Err(MpbError::BadChecksum { computed, stored });
        }
        Ok(Self { buf: bytes.to_vec() })
    }

    /// Recomputes `mpb_size` to match the buffer's current length, bumps
    /// `generation_num`, and writes the checksum last — the order
    /// `write_super_imsm` follows (generation, then checksum, then bytes).
    pub fn finalize_for_write(&mut self) {
        let len = self.buf.len() as u32;
        self.head_mut().mpb_size.set(len);
        self.bump_generation();
        let sum = checksum(&self.buf, self.buf.len());
        self.head_mut().check_sum.set(sum);
    }

    pub fn disk(&self, index: u8) -> Result<&RawDiskRecord, MpbError> {
        let num_disks = self.num_disks();
        if index >= num_disks {
            return Err(MpbError::OutOfRange {
                index: index as usize,
                limit: num_disks as usize,
            });
        }
        let offset = SUPER_HEAD_SIZE + index as usize * DISK_RECORD_SIZE;
        Ok(bytemuck::from_bytes(&self.buf[offset..offset + DISK_RECORD_SIZE]))
    }

    pub fn disk_mut(&mut self, index: u8) -> Result<&mut RawDiskRecord, MpbError> {
        let num_disks = self.num_disks();
        if index >= num_disks {
            return Err(MpbError::OutOfRange {
                index: index as usize,
                limit: num_disks as usize,
            });
        }
        let offset = SUPER_HEAD_SIZE + index as usize * DISK_RECORD_SIZE;
        Ok(bytemuck::from_bytes_mut(
            &mut self.buf[offset..offset + DISK_RECORD_SIZE],
        ))
    }

    fn disk_table_end(&self) -> usize {
        SUPER_HEAD_SIZE + self.num_disks() as usize * DISK_RECORD_SIZE
    }

    /// Walks the variable-length device table to find device `index`'s
    /// byte offset, mirroring `get_imsm_dev`'s offset accumulation.
    pub fn device_offset(&self, index: u8) -> Result<usize, MpbError> {
        let num_raid_devs = self.num_raid_devs();
        if index >= num_raid_devs {
            return Err(MpbError::OutOfRange {
                index: index as usize,
                limit: num_raid_devs as usize,
            });
        }
        let mut offset = self.disk_table_end();
        for i in 0..index {
            offset += self.device_size_at(offset)?;
        }
        Ok(offset)
    }

    fn device_size_at(&self, offset: usize) -> Result<usize, MpbError> {
        let vol_offset = offset + DEV_HEAD_SIZE;
        let map0_offset = vol_offset + VOL_HEAD_SIZE;
        let map0: &RawMapHead = bytemuck::from_bytes(&self.buf[map0_offset..map0_offset + MAP_HEAD_SIZE]);
        let mut size = DEV_HEAD_SIZE + VOL_HEAD_SIZE + map_size(map0.num_members);
        let vol: &RawVolHead = bytemuck::from_bytes(&self.buf[vol_offset..vol_offset + VOL_HEAD_SIZE]);
        if vol.migr_state != 0 {
            let map1_offset = map0_offset + map_size(map0.num_members);
            let map1: &RawMapHead =
                bytemuck::from_bytes(&self.buf[map1_offset..map1_offset + MAP_HEAD_SIZE]);
            size += map_size(map1.num_members);
        }
        Ok(size)
    }

    /// Total on-disk size of device `index`'s record (`sizeof_imsm_dev`).
    pub fn sizeof_device(&self, index: u8) -> Result<usize, MpbError> {
        let offset = self.device_offset(index)?;
        self.device_size_at(offset)
    }

    pub fn device_head(&self, index: u8) -> Result<&RawDeviceHead, MpbError> {
        let offset = self.device_offset(index)?;
        Ok(bytemuck::from_bytes(&self.buf[offset..offset + DEV_HEAD_SIZE]))
    }

    pub fn device_head_mut(&mut self, index: u8) -> Result<&mut RawDeviceHead, MpbError> {
        let offset = self.device_offset(index)?;
        Ok(bytemuck::from_bytes_mut(
            &mut self.buf[offset..offset + DEV_HEAD_SIZE],
        ))
    }

    pub fn vol_head(&self, index: u8) -> Result<&RawVolHead, MpbError> {
        let offset = self.device_offset(index)? + DEV_HEAD_SIZE;
        Ok(bytemuck::from_bytes(&self.buf[offset..offset + VOL_HEAD_SIZE]))
    }

    pub fn vol_head_mut(&mut self, index: u8) -> Result<&mut RawVolHead, MpbError> {
        let offset = self.device_offset(index)? + DEV_HEAD_SIZE;
        Ok(bytemuck::from_bytes_mut(
            &mut self.buf[offset..offset + VOL_HEAD_SIZE],
        ))
    }

    /// Returns map `map_index` (0 or 1) of device `index`. Map 1 only
    /// exists while `migr_state != 0`.
    pub fn map(&self, index: u8, map_index: u8) -> Result<MapView<'_>, MpbError> {
        let offset = self.map_offset(index, map_index)?;
        let head: &RawMapHead = bytemuck::from_bytes(&self.buf[offset..offset + MAP_HEAD_SIZE]);
        let tbl_len = 4 * head.num_members as usize;
        let tbl_offset = offset + MAP_HEAD_SIZE;
        let disk_ord_tbl = &self.buf[tbl_offset..tbl_offset + tbl_len];
        Ok(MapView { head, disk_ord_tbl })
    }

    pub fn map_mut(&mut self, index: u8, map_index: u8) -> Result<MapViewMut<'_>, MpbError> {
        let offset = self.map_offset(index, map_index)?;
        let num_members = {
            let head: &RawMapHead =
                bytemuck::from_bytes(&self.buf[offset..offset + MAP_HEAD_SIZE]);
            head.num_members
        };
        let tbl_len = 4 * num_members as usize;
        let (head_part, tail_part) = self.buf[offset..].split_at_mut(MAP_HEAD_SIZE);
        let head: &mut RawMapHead = bytemuck::from_bytes_mut(head_part);
        let disk_ord_tbl = &mut tail_part[..tbl_len];
        Ok(MapViewMut { head, disk_ord_tbl })
    }

    fn map_offset(&self, index: u8, map_index: u8) -> Result<usize, MpbError> {
        let dev_offset = self.device_offset(index)?;
        let map0_offset = dev_offset + DEV_HEAD_SIZE + VOL_HEAD_SIZE;
        if map_index == 0 {
            return Ok(map0_offset);
        }
        let map0: &RawMapHead = bytemuck::from_bytes(&self.buf[map0_offset..map0_offset + MAP_HEAD_SIZE]);
        Ok(map0_offset + map_size(map0.num_members))
    }

    /// Appends a freshly zeroed region, growing the buffer to `new_size`
    /// bytes (already rounded to a sector multiple). The caller is
    /// responsible for writing into the new region afterward.
    pub fn grow_to(&mut self, new_size: usize) {
        self.buf.resize(new_size, 0);
    }

    /// Reserves spare capacity ahead of an upcoming [`Mpb::append_device`],
    /// so the reallocation happens off whatever critical path is calling
    /// this rather than during the append itself. Unlike [`Mpb::grow_to`],
    /// this never changes the buffer's length or offsets.
    pub fn reserve_capacity(&mut self, target_size: usize) {
        if target_size > self.buf.len() {
            self.buf.reserve(target_size - self.buf.len());
        }
    }

    /// Appends a fully-formed device record (device head + vol head + one
    /// or two maps, already serialized) at `num_raid_devs`'s slot and bumps
    /// the device count. Rejects a third volume; a container holds at most
    /// two.
    pub fn append_device(&mut self, record: &[u8]) -> Result<u8, MpbError> {
        let num_raid_devs = self.num_raid_devs();
        if num_raid_devs >= 2 {
            return Err(MpbError::OverCapacity);
        }
        self.buf.extend_from_slice(record);
        self.head_mut().num_raid_devs = num_raid_devs + 1;
        Ok(num_raid_devs)
    }
}

/// Borrowed view of a decoded map: fixed head plus the `disk_ord_tbl` tail.
pub struct MapView<'a> {
    pub head: &'a RawMapHead,
    pub disk_ord_tbl: &'a [u8],
}

impl<'a> MapView<'a> {
    /// Index into the container's disk table at `slot`, masking the
    /// reserved top byte (`get_imsm_disk_idx`).
    pub fn disk_ord(&self, slot: u8) -> u32 {
        let offset = slot as usize * 4;
        let raw = u32::from_le_bytes(self.disk_ord_tbl[offset..offset + 4].try_into().unwrap());
        raw & 0x00ff_ffff
    }

    pub fn effective_raid_level(&self) -> u8 {
        effective_raid_level(self.head.raid_level, self.head.num_members)
    }
}

pub struct MapViewMut<'a> {
    pub head: &'a mut RawMapHead,
    pub disk_ord_tbl: &'a mut [u8],
}

impl<'a> MapViewMut<'a> {
    pub fn set_disk_ord(&mut self, slot: u8, disk_index: u32) {
        let offset = slot as usize * 4;
        let top_byte = self.disk_ord_tbl[offset + 3] & 0xff;
        let mut bytes = (disk_index & 0x00ff_ffff).to_le_bytes();
        bytes[3] = top_byte;
        self.disk_ord_tbl[offset..offset + 4].copy_from_slice(&bytes);
    }

    pub fn disk_ord(&self, slot: u8) -> u32 {
        let offset = slot as usize * 4;
        let raw = u32::from_le_bytes(self.disk_ord_tbl[offset..offset + 4].try_into().unwrap());
        raw & 0x00ff_ffff
    }
}
