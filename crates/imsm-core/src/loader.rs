//! Super loader: assembling one consistent in-memory MPB from a set of
//! member disks, each of which may carry a stale, foreign, or corrupt copy.

use crate::mpb::{Mpb, MpbError};
use imsm_common::ascii::AsciiArray;
use imsm_common::MAX_RAID_SERIAL_LEN;
use imsm_io::anchor::{self, AnchorIoError};
use imsm_io::device::BlockDevice;
use imsm_scsi::{read_serial, ScsiChannel, ScsiError};

/// Thin re-export so callers assembling a [`Member`] list don't need a
/// direct `imsm-scsi` dependency just to read a disk's canonical serial.
pub fn member_serial(channel: &mut impl ScsiChannel) -> Result<[u8; MAX_RAID_SERIAL_LEN], ScsiError> {
    read_serial(channel)
}

#[derive(Debug, thiserror::Error)]
pub enum LoaderError {
    #[error(transparent)]
    Io(#[from] AnchorIoError),
    #[error("no member disk carried a valid IMSM signature and checksum")]
    NoValidMember,
}

/// One member disk offered to the loader, identified by its already
/// canonicalised SCSI serial (see `imsm-scsi::read_serial`).
pub struct Member<'d, D: BlockDevice> {
    pub serial: [u8; MAX_RAID_SERIAL_LEN],
    pub device: &'d mut D,
}

/// A member disk's resolved position in the winning super's disk table.
#[derive(Debug, Clone, Copy)]
pub struct ResolvedSlot {
    /// Index into the `members` slice passed to [`load_super`].
    pub member_index: usize,
    /// Index into the winning MPB's disk table, or `None` if this disk's
    /// serial is absent from it (a candidate spare).
    pub disk_index: Option<u8>,
}

pub struct LoadedSuper {
    pub mpb: Mpb,
    pub slots: Vec<ResolvedSlot>,
}

/// Reads and decodes every member's MPB, keeping only those that pass
/// signature/checksum validation, then selects the highest-generation
/// survivor as authoritative. Ties broken by member order (`members[0]`
/// wins among equals), a stable and deterministic rule.
pub fn load_super<D: BlockDevice>(members: &mut [Member<'_, D>]) -> Result<LoadedSuper, LoaderError> {
    let mut best: Option<(usize, Mpb)> = None;

    for (i, member) in members.iter_mut().enumerate() {
        let mpb = match read_member_mpb(member.device) {
            Ok(mpb) => mpb,
            Err(MemberReadError::Io(e)) => return Err(e.into()),
            Err(MemberReadError::Decode(e)) => {
                tracing::debug!(member = i, error = %e, "discarding member with invalid MPB");
                continue;
            }
        };
        let better = match &best {
            None => true,
            Some((_, current)) => mpb.generation_num() > current.generation_num(),
        };
        if better {
            best = Some((i, mpb));
        }
    }

    let (_, mpb) = best.ok_or(LoaderError::NoValidMember)?;
    let slots = resolve_slots(&mpb, members);
    Ok(LoadedSuper { mpb, slots })
}

enum MemberReadError {
    Io(AnchorIoError),
    Decode(MpbError),
}

impl From<AnchorIoError> for MemberReadError {
    fn from(e: AnchorIoError) -> Self {
        Self::Io(e)
    }
}

fn read_member_mpb<D: BlockDevice>(device: &mut D) -> Result<Mpb, MemberReadError> {
    let anchor_sector = anchor::read_anchor_sector(device)?;
    // mpb_size lives at byte offset 0x24 of the anchor sector.
    let mpb_size = u32::from_le_bytes(anchor_sector[0x24..0x28].try_into().unwrap());
    let buf = if mpb_size as usize <= anchor::SECTOR_SIZE as usize {
        anchor_sector.to_vec()
    } else {
        let extension = anchor::read_extended(device, mpb_size)?;
        let mut buf = Vec::with_capacity(mpb_size as usize);
        buf.extend_from_slice(&anchor_sector);
        buf.extend_from_slice(&extension);
        buf
    };
    Mpb::decode(&buf).map_err(MemberReadError::Decode)
}

fn resolve_slots<D: BlockDevice>(mpb: &Mpb, members: &[Member<'_, D>]) -> Vec<ResolvedSlot> {
    members
        .iter()
        .enumerate()
        .map(|(member_index, member)| {
            let disk_index = (0..mpb.num_disks()).find(|&i| {
                let disk = mpb.disk(i).expect("index bounded by num_disks");
                serials_match(&disk.serial, &member.serial)
            });
            ResolvedSlot {
                member_index,
                disk_index,
            }
        })
        .collect()
}

fn serials_match(a: &[u8; MAX_RAID_SERIAL_LEN], b: &[u8; MAX_RAID_SERIAL_LEN]) -> bool {
    AsciiArray::from_bytes(*a).as_bytes() == AsciiArray::from_bytes(*b).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpb::{MPB_SIGNATURE_PREFIX, MPB_VERSION_RAID0};
    use imsm_io::device::FileBlockDevice;
    use std::io::Write as _;

    fn fixture_device(len: usize) -> (tempfile::NamedTempFile, FileBlockDevice) {
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

    fn minimal_mpb_bytes(generation: u32, serial: &[u8; MAX_RAID_SERIAL_LEN]) -> Vec<u8> {
        use crate::mpb::{checksum, RawDiskRecord, RawSuperHead};
        const SUPER_HEAD_SIZE: usize = core::mem::size_of::<RawSuperHead>();
        const DISK_RECORD_SIZE: usize = core::mem::size_of::<RawDiskRecord>();
        let mut buf = vec![0u8; SUPER_HEAD_SIZE + DISK_RECORD_SIZE];
        {
            let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
            head.sig[..MPB_SIGNATURE_PREFIX.len()].copy_from_slice(MPB_SIGNATURE_PREFIX);
            head.sig[MPB_SIGNATURE_PREFIX.len()..MPB_SIGNATURE_PREFIX.len() + 6]
                .copy_from_slice(MPB_VERSION_RAID0.as_bytes());
            head.num_disks = 1;
            head.num_raid_devs = 0;
            head.generation_num.set(generation);
            head.mpb_size.set(buf.len() as u32);
        }
        {
            let disk: &mut RawDiskRecord =
                bytemuck::from_bytes_mut(&mut buf[SUPER_HEAD_SIZE..SUPER_HEAD_SIZE + DISK_RECORD_SIZE]);
            disk.serial = *serial;
        }
        let sum = checksum(&buf, buf.len());
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
        head.check_sum.set(sum);
        buf
    }

    fn serial_of(tag: &str) -> [u8; MAX_RAID_SERIAL_LEN] {
        let mut s = [0u8; MAX_RAID_SERIAL_LEN];
        s[..tag.len()].copy_from_slice(tag.as_bytes());
        s
    }

    #[test]
    fn picks_highest_generation_regardless_of_order() {
        let serial_a = serial_of("DISKA");
        let mpb_bytes_gen7 = minimal_mpb_bytes(7, &serial_a);
        let mpb_bytes_gen5 = minimal_mpb_bytes(5, &serial_a);

        let (_t1, mut dev1) = fixture_device(8192);
        anchor::write_mpb(&mut dev1, &mpb_bytes_gen5).unwrap();
        let (_t2, mut dev2) = fixture_device(8192);
        anchor::write_mpb(&mut dev2, &mpb_bytes_gen7).unwrap();

        let mut members = vec![
            Member {
                serial: serial_a,
                device: &mut dev1,
            },
            Member {
                serial: serial_a,
                device: &mut dev2,
            },
        ];
        let loaded = load_super(&mut members).unwrap();
        assert_eq!(loaded.mpb.generation_num(), 7);
    }

    #[test]
    fn stale_member_is_still_resolved_into_slots() {
        let serial_a = serial_of("DISKA");
        let (_t1, mut dev1) = fixture_device(8192);
        anchor::write_mpb(&mut dev1, &minimal_mpb_bytes(7, &serial_a)).unwrap();
        let (_t2, mut dev2) = fixture_device(8192);
        anchor::write_mpb(&mut dev2, &minimal_mpb_bytes(5, &serial_a)).unwrap();

        let mut members = vec![
            Member {
                serial: serial_a,
                device: &mut dev2,
            },
            Member {
                serial: serial_a,
                device: &mut dev1,
            },
        ];
        let loaded = load_super(&mut members).unwrap();
        assert_eq!(loaded.mpb.generation_num(), 7);
        assert_eq!(loaded.slots.len(), 2);
        assert!(loaded.slots.iter().all(|s| s.disk_index == Some(0)));
    }

    #[test]
    fn tampered_checksum_falls_through_to_other_member() {
        let serial_a = serial_of("DISKA");
        let mut good = minimal_mpb_bytes(1, &serial_a);
        let (_t1, mut dev_good) = fixture_device(8192);
        anchor::write_mpb(&mut dev_good, &good).unwrap();

        let last = good.len() - 1;
        good[last] ^= 0xFF; // corrupt a copy that is never written back
        let (_t2, mut dev_bad) = fixture_device(8192);
        // write the tampered checksum directly, bypassing write_mpb's own
        // checksum (which we don't call here — we want a deliberately bad copy)
        anchor::write_mpb(&mut dev_bad, &good).unwrap();

        let mut members = vec![
            Member {
                serial: serial_a,
                device: &mut dev_bad,
            },
            Member {
                serial: serial_a,
                device: &mut dev_good,
            },
        ];
        let loaded = load_super(&mut members).unwrap();
        assert_eq!(loaded.mpb.generation_num(), 1);
    }

    #[test]
    fn no_valid_member_is_an_error() {
        let (_t1, mut dev1) = fixture_device(8192);
        let mut members = vec![Member {
            serial: serial_of("NONE"),
            device: &mut dev1,
        }];
        assert!(matches!(
            load_super(&mut members),
            Err(LoaderError::NoValidMember)
        ));
    }
}
