//! Read-only reporting operations dropped by the distillation but present
//! in the original source: `compare_super`, `getinfo_super`, and the
//! `brief_examine`/`text_version` formatters (SPEC_FULL.md §4.10).

use crate::mpb::{Mpb, MpbError};

/// Compares two loaded supers for family identity: same signature version,
/// family number, declared size, and byte-identical contents.
pub fn compare_super(a: &Mpb, b: &Mpb) -> bool {
    a.version() == b.version()
        && a.family_num() == b.family_num()
        && a.mpb_size() == b.mpb_size()
        && a.as_bytes() == b.as_bytes()
}

/// Per-volume summary analogous to mdadm's `mdinfo`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeInfo {
    /// Effective level: RAID-10 is reported as 10, not 1.
    pub raid_level: u8,
    pub array_size: u64,
    pub component_size: u64,
    pub num_members: u8,
}

/// Derives a [`VolumeInfo`] for device `dev`'s primary map.
pub fn getinfo_super(mpb: &Mpb, dev: u8) -> Result<VolumeInfo, MpbError> {
    let map = mpb.map(dev, 0)?;
    let num_members = map.head.num_members;
    let component_size = map.head.blocks_per_member.get() as u64;
    let raid_level = map.effective_raid_level();
    let array_size = match raid_level {
        0 => component_size * num_members as u64,
        5 => component_size * (num_members as u64 - 1),
        _ => component_size,
    };
    Ok(VolumeInfo {
        raid_level,
        array_size,
        component_size,
        num_members,
    })
}

/// The `ARRAY ... family=<hex>` one-liner `mdadm --examine --brief` prints
/// for an IMSM container.
pub fn brief_examine(mpb: &Mpb) -> String {
    format!("ARRAY metadata=external:imsm family={:08x}", mpb.family_num())
}

/// `/<container-name>/<subarray-index>`, used to report which subarray of
/// a container a given device record belongs to.
pub fn text_version(container: &str, dev: u8) -> String {
    format!("/{container}/{dev}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mpb::{checksum, RawMapHead, RawSuperHead, DEV_HEAD_SIZE, DISK_RECORD_SIZE, MAP_HEAD_SIZE, MPB_SIGNATURE_PREFIX, MPB_VERSION_RAID5, SUPER_HEAD_SIZE, VOL_HEAD_SIZE};

    fn raid5_container() -> Mpb {
        let num_disks = 4u8;
        let map_len = MAP_HEAD_SIZE + 4 * num_disks as usize;
        let dev_len = DEV_HEAD_SIZE + VOL_HEAD_SIZE + map_len;
        let mut buf = vec![0u8; SUPER_HEAD_SIZE + num_disks as usize * DISK_RECORD_SIZE + dev_len];
        {
            let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
            head.sig[..MPB_SIGNATURE_PREFIX.len()].copy_from_slice(MPB_SIGNATURE_PREFIX);
            head.sig[MPB_SIGNATURE_PREFIX.len()..MPB_SIGNATURE_PREFIX.len() + 6]
                .copy_from_slice(MPB_VERSION_RAID5.as_bytes());
            head.num_disks = num_disks;
            head.num_raid_devs = 1;
            head.family_num.set(0xCAFEBABE);
            head.mpb_size.set(buf.len() as u32);
        }
        let dev_offset = SUPER_HEAD_SIZE + num_disks as usize * DISK_RECORD_SIZE;
        let map_offset = dev_offset + DEV_HEAD_SIZE + VOL_HEAD_SIZE;
        {
            let map: &mut RawMapHead = bytemuck::from_bytes_mut(&mut buf[map_offset..map_offset + MAP_HEAD_SIZE]);
            map.num_members = num_disks;
            map.raid_level = 5;
            map.blocks_per_member.set(1_000_000);
        }
        let sum = checksum(&buf, buf.len());
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
        head.check_sum.set(sum);
        Mpb::decode(&buf).unwrap()
    }

    #[test]
    fn getinfo_reports_raid5_array_size_as_n_minus_one_components() {
        let mpb = raid5_container();
        let info = getinfo_super(&mpb, 0).unwrap();
        assert_eq!(info.raid_level, 5);
        assert_eq!(info.num_members, 4);
        assert_eq!(info.array_size, 3_000_000);
    }

    #[test]
    fn brief_examine_includes_family_number_in_hex() {
        let mpb = raid5_container();
        assert_eq!(brief_examine(&mpb), "ARRAY metadata=external:imsm family=cafebabe");
    }

    #[test]
    fn text_version_formats_container_and_subarray() {
        assert_eq!(text_version("imsm0", 1), "/imsm0/1");
    }

    #[test]
    fn compare_super_detects_divergent_family() {
        let a = raid5_container();
        let mut b_buf = a.as_bytes().to_vec();
        {
            let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut b_buf[..SUPER_HEAD_SIZE]);
            head.family_num.set(0x11111111);
        }
        let sum = checksum(&b_buf, b_buf.len());
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut b_buf[..SUPER_HEAD_SIZE]);
        head.check_sum.set(sum);
        let b = Mpb::decode(&b_buf).unwrap();
        assert!(!compare_super(&a, &b));
    }
}
