//! Volume builder: appending a new RAID device record to a loaded
//! container once its geometry has been validated by [`crate::geometry`].

use crate::geometry::VolumeGeometry;
use crate::mpb::{
    disks_to_mpb_size, map_size, MapState, Mpb, MpbError, RawDeviceHead, RawMapHead, RawVolHead,
    DEV_HEAD_SIZE, IMSM_T_RAID0, IMSM_T_RAID1, MAP_HEAD_SIZE, VOL_HEAD_SIZE,
};

#[derive(Debug, thiserror::Error)]
pub enum VolumeError {
    #[error(transparent)]
    Mpb(#[from] MpbError),
}

/// Parameters for a new volume, already validated by the geometry search.
pub struct NewVolumeSpec {
    /// On-disk `raid_level`: 0, 1 (covers both RAID-1 and RAID-10), or 5.
    pub raid_level: u8,
    pub num_members: u8,
    /// Sectors of data each member contributes.
    pub size_per_member: u64,
    /// Bytes; ignored for RAID-1/RAID-10, which fix `blocks_per_strip` at 128.
    pub chunk_size: u32,
    pub geometry: VolumeGeometry,
}

/// `blocks_per_strip` is fixed at 128 sectors for RAID-1/RAID-10; every
/// other level derives it from the requested chunk size.
pub fn blocks_per_strip(raid_level: u8, chunk_size: u32) -> u32 {
    if raid_level == IMSM_T_RAID1 {
        128
    } else {
        chunk_size / 512
    }
}

/// `num_data_stripes`, halved again for RAID-1/RAID-10 since both mirror
/// halves count toward `size` but only one holds unique data.
pub fn num_data_stripes(size: u64, raid_level: u8, blocks_per_strip: u32) -> u64 {
    let stripes = (size * 2) / blocks_per_strip as u64;
    if raid_level == IMSM_T_RAID1 {
        stripes / 2
    } else {
        stripes
    }
}

/// Appends a new device record to `mpb`, growing the buffer first if its
/// current size can't hold the worst-case enlarged tail, and initializes
/// the map's `disk_ord_tbl` from `spec.geometry.participating_disks`.
pub fn add_volume(mpb: &mut Mpb, spec: &NewVolumeSpec) -> Result<u8, VolumeError> {
    mpb.reserve_capacity(disks_to_mpb_size(mpb.num_disks()));

    let strip = blocks_per_strip(spec.raid_level, spec.chunk_size);
    let stripes = num_data_stripes(spec.size_per_member, spec.raid_level, strip);
    let map_state = if spec.raid_level == IMSM_T_RAID0 {
        MapState::Normal
    } else {
        MapState::Uninitialized
    };

    let map_len = map_size(spec.num_members);
    let record_len = DEV_HEAD_SIZE + VOL_HEAD_SIZE + map_len;
    let mut record = vec![0u8; record_len];

    {
        let dev: &mut RawDeviceHead = bytemuck::from_bytes_mut(&mut record[..DEV_HEAD_SIZE]);
        dev.size_low.set((spec.size_per_member & 0xffff_ffff) as u32);
        dev.size_high.set((spec.size_per_member >> 32) as u32);
    }
    let vol_offset = DEV_HEAD_SIZE;
    let map_offset = vol_offset + VOL_HEAD_SIZE;
    {
        let vol: &mut RawVolHead =
            bytemuck::from_bytes_mut(&mut record[vol_offset..vol_offset + VOL_HEAD_SIZE]);
        vol.migr_state = 0;
        vol.dirty = 0;
    }
    {
        let map_head: &mut RawMapHead =
            bytemuck::from_bytes_mut(&mut record[map_offset..map_offset + MAP_HEAD_SIZE]);
        map_head.pba_of_lba0.set(spec.geometry.pba_of_lba0 as u32);
        map_head.blocks_per_member.set(spec.size_per_member as u32);
        map_head.num_data_stripes.set(stripes as u32);
        map_head.blocks_per_strip.set(strip as u16);
        map_head.map_state = map_state as u8;
        map_head.raid_level = spec.raid_level;
        map_head.num_members = spec.num_members;
    }
    let tbl_offset = map_offset + MAP_HEAD_SIZE;
    for (slot, &disk_index) in spec.geometry.participating_disks.iter().enumerate() {
        let entry = &mut record[tbl_offset + slot * 4..tbl_offset + slot * 4 + 4];
        entry.copy_from_slice(&(disk_index as u32).to_le_bytes());
    }

    mpb.append_device(&record).map_err(VolumeError::Mpb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::VolumeGeometry;
    use crate::mpb::{checksum, RawSuperHead, MPB_SIGNATURE_PREFIX, MPB_VERSION_RAID1};

    fn container_buf(num_disks: u8) -> Vec<u8> {
        use crate::mpb::{DISK_RECORD_SIZE, SUPER_HEAD_SIZE};
        let mut buf = vec![0u8; SUPER_HEAD_SIZE + num_disks as usize * DISK_RECORD_SIZE];
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
        head.sig[..MPB_SIGNATURE_PREFIX.len()].copy_from_slice(MPB_SIGNATURE_PREFIX);
        head.sig[MPB_SIGNATURE_PREFIX.len()..MPB_SIGNATURE_PREFIX.len() + 6]
            .copy_from_slice(MPB_VERSION_RAID1.as_bytes());
        head.num_disks = num_disks;
        head.num_raid_devs = 0;
        head.mpb_size.set(buf.len() as u32);
        let sum = checksum(&buf, buf.len());
        let head: &mut RawSuperHead = bytemuck::from_bytes_mut(&mut buf[..SUPER_HEAD_SIZE]);
        head.check_sum.set(sum);
        buf
    }

    #[test]
    fn blocks_per_strip_is_fixed_for_mirrors() {
        assert_eq!(blocks_per_strip(IMSM_T_RAID1, 65536), 128);
        assert_eq!(blocks_per_strip(0, 65536), 128);
    }

    #[test]
    fn adding_a_raid1_volume_sets_disk_ord_tbl_and_map_state() {
        let buf = container_buf(2);
        let mut mpb = Mpb::decode(&buf).unwrap();
        let spec = NewVolumeSpec {
            raid_level: IMSM_T_RAID1,
            num_members: 2,
            size_per_member: 2_000_000,
            chunk_size: 0,
            geometry: VolumeGeometry {
                pba_of_lba0: 0,
                participating_disks: vec![0, 1],
            },
        };
        let index = add_volume(&mut mpb, &spec).unwrap();
        assert_eq!(index, 0);
        assert_eq!(mpb.num_raid_devs(), 1);

        let map = mpb.map(0, 0).unwrap();
        assert_eq!(map.head.num_members, 2);
        assert_eq!(map.head.map_state, MapState::Uninitialized as u8);
        assert_eq!(map.disk_ord(0), 0);
        assert_eq!(map.disk_ord(1), 1);
    }

    #[test]
    fn second_volume_is_rejected_after_two() {
        let buf = container_buf(2);
        let mut mpb = Mpb::decode(&buf).unwrap();
        let spec = |disks: Vec<u8>| NewVolumeSpec {
            raid_level: IMSM_T_RAID0,
            num_members: 2,
            size_per_member: 100,
            chunk_size: 65536,
            geometry: VolumeGeometry {
                pba_of_lba0: 0,
                participating_disks: disks,
            },
        };
        add_volume(&mut mpb, &spec(vec![0, 1])).unwrap();
        add_volume(&mut mpb, &spec(vec![0, 1])).unwrap();
        assert!(matches!(
            add_volume(&mut mpb, &spec(vec![0, 1])),
            Err(VolumeError::Mpb(MpbError::OverCapacity))
        ));
    }
}
