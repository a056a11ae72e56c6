//! Geometry validator: per-disk extent accounting used by container and
//! volume creation.

use std::collections::HashMap;

use crate::mpb::{Mpb, MpbError, IMSM_RESERVED_SECTORS, MPB_SECTOR_CNT};

/// One occupied (or, as the trailing sentinel, free-space-boundary) region
/// of a disk, in sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: u64,
    pub size: u64,
}

/// Sectors usable for member data on a raw disk of `total_blocks` sectors,
/// after reserving the trailing metadata region (`avail_size_imsm`).
pub fn avail_size(total_blocks: u64) -> u64 {
    total_blocks.saturating_sub((MPB_SECTOR_CNT + IMSM_RESERVED_SECTORS) as u64)
}

/// Builds `disk_index`'s extent list: one entry per volume map that
/// references it, sorted by start, terminated by the sentinel
/// `(avail_size, 0)` marking the end of usable space.
pub fn extents_for_disk(mpb: &Mpb, disk_index: u8, total_blocks: u64) -> Result<Vec<Extent>, MpbError> {
    let mut extents = Vec::new();
    for dev in 0..mpb.num_raid_devs() {
        let vol = mpb.vol_head(dev)?;
        let migrating = vol.migr_state != 0;
        let map_count = if migrating { 2 } else { 1 };
        for map_index in 0..map_count {
            let map = mpb.map(dev, map_index)?;
            let present = (0..map.head.num_members).any(|slot| map.disk_ord(slot) == disk_index as u32);
            if present {
                extents.push(Extent {
                    start: map.head.pba_of_lba0.get() as u64,
                    size: map.head.blocks_per_member.get() as u64,
                });
            }
        }
    }
    extents.sort_by_key(|e| e.start);
    extents.push(Extent {
        start: avail_size(total_blocks),
        size: 0,
    });
    Ok(extents)
}

/// Free gaps between consecutive extents, including the trailing region up
/// to the sentinel.
pub fn free_gaps(extents: &[Extent]) -> Vec<Extent> {
    let mut gaps = Vec::new();
    let mut cursor = 0u64;
    for e in extents {
        if e.start > cursor {
            gaps.push(Extent {
                start: cursor,
                size: e.start - cursor,
            });
        }
        cursor = cursor.max(e.start + e.size);
    }
    gaps
}

/// Result of a successful volume-creation geometry search: a starting
/// offset shared by at least `raiddisks` member disks.
#[derive(Debug, Clone)]
pub struct VolumeGeometry {
    pub pba_of_lba0: u64,
    pub participating_disks: Vec<u8>,
}

/// Searches for a `pba_of_lba0` that at least `raiddisks` of `disks` can
/// host a `size`-sector member at, i.e. each has a free gap containing
/// `[pba_of_lba0, pba_of_lba0 + size)`. Ties broken by the lowest offset,
/// then the lowest disk indices, both deterministic choices.
pub fn validate_volume_geometry(
    mpb: &Mpb,
    disks: &[(u8, u64)],
    raiddisks: usize,
    size: u64,
) -> Result<Option<VolumeGeometry>, MpbError> {
    let mut offset_disks: HashMap<u64, Vec<u8>> = HashMap::new();
    for &(disk_index, total_blocks) in disks {
        let extents = extents_for_disk(mpb, disk_index, total_blocks)?;
        for gap in free_gaps(&extents) {
            if gap.size >= size {
                offset_disks.entry(gap.start).or_default().push(disk_index);
            }
        }
    }

    let best = offset_disks
        .into_iter()
        .filter(|(_, qualifying)| qualifying.len() >= raiddisks)
        .min_by_key(|(start, _)| *start);

    Ok(best.map(|(pba_of_lba0, mut qualifying)| {
        qualifying.sort_unstable();
        qualifying.truncate(raiddisks);
        VolumeGeometry {
            pba_of_lba0,
            participating_disks: qualifying,
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn avail_size_reserves_trailing_metadata_region() {
        assert_eq!(avail_size(1_000_000), 1_000_000 - 418 - 4096);
    }

    #[test]
    fn avail_size_saturates_on_tiny_disks() {
        assert_eq!(avail_size(10), 0);
    }

    #[test]
    fn free_gaps_finds_interior_and_trailing_space() {
        let extents = vec![
            Extent { start: 100, size: 50 },
            Extent { start: 300, size: 20 },
            Extent { start: 1000, size: 0 }, // sentinel
        ];
        let gaps = free_gaps(&extents);
        assert_eq!(
            gaps,
            vec![
                Extent { start: 0, size: 100 },
                Extent { start: 150, size: 150 },
                Extent { start: 320, size: 680 },
            ]
        );
    }

    #[test]
    fn free_gaps_on_empty_disk_is_one_gap() {
        let extents = vec![Extent { start: 5000, size: 0 }];
        let gaps = free_gaps(&extents);
        assert_eq!(gaps, vec![Extent { start: 0, size: 5000 }]);
    }
}
