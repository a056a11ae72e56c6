//! Spare picker: choosing replacement disks for a degraded array's empty
//! slots. Mutation flows only through [`crate::update`]; this module just
//! proposes `activate_spare` records.

use crate::geometry::{extents_for_disk, free_gaps};
use crate::mpb::{DiskStatus, Mpb, MpbError};
use crate::update::UpdateRecord;

/// A disk's total size, needed to compute its extent list.
#[derive(Debug, Clone, Copy)]
pub struct DiskSize {
    pub disk_index: u8,
    pub total_blocks: u64,
}

/// Finds spare candidates for the listed empty `slots` of `dev`'s primary
/// map and chains them into one `activate_spare` update envelope. Returns
/// `None` if no slot found a candidate.
pub fn pick_spares(
    mpb: &Mpb,
    dev: u8,
    slots: &[u8],
    disk_sizes: &[DiskSize],
) -> Result<Option<UpdateRecord>, MpbError> {
    let map = mpb.map(dev, 0)?;
    let pba_of_lba0 = map.head.pba_of_lba0.get() as u64;
    let component_size = map.head.blocks_per_member.get() as u64;
    let present: Vec<u32> = (0..map.head.num_members).map(|s| map.disk_ord(s)).collect();
    drop(map);

    let mut already_picked: Vec<u8> = Vec::new();
    let mut chain: Option<UpdateRecord> = None;

    for &slot in slots {
        let candidate = disk_sizes.iter().find(|size| {
            if present.contains(&(size.disk_index as u32)) || already_picked.contains(&size.disk_index) {
                return false;
            }
            let status = match mpb.disk(size.disk_index) {
                Ok(disk) => disk.status.get(),
                Err(_) => return false,
            };
            if status & DiskStatus::SPARE.bits() == 0 {
                return false;
            }
            let extents = match extents_for_disk(mpb, size.disk_index, size.total_blocks) {
                Ok(e) => e,
                Err(_) => return false,
            };
            free_gaps(&extents).iter().any(|gap| {
                gap.start <= pba_of_lba0 && pba_of_lba0 + component_size <= gap.start + gap.size
            })
        });

        if let Some(size) = candidate {
            already_picked.push(size.disk_index);
            chain = Some(UpdateRecord::ActivateSpare {
                disk_idx: size.disk_index,
                slot,
                array: dev,
                next: chain.map(Box::new),
            });
        } else {
            tracing::debug!(dev, slot, "no spare candidate fits this slot's extent");
        }
    }

    Ok(chain)
}
