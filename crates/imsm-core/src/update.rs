//! Proposed-update protocol: tagged `activate_spare`/`create_array`
//! records, prepared off the monitor's critical path and applied with the
//! race/overlap checks `imsm_process_update` runs before mutating anything.

use crate::mpb::{disks_to_mpb_size, DiskStatus, Mpb, MpbError, RawMapHead, DEV_HEAD_SIZE, MAP_HEAD_SIZE, VOL_HEAD_SIZE};

/// One proposed mutation to a loaded container. `ActivateSpare` records may
/// be chained through `next` so one manager submission can activate
/// several spares in one monitor cycle.
#[derive(Debug, Clone)]
pub enum UpdateRecord {
    ActivateSpare {
        disk_idx: u8,
        slot: u8,
        array: u8,
        next: Option<Box<UpdateRecord>>,
    },
    CreateArray {
        device_record: Vec<u8>,
        dev_idx: u8,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error(transparent)]
    Mpb(#[from] MpbError),
}

/// Pre-allocates any larger MPB buffer the apply step will need, off the
/// monitor's critical path.
pub fn prepare_update(mpb: &mut Mpb, record: &UpdateRecord) {
    if matches!(record, UpdateRecord::CreateArray { .. }) {
        mpb.reserve_capacity(disks_to_mpb_size(mpb.num_disks()));
    }
}

/// Applies one update record (and any chained `ActivateSpare.next`) to the
/// container. A record that loses a race or targets unknown state is
/// dropped with a diagnostic, not surfaced as an error — mirroring
/// `imsm_process_update`, which never aborts the monitor loop.
pub fn process_update(mpb: &mut Mpb, record: &UpdateRecord) -> Result<(), UpdateError> {
    match record {
        UpdateRecord::ActivateSpare {
            disk_idx,
            slot,
            array,
            next,
        } => {
            apply_activate_spare(mpb, *disk_idx, *slot, *array)?;
            if let Some(next) = next {
                process_update(mpb, next)?;
            }
        }
        UpdateRecord::CreateArray { device_record, dev_idx } => {
            apply_create_array(mpb, device_record, *dev_idx)?;
        }
    }
    Ok(())
}

fn apply_activate_spare(mpb: &mut Mpb, disk_idx: u8, slot: u8, array: u8) -> Result<(), UpdateError> {
    if mpb.disk(disk_idx).is_err() {
        tracing::debug!(disk_idx, "activate_spare dropped: unknown disk");
        return Ok(());
    }

    let victim = mpb.map(array, 0)?.disk_ord(slot);
    mpb.map_mut(array, 0)?.set_disk_ord(slot, disk_idx as u32);
    set_disk_status(mpb, disk_idx, DiskStatus::CONFIGURED.bits(), 0)?;

    let mut members = 0u32;
    let mut found = 0u32;
    for dev in 0..mpb.num_raid_devs() {
        let map = mpb.map(dev, 0)?;
        if map.head.raid_level == 0 {
            continue;
        }
        members += 1;
        if (0..map.head.num_members).any(|s| map.disk_ord(s) == disk_idx as u32) {
            found += 1;
        }
    }
    if found >= members {
        set_disk_status(mpb, disk_idx, 0, DiskStatus::SPARE.bits())?;
    }

    let mut victim_refs = 0u32;
    for dev in 0..mpb.num_raid_devs() {
        let map = mpb.map(dev, 0)?;
        if (0..map.head.num_members).any(|s| map.disk_ord(s) == victim) {
            victim_refs += 1;
        }
    }
    if victim_refs == 0 {
        if mpb.disk(victim as u8).is_ok() {
            set_disk_status(
                mpb,
                victim as u8,
                0,
                DiskStatus::CONFIGURED.bits() | DiskStatus::USABLE.bits(),
            )?;
        }
    }

    tracing::info!(disk_idx, slot, array, victim, "activated spare");
    Ok(())
}

fn apply_create_array(mpb: &mut Mpb, device_record: &[u8], dev_idx: u8) -> Result<(), UpdateError> {
    let num_raid_devs = mpb.num_raid_devs();
    if dev_idx < num_raid_devs {
        tracing::debug!(dev_idx, num_raid_devs, "create_array dropped: lost the race");
        return Ok(());
    }
    if dev_idx != num_raid_devs {
        tracing::debug!(dev_idx, num_raid_devs, "create_array dropped: out of sequence");
        return Ok(());
    }

    let map_offset = DEV_HEAD_SIZE + VOL_HEAD_SIZE;
    if device_record.len() < map_offset + MAP_HEAD_SIZE {
        tracing::debug!("create_array dropped: truncated device record");
        return Ok(());
    }
    let new_map: &RawMapHead = bytemuck::from_bytes(&device_record[map_offset..map_offset + MAP_HEAD_SIZE]);
    let num_members = new_map.num_members;
    if num_members > mpb.num_disks() {
        tracing::debug!(num_members, num_disks = mpb.num_disks(), "create_array dropped: too many members");
        return Ok(());
    }
    let new_start = new_map.pba_of_lba0.get() as u64;
    let new_len = new_map.blocks_per_member.get() as u64;
    let tbl_offset = map_offset + MAP_HEAD_SIZE;
    let new_disks: Vec<u32> = (0..num_members)
        .map(|s| {
            let off = tbl_offset + s as usize * 4;
            u32::from_le_bytes(device_record[off..off + 4].try_into().unwrap()) & 0x00ff_ffff
        })
        .collect();

    let mut overlap = false;
    for dev in 0..mpb.num_raid_devs() {
        let existing = mpb.map(dev, 0)?;
        let existing_start = existing.head.pba_of_lba0.get() as u64;
        let existing_len = existing.head.blocks_per_member.get() as u64;
        if !ranges_overlap(new_start, new_len, existing_start, existing_len) {
            continue;
        }
        overlap = true;
        let disk_overlap = (0..existing.head.num_members).any(|s| new_disks.contains(&existing.disk_ord(s)));
        if disk_overlap {
            tracing::debug!(dev, "create_array dropped: overlapping extent and disk set");
            return Ok(());
        }
    }

    mpb.append_device(device_record)?;

    // A sticky overlap flag, not a per-disk check: any extent overlap with
    // an existing array (one that didn't also share disks, or it would
    // have been rejected above) clears SPARE on every member of the new
    // array, not just the ones independently reused elsewhere.
    let clear = if overlap { DiskStatus::SPARE.bits() } else { 0 };
    for &disk_idx in &new_disks {
        set_disk_status(mpb, disk_idx as u8, DiskStatus::CONFIGURED.bits(), clear)?;
    }

    tracing::info!(dev_idx, members = num_members, "created array");
    Ok(())
}

fn set_disk_status(mpb: &mut Mpb, disk_idx: u8, set_bits: u32, clear_bits: u32) -> Result<(), MpbError> {
    let disk = mpb.disk_mut(disk_idx)?;
    let status = disk.status.get();
    disk.status.set((status | set_bits) & !clear_bits);
    Ok(())
}

fn ranges_overlap(a_start: u64, a_len: u64, b_start: u64, b_len: u64) -> bool {
    if a_len == 0 || b_len == 0 {
        return false;
    }
    let a_end = a_start + a_len - 1;
    let b_end = b_start + b_len - 1;
    (a_start >= b_start && a_start <= b_end) || (b_start >= a_start && b_start <= a_end)
}
