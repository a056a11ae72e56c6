//! Monitor state machine: the per-cycle disk/array observations that drive
//! `map_state` transitions, and the metadata flush that follows them.

use bitflags::bitflags;

use crate::mpb::{effective_raid_level, DiskStatus, MapState, Mpb, MpbError};
use imsm_io::anchor;
use imsm_io::device::BlockDevice;

bitflags! {
    /// Bits carried by a per-slot observation during a monitor poll.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct ObservedDiskState: u32 {
        const FAULTY = 0x01;
        const INSYNC = 0x02;
    }
}

/// One slot's observed state for the current poll cycle.
#[derive(Clone, Copy, Debug)]
pub struct DiskObservation {
    pub slot: u8,
    pub state: ObservedDiskState,
}

/// Tracks pending metadata writes across a poll loop. One `Monitor` owns
/// the only mutable access to a container's [`Mpb`] for the lifetime of
/// the arrays it watches.
pub struct Monitor {
    pending_updates: u32,
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Monitor {
    pub fn new() -> Self {
        Self { pending_updates: 0 }
    }

    pub fn pending_updates(&self) -> u32 {
        self.pending_updates
    }

    /// `set_disk`: apply this cycle's per-slot observations for one array's
    /// map, promote newly-FAULTY slots to FAILED, recompute `map_state` on
    /// any new failure, and promote DEGRADED back to NORMAL once every slot
    /// reports INSYNC.
    pub fn set_disk(
        &mut self,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        observations: &[DiskObservation],
    ) -> Result<(), MpbError> {
        let mut any_new_failure = false;
        for obs in observations {
            if !obs.state.contains(ObservedDiskState::FAULTY) {
                continue;
            }
            let disk_idx = mpb.map(dev, map_index)?.disk_ord(obs.slot);
            let disk = mpb.disk_mut(disk_idx as u8)?;
            let status = disk.status.get();
            if status & DiskStatus::FAILED.bits() == 0 {
                disk.status.set(status | DiskStatus::FAILED.bits());
                any_new_failure = true;
                self.pending_updates += 1;
                tracing::info!(disk = disk_idx, slot = obs.slot, "disk marked FAILED");
            }
        }

        if any_new_failure && self.recompute_map_state(mpb, dev, map_index)? {
            self.pending_updates += 1;
        }

        let num_members = mpb.map(dev, map_index)?.head.num_members as usize;
        let all_insync = observations.len() == num_members
            && observations
                .iter()
                .all(|o| o.state.contains(ObservedDiskState::INSYNC));
        let current = MapState::from_u8(mpb.map(dev, map_index)?.head.map_state);
        if all_insync && current == Some(MapState::Degraded) {
            mpb.map_mut(dev, map_index)?.head.map_state = MapState::Normal as u8;
            self.pending_updates += 1;
            tracing::info!(dev, "array promoted DEGRADED -> NORMAL");
        }
        Ok(())
    }

    /// `set_array_state`, called only when no resync is active
    /// (`resync_start == ~0`). Refreshes `map_state` from the current
    /// failure count and updates `dirty`.
    pub fn set_array_state(
        &mut self,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        consistent: bool,
    ) -> Result<(), MpbError> {
        if self.recompute_map_state(mpb, dev, map_index)? {
            self.pending_updates += 1;
        }
        let mut vol = mpb.vol_head_mut(dev)?;
        let new_dirty = u8::from(!consistent);
        if vol.dirty != new_dirty {
            vol.dirty = new_dirty;
            self.pending_updates += 1;
        }
        Ok(())
    }

    /// Recomputes `map_state` from the live failure count, per the
    /// degraded/failed table keyed on effective RAID level. Returns whether
    /// the stored state changed.
    fn recompute_map_state(&mut self, mpb: &mut Mpb, dev: u8, map_index: u8) -> Result<bool, MpbError> {
        let (num_members, raid_level, failed_slots) = {
            let map = mpb.map(dev, map_index)?;
            let num_members = map.head.num_members;
            let raid_level = map.head.raid_level;
            let mut failed_slots = Vec::with_capacity(num_members as usize);
            for slot in 0..num_members {
                let disk_idx = map.disk_ord(slot);
                let failed = mpb.disk(disk_idx as u8)?.status.get() & DiskStatus::FAILED.bits() != 0;
                failed_slots.push(failed);
            }
            (num_members, raid_level, failed_slots)
        };
        let failed_count = failed_slots.iter().filter(|&&f| f).count();
        let effective = effective_raid_level(raid_level, num_members);

        // Mirrors `imsm_set_array_state`: NORMAL is the floor at zero
        // failures for every level, checked before the degraded/failed
        // table is ever consulted. The table only decides anything once
        // `failed_count > 0`.
        let new_state = if failed_count == 0 {
            Some(MapState::Normal)
        } else {
            match effective {
                0 => Some(MapState::Failed),
                1 => {
                    if failed_count < num_members as usize {
                        Some(MapState::Degraded)
                    } else {
                        Some(MapState::Failed)
                    }
                }
                5 => {
                    if failed_count == 1 {
                        Some(MapState::Degraded)
                    } else {
                        Some(MapState::Failed)
                    }
                }
                10 => {
                    let any_pair_failed = failed_slots.chunks(2).any(|pair| pair.len() == 2 && pair[0] && pair[1]);
                    if any_pair_failed {
                        Some(MapState::Failed)
                    } else {
                        Some(MapState::Degraded)
                    }
                }
                _ => None,
            }
        };

        let Some(state) = new_state else {
            return Ok(false);
        };
        let mut map = mpb.map_mut(dev, map_index)?;
        if map.head.map_state == state as u8 {
            return Ok(false);
        }
        tracing::info!(dev, old = map.head.map_state, new = state as u8, "map_state transition");
        map.head.map_state = state as u8;
        Ok(true)
    }

    /// Flushes the MPB to every listed disk when updates are pending,
    /// writing in order and logging (not aborting on) a per-disk failure.
    pub fn sync_metadata<D: BlockDevice>(&mut self, mpb: &mut Mpb, devices: &mut [&mut D]) {
        if self.pending_updates == 0 {
            return;
        }
        mpb.finalize_for_write();
        let bytes = mpb.as_bytes().to_vec();
        for (i, dev) in devices.iter_mut().enumerate() {
            if let Err(e) = anchor::write_mpb(*dev, &bytes) {
                tracing::warn!(disk = i, error = %e, "failed to flush MPB to disk");
            }
        }
        self.pending_updates = 0;
    }
}
