//! Capability-table dispatch for metadata format handlers, re-exporting
//! the domain crate's codec, loader, geometry, volume, monitor, update,
//! and spare-picker APIs.
//!
//! [`MetadataHandler`] mirrors `struct superswitch super_imsm` from the
//! original source: a trait describing what a metadata family must
//! support, with [`Imsm`] as its sole implementor. CLI dispatch, sysfs
//! scanning, and enclosure printing remain out of scope; only the trait
//! boundary those drivers would call through is modeled here.
//!
//! A handful of `superswitch` entries have no standalone method because
//! they fold into ones that do:
//! - `free_super` — memory release, handled by `Mpb`'s `Drop`; nothing to
//!   call.
//! - `write_init_super` — in the original, "build a fresh super, then
//!   write it"; here that's just [`MetadataHandler::init_super`] followed
//!   by [`MetadataHandler::store_super`], so no separate method exists.
//! - `open_new` — container creation; covered by `init_super`.
//! - `update_super` — in the original, a string-tagged dispatch over
//!   update kinds. [`UpdateRecord`] already models that dispatch as a
//!   typed enum, applied through `process_update`/`prepare_update`, so a
//!   separate `update_super` would just re-wrap those.

pub use imsm_core::*;

use imsm_core::geometry::{self, VolumeGeometry};
use imsm_core::info::{self, VolumeInfo};
use imsm_core::loader::{self, LoadedSuper, LoaderError, Member};
use imsm_core::monitor::{DiskObservation, Monitor};
use imsm_core::mpb::{Mpb, MpbError};
use imsm_core::spare::{self, DiskSize};
use imsm_core::update::{self, UpdateError, UpdateRecord};
use imsm_core::volume::{self, NewVolumeSpec, VolumeError};
use imsm_io::anchor::{self, AnchorIoError};
use imsm_io::device::BlockDevice;

/// The capability surface a metadata format exposes to a manager/monitor
/// driver. `Imsm` is the engine's only implementor; no other metadata
/// family is modeled.
pub trait MetadataHandler {
    /// `match_metadata_desc`: does this handler own a metadata string like
    /// `"imsm"` or `"imsm/0"` (a container plus subarray index)?
    fn match_metadata_desc(&self, desc: &str) -> bool;

    /// Raw codec entry point: decode bytes already read off an anchor into
    /// an `Mpb`, without the loader's multi-member quorum logic.
    fn decode(&self, bytes: &[u8]) -> Result<Mpb, MpbError>;

    /// `load_super`: read every member's MPB and pick the authoritative,
    /// highest-generation survivor.
    fn load_super<D: BlockDevice>(&self, members: &mut [Member<'_, D>]) -> Result<LoadedSuper, LoaderError>;

    /// `init_super`/`open_new`: build a brand-new, empty container.
    fn init_super(&self, num_disks: u8, version: &str) -> Mpb;

    /// `add_to_super`: append a validated new volume's device record.
    fn add_to_super(&self, mpb: &mut Mpb, spec: &NewVolumeSpec) -> Result<u8, VolumeError>;

    /// `store_super`: write a container's current metadata to one member
    /// device's anchor.
    fn store_super<D: BlockDevice>(&self, mpb: &Mpb, device: &mut D) -> Result<(), AnchorIoError>;

    /// `compare_super`: are two loaded supers the same family and state?
    fn compare_super(&self, a: &Mpb, b: &Mpb) -> bool;

    /// `avail_size`: usable sectors on a raw disk of `total_blocks`
    /// sectors, after reserving the metadata region.
    fn avail_size(&self, total_blocks: u64) -> u64;

    /// `validate_geometry`: search for a volume-creation offset shared by
    /// enough member disks.
    fn validate_geometry(
        &self,
        mpb: &Mpb,
        disks: &[(u8, u64)],
        raiddisks: usize,
        size: u64,
    ) -> Result<Option<VolumeGeometry>, MpbError>;

    /// `container_content`: every subarray's [`VolumeInfo`], in device
    /// order.
    fn container_content(&self, mpb: &Mpb) -> Result<Vec<VolumeInfo>, MpbError>;

    /// `getinfo_super`: one subarray's [`VolumeInfo`].
    fn getinfo_super(&self, mpb: &Mpb, dev: u8) -> Result<VolumeInfo, MpbError>;

    /// `examine_super`: the one-line `mdadm --examine --brief` summary.
    fn examine_super(&self, mpb: &Mpb) -> String;

    /// `set_disk`: apply a poll cycle's per-slot observations to one
    /// array's map.
    fn set_disk(
        &self,
        monitor: &mut Monitor,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        observations: &[DiskObservation],
    ) -> Result<(), MpbError>;

    /// `set_array_state`: refresh `map_state` from the live failure count.
    fn set_array_state(
        &self,
        monitor: &mut Monitor,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        consistent: bool,
    ) -> Result<(), MpbError>;

    /// `sync_metadata`: flush pending metadata changes to every listed
    /// member device.
    fn sync_metadata<D: BlockDevice>(&self, monitor: &mut Monitor, mpb: &mut Mpb, devices: &mut [&mut D]);

    /// `activate_spare`: propose replacements for a degraded array's empty
    /// slots.
    fn activate_spare(
        &self,
        mpb: &Mpb,
        dev: u8,
        slots: &[u8],
        disk_sizes: &[DiskSize],
    ) -> Result<Option<UpdateRecord>, MpbError>;

    /// `prepare_update`: pre-allocate whatever the apply step will need,
    /// off the monitor's critical path.
    fn prepare_update(&self, mpb: &mut Mpb, record: &UpdateRecord);

    /// `process_update`: apply one proposed update record.
    fn process_update(&self, mpb: &mut Mpb, record: &UpdateRecord) -> Result<(), UpdateError>;
}

/// The only metadata family this engine implements.
#[derive(Debug, Default, Clone, Copy)]
pub struct Imsm;

impl MetadataHandler for Imsm {
    fn match_metadata_desc(&self, desc: &str) -> bool {
        desc == "imsm" || desc.starts_with("imsm/")
    }

    fn decode(&self, bytes: &[u8]) -> Result<Mpb, MpbError> {
        Mpb::decode(bytes)
    }

    fn load_super<D: BlockDevice>(&self, members: &mut [Member<'_, D>]) -> Result<LoadedSuper, LoaderError> {
        loader::load_super(members)
    }

    fn init_super(&self, num_disks: u8, version: &str) -> Mpb {
        Mpb::new_container(num_disks, version)
    }

    fn add_to_super(&self, mpb: &mut Mpb, spec: &NewVolumeSpec) -> Result<u8, VolumeError> {
        volume::add_volume(mpb, spec)
    }

    fn store_super<D: BlockDevice>(&self, mpb: &Mpb, device: &mut D) -> Result<(), AnchorIoError> {
        anchor::write_mpb(device, mpb.as_bytes())
    }

    fn compare_super(&self, a: &Mpb, b: &Mpb) -> bool {
        info::compare_super(a, b)
    }

    fn avail_size(&self, total_blocks: u64) -> u64 {
        geometry::avail_size(total_blocks)
    }

    fn validate_geometry(
        &self,
        mpb: &Mpb,
        disks: &[(u8, u64)],
        raiddisks: usize,
        size: u64,
    ) -> Result<Option<VolumeGeometry>, MpbError> {
        geometry::validate_volume_geometry(mpb, disks, raiddisks, size)
    }

    fn container_content(&self, mpb: &Mpb) -> Result<Vec<VolumeInfo>, MpbError> {
        (0..mpb.num_raid_devs()).map(|dev| info::getinfo_super(mpb, dev)).collect()
    }

    fn getinfo_super(&self, mpb: &Mpb, dev: u8) -> Result<VolumeInfo, MpbError> {
        info::getinfo_super(mpb, dev)
    }

    fn examine_super(&self, mpb: &Mpb) -> String {
        info::brief_examine(mpb)
    }

    fn set_disk(
        &self,
        monitor: &mut Monitor,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        observations: &[DiskObservation],
    ) -> Result<(), MpbError> {
        monitor.set_disk(mpb, dev, map_index, observations)
    }

    fn set_array_state(
        &self,
        monitor: &mut Monitor,
        mpb: &mut Mpb,
        dev: u8,
        map_index: u8,
        consistent: bool,
    ) -> Result<(), MpbError> {
        monitor.set_array_state(mpb, dev, map_index, consistent)
    }

    fn sync_metadata<D: BlockDevice>(&self, monitor: &mut Monitor, mpb: &mut Mpb, devices: &mut [&mut D]) {
        monitor.sync_metadata(mpb, devices)
    }

    fn activate_spare(
        &self,
        mpb: &Mpb,
        dev: u8,
        slots: &[u8],
        disk_sizes: &[DiskSize],
    ) -> Result<Option<UpdateRecord>, MpbError> {
        spare::pick_spares(mpb, dev, slots, disk_sizes)
    }

    fn prepare_update(&self, mpb: &mut Mpb, record: &UpdateRecord) {
        update::prepare_update(mpb, record)
    }

    fn process_update(&self, mpb: &mut Mpb, record: &UpdateRecord) -> Result<(), UpdateError> {
        update::process_update(mpb, record)
    }
}
