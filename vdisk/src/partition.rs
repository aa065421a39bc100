//! Partition table manager: primary and extended slots in the MBR, logical
//! partitions as a chain of EBRs inside the extended partition.

use std::path::Path;

use log::{debug, info};

use crate::codec::{deserialize, name_to_bytes, serialize, OnDisk};
use crate::disk::{read_mbr, write_mbr};
use crate::error::{Error, Result};
use crate::lock::DiskLock;
use crate::layout::{Ebr, Fit, Mbr, Partition, PartitionStatus, PartitionType, NONE};

/// Where a partition name resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Located {
    /// MBR slot index and its descriptor.
    Slot(usize, Partition),
    Logical(Ebr),
}

/// Index of the first free MBR slot and the byte offset a new partition in
/// it would start at.
pub fn first_free_slot(mbr: &Mbr) -> Option<(usize, i64)> {
    let slot = mbr.partitions.iter().position(Partition::is_free)?;
    let start = mbr
        .partitions()
        .map(Partition::end)
        .max()
        .unwrap_or(0)
        .max(Mbr::SIZE as i64);
    Some((slot, start))
}

pub fn create_partition(
    disk: &Path,
    size: i32,
    kind: PartitionType,
    fit: Fit,
    name: &str,
) -> Result<()> {
    if size <= 0 {
        return Err(Error::invalid(format!("partition size must be positive, got {}", size)));
    }
    let raw_name = name_to_bytes(name)?;
    if name.trim().is_empty() {
        return Err(Error::invalid("partition name is empty"));
    }

    let _lock = DiskLock::acquire(disk)?;
    let mut mbr = read_mbr(disk)?;
    if find_in(disk, &mbr, name)?.is_some() {
        return Err(Error::Duplicate(format!("partition '{}'", name)));
    }

    match kind {
        PartitionType::Primary | PartitionType::Extended => {
            create_slot(disk, &mut mbr, size, kind, fit, raw_name)
        }
        PartitionType::Logical => create_logical(disk, &mbr, size, fit, raw_name),
    }
}

fn create_slot(
    disk: &Path,
    mbr: &mut Mbr,
    size: i32,
    kind: PartitionType,
    fit: Fit,
    name: [u8; 16],
) -> Result<()> {
    if kind == PartitionType::Extended && mbr.extended().is_some() {
        return Err(Error::Duplicate("disk already has an extended partition".into()));
    }

    let (slot, start) = first_free_slot(mbr)
        .ok_or_else(|| Error::full("all four partition slots are in use"))?;
    if start + size as i64 > mbr.size as i64 {
        return Err(Error::full(format!(
            "{} bytes at offset {} exceed disk size {}",
            size, start, mbr.size
        )));
    }

    let correlative = mbr
        .partitions()
        .map(|p| p.correlative)
        .max()
        .unwrap_or(0)
        .max(0)
        + 1;

    let part = Partition {
        status: PartitionStatus::Occupied,
        kind: Some(kind),
        fit: Some(fit),
        start: start as i32,
        size,
        name,
        correlative,
        id: [0; 4],
    };
    mbr.partitions[slot] = part;
    write_mbr(disk, mbr)?;

    if kind == PartitionType::Extended {
        serialize(disk, start as u64, &Ebr::empty(start as i32))?;
    }

    info!(
        "created {:?} partition '{}' at {} ({} bytes, slot {}, correlative {})",
        kind,
        part.name(),
        start,
        size,
        slot,
        correlative
    );
    Ok(())
}

fn create_logical(disk: &Path, mbr: &Mbr, size: i32, fit: Fit, name: [u8; 16]) -> Result<()> {
    let ext = *mbr
        .extended()
        .ok_or_else(|| Error::not_found("extended partition for a logical partition"))?;

    let mut pos = ext.start;
    let mut steps = 0usize;
    loop {
        let current: Ebr = deserialize(disk, pos as u64)?;

        if current.is_vacant() {
            let ebr = Ebr {
                mount: PartitionStatus::Occupied,
                fit: Some(fit),
                start: pos,
                size,
                next: current.next,
                name,
            };
            check_fits(&ext, &ebr)?;
            serialize(disk, pos as u64, &ebr)?;
            info!("created logical partition '{}' at {}", ebr.name(), pos);
            return Ok(());
        }

        if current.next == NONE {
            let ebr = Ebr {
                mount: PartitionStatus::Occupied,
                fit: Some(fit),
                start: current.end() as i32,
                size,
                next: NONE,
                name,
            };
            check_fits(&ext, &ebr)?;
            serialize(disk, ebr.start as u64, &ebr)?;

            let mut prev = current;
            prev.next = ebr.start;
            serialize(disk, prev.start as u64, &prev)?;
            info!("created logical partition '{}' at {}", ebr.name(), ebr.start);
            return Ok(());
        }

        pos = current.next;
        steps += 1;
        if steps > chain_limit(&ext) {
            return Err(Error::Corrupt(format!("EBR chain of '{}' loops", ext.name())));
        }
    }
}

fn check_fits(ext: &Partition, ebr: &Ebr) -> Result<()> {
    if ebr.end() > ext.end() {
        return Err(Error::full(format!(
            "logical partition of {} bytes at {} overruns extended partition '{}'",
            ebr.size,
            ebr.start,
            ext.name()
        )));
    }
    Ok(())
}

fn chain_limit(ext: &Partition) -> usize {
    ext.size.max(0) as usize / Ebr::SIZE + 1
}

/// Every EBR of the chain, including a vacant head.
fn ebr_chain(disk: &Path, ext: &Partition) -> Result<Vec<Ebr>> {
    let mut out = Vec::new();
    let mut pos = ext.start;
    while pos != NONE {
        let ebr: Ebr = deserialize(disk, pos as u64)?;
        debug!("ebr at {}: '{}' next {}", pos, ebr.name(), ebr.next);
        pos = ebr.next;
        out.push(ebr);
        if out.len() > chain_limit(ext) {
            return Err(Error::Corrupt(format!("EBR chain of '{}' loops", ext.name())));
        }
    }
    Ok(out)
}

/// Live logical partitions in chain order. Empty when the disk has no
/// extended partition.
pub fn logical_partitions(disk: &Path) -> Result<Vec<Ebr>> {
    let mbr = read_mbr(disk)?;
    logical_in(disk, &mbr)
}

fn logical_in(disk: &Path, mbr: &Mbr) -> Result<Vec<Ebr>> {
    match mbr.extended() {
        Some(ext) => Ok(ebr_chain(disk, ext)?
            .into_iter()
            .filter(|e| !e.is_vacant())
            .collect()),
        None => Ok(Vec::new()),
    }
}

fn find_in(disk: &Path, mbr: &Mbr, name: &str) -> Result<Option<Located>> {
    let wanted = name.trim();
    for (i, p) in mbr.partitions.iter().enumerate() {
        if !p.is_free() && p.name().eq_ignore_ascii_case(wanted) {
            return Ok(Some(Located::Slot(i, *p)));
        }
    }
    Ok(logical_in(disk, mbr)?
        .into_iter()
        .find(|e| e.name().eq_ignore_ascii_case(wanted))
        .map(Located::Logical))
}

/// Look a partition up by name, case-insensitively, in the MBR and then in
/// the logical chain.
pub fn find_by_name(disk: &Path, name: &str) -> Result<Located> {
    let mbr = read_mbr(disk)?;
    find_in(disk, &mbr, name)?
        .ok_or_else(|| Error::not_found(format!("partition '{}' on {}", name, disk.display())))
}

/// The mounted MBR slot carrying `id`.
pub fn find_by_id(disk: &Path, id: &str) -> Result<(usize, Partition)> {
    let mbr = read_mbr(disk)?;
    mbr.partitions
        .iter()
        .enumerate()
        .find(|(_, p)| p.status == PartitionStatus::Mounted && p.id() == id)
        .map(|(i, p)| (i, *p))
        .ok_or_else(|| Error::not_found(format!("mounted partition '{}' on {}", id, disk.display())))
}
