//! Disk image lifecycle: create a blank image with an empty MBR, or delete it.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use log::info;
use rand::Rng;

use crate::codec::{deserialize, fill_bytes, serialize, OnDisk};
use crate::error::{Error, Result};
use crate::layout::{Fit, Mbr};
use crate::lock::DiskLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Bytes,
    Kilo,
    Mega,
}

impl Unit {
    pub fn factor(self) -> i64 {
        match self {
            Unit::Bytes => 1,
            Unit::Kilo => 1024,
            Unit::Mega => 1024 * 1024,
        }
    }
}

impl FromStr for Unit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Unit> {
        match s.to_ascii_uppercase().as_str() {
            "B" => Ok(Unit::Bytes),
            "K" => Ok(Unit::Kilo),
            "M" => Ok(Unit::Mega),
            other => Err(Error::invalid(format!("unknown unit '{}'", other))),
        }
    }
}

/// Size in bytes. The result must be positive and fit the 32-bit size
/// fields of the MBR.
pub fn to_bytes(size: i64, unit: Unit) -> Result<i32> {
    if size <= 0 {
        return Err(Error::invalid(format!("size must be positive, got {}", size)));
    }
    size.checked_mul(unit.factor())
        .and_then(|b| i32::try_from(b).ok())
        .ok_or_else(|| Error::invalid(format!("size {} {:?} is too large", size, unit)))
}

pub fn read_mbr(path: &Path) -> Result<Mbr> {
    deserialize(path, 0)
}

pub fn write_mbr(path: &Path, mbr: &Mbr) -> Result<()> {
    serialize(path, 0, mbr)
}

/// Create a zero-filled image of `size` bytes with a fresh MBR at byte 0.
/// An existing file at `path` is overwritten.
pub fn create_disk(path: &Path, size: i32, fit: Fit) -> Result<Mbr> {
    if size < Mbr::SIZE as i32 {
        return Err(Error::invalid(format!(
            "disk of {} bytes cannot hold the MBR",
            size
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    let _lock = DiskLock::acquire(path)?;

    if path.exists() {
        fs::OpenOptions::new().write(true).truncate(true).open(path)?;
    }
    fill_bytes(path, 0, size as u64, 0)?;

    let signature = rand::thread_rng().gen_range(0..i32::MAX);
    let mbr = Mbr::new(size, signature, fit);
    write_mbr(path, &mbr)?;

    info!(
        "created disk {} ({} bytes, fit {}, signature {})",
        path.display(),
        size,
        fit,
        signature
    );
    Ok(mbr)
}

pub fn remove_disk(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::not_found(format!("disk {}", path.display())));
    }
    let _lock = DiskLock::acquire(path)?;
    fs::remove_file(path)?;
    info!("removed disk {}", path.display());
    Ok(())
}
