//! Mount table and the `mount` operation.
//!
//! A mount id is `prefix + n + letter`: `n` counts mounts per disk path,
//! the letter is handed out once per distinct disk path (A, B, ...). The
//! table lives as long as its owner; there is no unmount.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use log::{info, warn};

use crate::disk::{read_mbr, write_mbr};
use crate::error::{Error, Result};
use crate::layout::{PartitionStatus, PartitionType, MOUNT_ID_LEN};
use crate::lock::DiskLock;
use crate::partition::{find_by_name, Located};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    pub id: String,
    pub disk: PathBuf,
    pub partition: String,
}

#[derive(Debug, Clone)]
pub struct MountTable {
    prefix: String,
    entries: Vec<MountEntry>,
    letters: Vec<PathBuf>,
    counters: HashMap<PathBuf, u32>,
}

fn disk_key(disk: &Path) -> PathBuf {
    disk.canonicalize().unwrap_or_else(|_| disk.to_path_buf())
}

impl MountTable {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Vec::new(),
            letters: Vec::new(),
            counters: HashMap::new(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn entries(&self) -> &[MountEntry] {
        &self.entries
    }

    pub fn resolve(&self, id: &str) -> Result<&MountEntry> {
        self.entries
            .iter()
            .find(|e| e.id.eq_ignore_ascii_case(id))
            .ok_or_else(|| Error::not_found(format!("mount id '{}'", id)))
    }

    /// Id the next mount on `disk` would get, without recording anything.
    fn next_id(&self, key: &Path) -> Result<String> {
        let letter_idx = self
            .letters
            .iter()
            .position(|p| p == key)
            .unwrap_or(self.letters.len());
        if letter_idx >= 26 {
            return Err(Error::full("no mount letters left"));
        }
        let letter = (b'A' + letter_idx as u8) as char;
        let n = self.counters.get(key).copied().unwrap_or(0) + 1;

        let id = format!("{}{}{}", self.prefix, n, letter);
        if id.len() > MOUNT_ID_LEN {
            return Err(Error::full(format!(
                "mount id '{}' does not fit {} bytes",
                id, MOUNT_ID_LEN
            )));
        }
        Ok(id)
    }

    fn record(&mut self, key: PathBuf, entry: MountEntry) {
        if !self.letters.contains(&key) {
            self.letters.push(key.clone());
        }
        *self.counters.entry(key).or_insert(0) += 1;
        self.entries.push(entry);
    }

    /// Mount the primary partition `name` of `disk` and return its id.
    pub fn mount(&mut self, disk: &Path, name: &str) -> Result<String> {
        let _lock = DiskLock::acquire(disk)?;

        let slot = match find_by_name(disk, name)? {
            Located::Slot(i, p) => {
                if p.kind == Some(PartitionType::Extended) {
                    return Err(Error::invalid(format!(
                        "extended partition '{}' cannot be mounted",
                        name
                    )));
                }
                if p.status == PartitionStatus::Mounted {
                    warn!("partition '{}' is already mounted as {}", name, p.id());
                    return Err(Error::InvalidState(format!(
                        "partition '{}' is already mounted",
                        name
                    )));
                }
                i
            }
            Located::Logical(_) => {
                return Err(Error::invalid(format!(
                    "logical partition '{}' cannot be mounted",
                    name
                )))
            }
        };

        let key = disk_key(disk);
        let id = self.next_id(&key)?;

        let mut mbr = read_mbr(disk)?;
        let part = &mut mbr.partitions[slot];
        part.status = PartitionStatus::Mounted;
        part.id = [0; MOUNT_ID_LEN];
        part.id[..id.len()].copy_from_slice(id.as_bytes());
        let partition = part.name();
        write_mbr(disk, &mbr)?;

        self.record(
            key,
            MountEntry {
                id: id.clone(),
                disk: disk.to_path_buf(),
                partition,
            },
        );
        info!("mounted '{}' of {} as {}", name, disk.display(), id);
        Ok(id)
    }
}

impl Default for MountTable {
    fn default() -> Self {
        MountTable::new(crate::config::DEFAULT_PREFIX)
    }
}
