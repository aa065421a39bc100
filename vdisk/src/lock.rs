//! Per-image exclusive lock.
//!
//! Every command takes the lock for the image it touches and holds it for
//! its whole duration. Inside the process a registry of held paths
//! serializes threads; across processes an advisory `flock` on the image
//! does the same. Locks are not re-entrant: acquiring the same image twice
//! from one thread deadlocks.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock};

use log::trace;

use crate::error::Result;

struct Registry {
    held: Mutex<HashSet<PathBuf>>,
    released: Condvar,
}

fn registry() -> &'static Registry {
    static REGISTRY: OnceLock<Registry> = OnceLock::new();
    REGISTRY.get_or_init(|| Registry {
        held: Mutex::new(HashSet::new()),
        released: Condvar::new(),
    })
}

fn held() -> MutexGuard<'static, HashSet<PathBuf>> {
    registry()
        .held
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Canonical form of `path`. A missing image is keyed by its canonical
/// parent directory, so it matches the key taken once the file exists.
fn key(path: &Path) -> PathBuf {
    if let Ok(full) = path.canonicalize() {
        return full;
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path.to_path_buf(),
    }
}

/// Held lock on one disk image. Released on drop.
pub struct DiskLock {
    path: PathBuf,
    file: Option<File>,
}

impl DiskLock {
    /// Block until no other holder has `path`, then take it.
    pub fn acquire(path: &Path) -> Result<DiskLock> {
        let path = key(path);

        let mut set = held();
        while set.contains(&path) {
            set = registry()
                .released
                .wait(set)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
        set.insert(path.clone());
        drop(set);

        // From here on the guard owns the registry entry, so an early
        // return still releases it.
        let mut lock = DiskLock { path, file: None };

        // The image may not exist yet (create_disk); then only the
        // in-process lock applies.
        if lock.path.exists() {
            let file = OpenOptions::new().read(true).write(true).open(&lock.path)?;
            // SAFETY: the descriptor is owned by `file` and stays open for
            // the lifetime of the guard.
            let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX) };
            if rc != 0 {
                return Err(std::io::Error::last_os_error().into());
            }
            lock.file = Some(file);
        }

        trace!("locked {}", lock.path.display());
        Ok(lock)
    }
}

impl Drop for DiskLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            // SAFETY: see acquire.
            unsafe {
                libc::flock(file.as_raw_fd(), libc::LOCK_UN);
            }
        }
        held().remove(&self.path);
        registry().released.notify_all();
        trace!("unlocked {}", self.path.display());
    }
}
