//! Shared helpers for the integration tests

#![allow(dead_code)]

use std::path::PathBuf;

use tempfile::TempDir;
use vdisk::{create_disk, Fit};

pub const KIB: i32 = 1024;
pub const MIB: i32 = 1024 * 1024;

/// Fresh empty image inside its own temp directory. Keep the `TempDir`
/// alive for as long as the image is used.
pub fn scratch_disk(size: i32) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("Disco1.mia");
    create_disk(&path, size, Fit::First).expect("create disk");
    (dir, path)
}
