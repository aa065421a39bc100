//! vdisk_info: read-only inspection of a disk image.
//!
//! Builds a text report of:
//!   - the MBR and its partition slots
//!   - the EBR chain of the extended partition
//!   - for every formatted primary partition, its superblock and root
//!     directory
//!
//! Nothing here writes to the image.

use std::fmt::Write;
use std::path::Path;

use crate::disk::read_mbr;
use crate::error::{Error, Result};
use crate::layout::{InodeType, Partition, PartitionType, SuperBlock};
use crate::partition::logical_partitions;
use crate::store::Filesystem;

/// Human-friendly summary of the image at `path`.
pub fn describe_disk(path: &Path) -> Result<String> {
    let mbr = read_mbr(path)?;
    let mut out = String::new();

    // ---------------------------------------------------------
    // MBR
    // ---------------------------------------------------------
    let _ = writeln!(out, "====== MBR ({}) ======", path.display());
    let _ = writeln!(out, "Size:            {} bytes", mbr.size);
    let _ = writeln!(out, "Created:         {}", mbr.created);
    let _ = writeln!(out, "Signature:       {}", mbr.signature);
    let _ = writeln!(out, "Fit:             {}", mbr.fit);

    let _ = writeln!(out, "\n====== PARTITIONS ======");
    for (i, p) in mbr.partitions.iter().enumerate() {
        if p.is_free() {
            let _ = writeln!(out, "[{}] free", i);
        } else {
            print_partition(&mut out, i, p);
        }
    }

    // ---------------------------------------------------------
    // EBR chain
    // ---------------------------------------------------------
    if mbr.extended().is_some() {
        let _ = writeln!(out, "\n====== LOGICAL PARTITIONS ======");
        for ebr in logical_partitions(path)? {
            let _ = writeln!(
                out,
                "- {:<16} @ {:>9}  size {:>9}  next {}",
                ebr.name(),
                ebr.start,
                ebr.size,
                ebr.next
            );
        }
    }

    // ---------------------------------------------------------
    // Filesystems
    // ---------------------------------------------------------
    for p in mbr
        .partitions()
        .filter(|p| p.kind == Some(PartitionType::Primary))
    {
        // Unformatted partitions are simply skipped.
        match Filesystem::open(path, p) {
            Ok(fs) => describe_filesystem(&mut out, p, &fs)?,
            Err(Error::InvalidState(_)) => {}
            Err(e) => return Err(e),
        }
    }

    Ok(out)
}

fn print_partition(out: &mut String, slot: usize, p: &Partition) {
    let kind = match p.kind {
        Some(PartitionType::Primary) => "primary",
        Some(PartitionType::Extended) => "extended",
        Some(PartitionType::Logical) => "logical",
        None => "?",
    };
    let id = p.id();
    let _ = writeln!(
        out,
        "[{}] {:<16} {:<8} @ {:>9}  size {:>9}  fit {}  #{}  {:?}{}",
        slot,
        p.name(),
        kind,
        p.start,
        p.size,
        p.fit.map_or_else(|| "-".to_string(), |f| f.to_string()),
        p.correlative,
        p.status,
        if id.is_empty() { String::new() } else { format!(" id {}", id) }
    );
}

fn describe_filesystem(out: &mut String, p: &Partition, fs: &Filesystem) -> Result<()> {
    let sb: &SuperBlock = fs.superblock();
    let _ = writeln!(out, "\n====== SUPERBLOCK '{}' ======", p.name());
    let _ = writeln!(out, "Magic:           {:#X}", sb.magic);
    let _ = writeln!(out, "Type:            {}", sb.filesystem_type);
    let _ = writeln!(
        out,
        "Inodes:          {} ({} free)",
        sb.inodes_count, sb.free_inodes_count
    );
    let _ = writeln!(
        out,
        "Blocks:          {} ({} free)",
        sb.blocks_count, sb.free_blocks_count
    );
    let _ = writeln!(out, "Mounts:          {}", sb.mnt_count);
    let _ = writeln!(out, "Inode bitmap @   {}", sb.bm_inode_start);
    let _ = writeln!(out, "Block bitmap @   {}", sb.bm_block_start);
    let _ = writeln!(out, "Inode table @    {}", sb.inode_start);
    let _ = writeln!(out, "Block table @    {}", sb.block_start);

    let used = fs.inode_bitmap()?.iter().filter(|&&b| b == b'1').count();
    let _ = writeln!(out, "Inodes in use:   {}", used);

    let _ = writeln!(out, "\n====== ROOT DIRECTORY ======");
    for e in fs.list_directory("/")? {
        let kind = match e.kind {
            InodeType::Folder => "dir",
            InodeType::File => "file",
        };
        let _ = writeln!(out, "- inode {} : {} ({})", e.inode, e.name, kind);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disk::create_disk;
    use crate::layout::Fit;
    use crate::mount::MountTable;
    use crate::partition::{create_partition, find_by_id};
    use crate::superblock::format;

    #[test]
    fn report_covers_every_section() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.mia");
        create_disk(&disk, 256 * 1024, Fit::First).unwrap();
        create_partition(&disk, 64 * 1024, PartitionType::Primary, Fit::Best, "Part1").unwrap();
        create_partition(&disk, 16 * 1024, PartitionType::Extended, Fit::First, "ext").unwrap();
        create_partition(&disk, 1024, PartitionType::Logical, Fit::First, "log1").unwrap();

        let mut table = MountTable::new("27");
        let id = table.mount(&disk, "Part1").unwrap();
        let (_, part) = find_by_id(&disk, &id).unwrap();
        format(&disk, &part).unwrap();

        let report = describe_disk(&disk).unwrap();
        assert!(report.contains("Part1"));
        assert!(report.contains("id 271A"));
        assert!(report.contains("log1"));
        assert!(report.contains("Magic:           0xEF53"));
        assert!(report.contains("- inode 1 : users.txt (file)"));
        assert!(report.contains("[3] free"));
    }

    #[test]
    fn damaged_superblock_fails_the_report() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.mia");
        create_disk(&disk, 256 * 1024, Fit::First).unwrap();
        create_partition(&disk, 64 * 1024, PartitionType::Primary, Fit::First, "a").unwrap();
        create_partition(&disk, 64 * 1024, PartitionType::Primary, Fit::First, "b").unwrap();

        let mut table = MountTable::new("27");
        let id = table.mount(&disk, "a").unwrap();
        let (_, part) = find_by_id(&disk, &id).unwrap();
        let fs = format(&disk, &part).unwrap();

        // "b" is unformatted and skipped
        assert!(describe_disk(&disk).is_ok());

        let mut sb = *fs.superblock();
        sb.inode_size = 0;
        crate::codec::serialize(&disk, part.start as u64, &sb).unwrap();
        assert!(matches!(describe_disk(&disk), Err(Error::Corrupt(_))));
    }
}
