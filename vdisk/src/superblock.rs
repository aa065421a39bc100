//! Partition formatting and the inode/block allocator.
//!
//! Layout inside a partition, in order: superblock, inode bitmap (`n`
//! bytes), block bitmap (`3n` bytes), inode table (`n` records), block
//! table (`3n` records). Bitmaps hold one ASCII byte per structure, `'0'`
//! free and `'1'` used.
//!
//! Allocation follows a running pointer (`first_ino`/`first_blo`) instead
//! of scanning the bitmaps, so released structures are never handed out
//! again.

use std::path::Path;

use log::{debug, info};

use crate::codec::{fill_bytes, read_bytes, write_bytes, OnDisk};
use crate::error::{Error, Result};
use crate::layout::{
    now, FileBlock, FolderBlock, FolderEntry, Inode, InodeType, Partition, SuperBlock,
    FIRST_USABLE_ENTRY, FS_TYPE_EXT2, MAGIC, ROOT_INODE, USERS_INODE,
};
use crate::store::Filesystem;

pub const USERS_FILE: &str = "users.txt";
pub const INITIAL_USERS: &str = "1,G,root\n1,U,root,root,123\n";

const FREE: u8 = b'0';
const USED: u8 = b'1';

/// Number of inodes a partition of `size` bytes holds. Every inode brings
/// one bitmap byte, three blocks and their three bitmap bytes.
pub fn capacity(size: i32) -> i32 {
    let per_inode = 4 + Inode::SIZE as i64 + 3 * FileBlock::SIZE as i64;
    let usable = size as i64 - SuperBlock::SIZE as i64;
    if usable <= 0 {
        return 0;
    }
    (usable / per_inode) as i32
}

/// Fresh superblock for a partition at `start` with room for `n` inodes.
fn layout(start: i32, n: i32) -> SuperBlock {
    let bm_inode_start = start + SuperBlock::SIZE as i32;
    let bm_block_start = bm_inode_start + n;
    let inode_start = bm_block_start + 3 * n;
    let block_start = inode_start + n * Inode::SIZE as i32;
    let t = now();
    SuperBlock {
        filesystem_type: FS_TYPE_EXT2,
        inodes_count: n,
        blocks_count: 3 * n,
        free_inodes_count: n,
        free_blocks_count: 3 * n,
        mtime: t,
        umtime: t,
        mnt_count: 1,
        magic: MAGIC,
        inode_size: Inode::SIZE as i32,
        block_size: FileBlock::SIZE as i32,
        first_ino: inode_start,
        first_blo: block_start,
        bm_inode_start,
        bm_block_start,
        inode_start,
        block_start,
    }
}

/// Wipe `part` and lay down an empty filesystem holding the root directory
/// and `/users.txt` with the root group and user.
pub fn format(disk: &Path, part: &Partition) -> Result<Filesystem> {
    let n = capacity(part.size);
    if n < 2 {
        return Err(Error::full(format!(
            "partition '{}' of {} bytes is too small to format",
            part.name(),
            part.size
        )));
    }
    let sb = layout(part.start, n);

    fill_bytes(disk, part.start as u64, part.size as u64, 0)?;
    fill_bytes(disk, sb.bm_inode_start as u64, n as u64, FREE)?;
    fill_bytes(disk, sb.bm_block_start as u64, 3 * n as u64, FREE)?;

    let mut fs = Filesystem::new(disk, part.start as u64, sb);
    fs.persist_superblock()?;

    let root = fs.allocate_inode()?;
    let root_block = fs.allocate_block()?;
    let users = fs.allocate_inode()?;
    let users_block = fs.allocate_block()?;
    debug_assert_eq!((root, users), (ROOT_INODE, USERS_INODE));

    let mut folder = FolderBlock::new(root, root);
    folder.entries[FIRST_USABLE_ENTRY] = FolderEntry::new(USERS_FILE, users)?;
    fs.write_folder(root_block, &folder)?;

    let mut root_inode = Inode::new(InodeType::Folder, *b"664");
    root_inode.block[0] = root_block;
    root_inode.size = FileBlock::SIZE as i32;
    fs.write_inode(root, &root_inode)?;

    fs.write_file_block(users_block, &FileBlock::from_slice(INITIAL_USERS.as_bytes()))?;
    let mut users_inode = Inode::new(InodeType::File, *b"664");
    users_inode.block[0] = users_block;
    users_inode.size = INITIAL_USERS.len() as i32;
    fs.write_inode(users, &users_inode)?;

    info!(
        "formatted '{}' at {}: {} inodes, {} blocks",
        part.name(),
        part.start,
        n,
        3 * n
    );
    Ok(fs)
}

impl Filesystem {
    pub(crate) fn allocate_inode(&mut self) -> Result<i32> {
        let sb = &self.sb;
        let idx = (sb.first_ino - sb.inode_start) / sb.inode_size;
        if sb.free_inodes_count <= 0 || idx >= sb.inodes_count {
            return Err(Error::full("no free inodes"));
        }
        write_bytes(&self.disk, (sb.bm_inode_start + idx) as u64, &[USED])?;
        self.sb.free_inodes_count -= 1;
        self.sb.first_ino += self.sb.inode_size;
        self.persist_superblock()?;
        debug!("allocated inode {} ({} left)", idx, self.sb.free_inodes_count);
        Ok(idx)
    }

    pub(crate) fn allocate_block(&mut self) -> Result<i32> {
        let sb = &self.sb;
        let idx = (sb.first_blo - sb.block_start) / sb.block_size;
        if sb.free_blocks_count <= 0 || idx >= sb.blocks_count {
            return Err(Error::full("no free blocks"));
        }
        write_bytes(&self.disk, (sb.bm_block_start + idx) as u64, &[USED])?;
        self.sb.free_blocks_count -= 1;
        self.sb.first_blo += self.sb.block_size;
        self.persist_superblock()?;
        debug!("allocated block {} ({} left)", idx, self.sb.free_blocks_count);
        Ok(idx)
    }

    pub fn inode_bitmap(&self) -> Result<Vec<u8>> {
        read_bytes(
            &self.disk,
            self.sb.bm_inode_start as u64,
            self.sb.inodes_count as usize,
        )
    }

    pub fn block_bitmap(&self) -> Result<Vec<u8>> {
        read_bytes(
            &self.disk,
            self.sb.bm_block_start as u64,
            self.sb.blocks_count as usize,
        )
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::codec::deserialize;
    use crate::disk::create_disk;
    use crate::layout::{Fit, PartitionType};
    use crate::partition::{create_partition, find_by_name, Located};

    /// Scratch disk with one formatted primary partition of `size` bytes.
    pub(crate) fn formatted(size: i32) -> (tempfile::TempDir, Filesystem) {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.mia");
        create_disk(&disk, size + 4096, Fit::First).unwrap();
        create_partition(&disk, size, PartitionType::Primary, Fit::First, "p").unwrap();
        let part = match find_by_name(&disk, "p").unwrap() {
            Located::Slot(_, p) => p,
            other => panic!("unexpected {:?}", other),
        };
        let fs = format(&disk, &part).unwrap();
        (dir, fs)
    }

    #[test]
    fn capacity_of_one_mebibyte() {
        assert_eq!(capacity(1024 * 1024), 3691);
        assert_eq!(capacity(60), 0);
    }

    #[test]
    fn format_writes_root_and_users() {
        let (_dir, fs) = formatted(1024 * 1024);
        let sb = *fs.superblock();
        assert_eq!(sb.magic, 0xEF53);
        assert_eq!(sb.filesystem_type, 2);
        assert_eq!(sb.inodes_count, 3691);
        assert_eq!(sb.free_inodes_count, 3691 - 2);
        assert_eq!(sb.free_blocks_count, 3 * 3691 - 2);
        assert_eq!(sb.first_ino, sb.inode_start + 2 * 88);
        assert_eq!(sb.first_blo, sb.block_start + 2 * 64);

        let on_disk: SuperBlock = deserialize(fs.disk(), fs.start).unwrap();
        assert_eq!(on_disk, sb);

        assert_eq!(fs.read_file("/users.txt").unwrap(), INITIAL_USERS);
        assert_eq!(fs.read_inode(USERS_INODE).unwrap().size, 27);
    }

    #[test]
    fn regions_follow_each_other() {
        let (_dir, fs) = formatted(64 * 1024);
        let sb = fs.superblock();
        let n = sb.inodes_count;
        assert_eq!(sb.bm_inode_start as u64, fs.start + 68);
        assert_eq!(sb.bm_block_start, sb.bm_inode_start + n);
        assert_eq!(sb.inode_start, sb.bm_block_start + 3 * n);
        assert_eq!(sb.block_start, sb.inode_start + 88 * n);
        assert!(sb.block_start + 3 * n * 64 <= fs.start as i32 + 64 * 1024);
    }

    #[test]
    fn bitmaps_mark_reserved_structures() {
        let (_dir, fs) = formatted(64 * 1024);
        let inodes = fs.inode_bitmap().unwrap();
        assert_eq!(&inodes[..3], b"110");
        assert!(inodes[2..].iter().all(|&b| b == FREE));
        let blocks = fs.block_bitmap().unwrap();
        assert_eq!(&blocks[..3], b"110");
    }

    #[test]
    fn allocator_runs_out() {
        let (_dir, mut fs) = formatted(4 * 1024);
        let n = fs.superblock().inodes_count;
        for expected in 2..n {
            assert_eq!(fs.allocate_inode().unwrap(), expected);
        }
        assert_eq!(fs.superblock().free_inodes_count, 0);
        assert!(matches!(fs.allocate_inode(), Err(Error::CapacityExhausted(_))));
    }

    #[test]
    fn tiny_partition_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let disk = dir.path().join("disk.mia");
        create_disk(&disk, 4096, Fit::First).unwrap();
        create_partition(&disk, 400, PartitionType::Primary, Fit::First, "p").unwrap();
        let Located::Slot(_, part) = find_by_name(&disk, "p").unwrap() else {
            panic!("expected a slot");
        };
        assert!(matches!(format(&disk, &part), Err(Error::CapacityExhausted(_))));
    }
}
