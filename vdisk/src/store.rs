//! Inode and block store of a formatted partition.
//!
//! Paths are `/`-separated and resolved from the root inode by
//! case-insensitive name match on folder entries. Only the 15 direct
//! pointers of an inode are used.

use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::codec::{deserialize, serialize, OnDisk};
use crate::error::{Error, Result};
use crate::layout::{
    FileBlock, FolderBlock, FolderEntry, Inode, InodeType, Partition, SuperBlock, BLOCK_SIZE,
    ENTRY_NAME_LEN, MAGIC, MAX_FILE_SIZE, ROOT_INODE,
};

/// One live entry of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub inode: i32,
    pub kind: InodeType,
}

/// Where a new directory entry goes.
enum Slot {
    /// Free entry `index` in existing folder block `block`.
    Entry { block: i32, index: usize },
    /// All folder blocks are full; chain a new one at direct pointer `pointer`.
    Chain { pointer: usize },
}

/// Handle on the filesystem inside one partition. Holds the superblock in
/// memory and writes it back after every allocation.
#[derive(Debug)]
pub struct Filesystem {
    pub(crate) disk: PathBuf,
    pub(crate) start: u64,
    pub(crate) sb: SuperBlock,
    owner: (i32, i32),
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn check_name(name: &str) -> Result<()> {
    if name.len() > ENTRY_NAME_LEN {
        return Err(Error::invalid(format!(
            "name '{}' longer than {} bytes",
            name, ENTRY_NAME_LEN
        )));
    }
    Ok(())
}

impl Filesystem {
    pub(crate) fn new(disk: &Path, start: u64, sb: SuperBlock) -> Self {
        Self {
            disk: disk.to_path_buf(),
            start,
            sb,
            owner: (1, 1),
        }
    }

    /// Open the filesystem of `part`. Fails if the partition was never
    /// formatted.
    pub fn open(disk: &Path, part: &Partition) -> Result<Self> {
        let start = part.start as u64;
        let sb: SuperBlock = deserialize(disk, start)?;
        if sb.magic != MAGIC {
            return Err(Error::InvalidState(format!(
                "partition '{}' has no filesystem",
                part.name()
            )));
        }
        if sb.inode_size != Inode::SIZE as i32 || sb.block_size != BLOCK_SIZE as i32 {
            return Err(Error::Corrupt(format!(
                "partition '{}' records inode size {} and block size {}",
                part.name(),
                sb.inode_size,
                sb.block_size
            )));
        }
        Ok(Self::new(disk, start, sb))
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.sb
    }

    pub fn disk(&self) -> &Path {
        &self.disk
    }

    /// Owner and group stamped on inodes created from now on.
    pub fn set_owner(&mut self, uid: i32, gid: i32) {
        self.owner = (uid, gid);
    }

    /* ---------------- DISK IO ---------------- */

    fn inode_offset(&self, idx: i32) -> Result<u64> {
        if idx < 0 || idx >= self.sb.inodes_count {
            return Err(Error::Corrupt(format!("inode index {} out of range", idx)));
        }
        Ok(self.sb.inode_start as u64 + idx as u64 * self.sb.inode_size as u64)
    }

    fn block_offset(&self, idx: i32) -> Result<u64> {
        if idx < 0 || idx >= self.sb.blocks_count {
            return Err(Error::Corrupt(format!("block index {} out of range", idx)));
        }
        Ok(self.sb.block_start as u64 + idx as u64 * self.sb.block_size as u64)
    }

    pub(crate) fn persist_superblock(&self) -> Result<()> {
        serialize(&self.disk, self.start, &self.sb)
    }

    pub fn read_inode(&self, idx: i32) -> Result<Inode> {
        deserialize(&self.disk, self.inode_offset(idx)?)
    }

    pub(crate) fn write_inode(&self, idx: i32, inode: &Inode) -> Result<()> {
        serialize(&self.disk, self.inode_offset(idx)?, inode)
    }

    pub fn read_folder(&self, idx: i32) -> Result<FolderBlock> {
        deserialize(&self.disk, self.block_offset(idx)?)
    }

    pub(crate) fn write_folder(&self, idx: i32, block: &FolderBlock) -> Result<()> {
        serialize(&self.disk, self.block_offset(idx)?, block)
    }

    pub fn read_file_block(&self, idx: i32) -> Result<FileBlock> {
        deserialize(&self.disk, self.block_offset(idx)?)
    }

    pub(crate) fn write_file_block(&self, idx: i32, block: &FileBlock) -> Result<()> {
        serialize(&self.disk, self.block_offset(idx)?, block)
    }

    /// Fail up front when the superblock cannot cover `inodes` and `blocks`
    /// more allocations.
    pub(crate) fn ensure_space(&self, inodes: i32, blocks: i32) -> Result<()> {
        if self.sb.free_inodes_count < inodes {
            return Err(Error::full(format!(
                "{} free inodes, {} needed",
                self.sb.free_inodes_count, inodes
            )));
        }
        if self.sb.free_blocks_count < blocks {
            return Err(Error::full(format!(
                "{} free blocks, {} needed",
                self.sb.free_blocks_count, blocks
            )));
        }
        Ok(())
    }

    /* ---------------- LOOKUP ---------------- */

    fn lookup(&self, dir: &Inode, name: &str) -> Result<Option<i32>> {
        for blk in dir.blocks() {
            let folder = self.read_folder(blk)?;
            let hit = folder
                .children()
                .find(|e| e.name().eq_ignore_ascii_case(name))
                .map(|e| e.inode);
            if hit.is_some() {
                return Ok(hit);
            }
        }
        Ok(None)
    }

    fn folder_inode(&self, idx: i32, name: &str) -> Result<Inode> {
        let inode = self.read_inode(idx)?;
        if !inode.is_folder() {
            return Err(Error::invalid(format!("'{}' is not a directory", name)));
        }
        Ok(inode)
    }

    /// Inode index of `path`.
    pub fn resolve(&self, path: &str) -> Result<i32> {
        let mut cur = ROOT_INODE;
        let mut walked = String::new();
        for seg in segments(path) {
            let dir = self.folder_inode(cur, if walked.is_empty() { "/" } else { walked.as_str() })?;
            walked.push('/');
            walked.push_str(seg);
            cur = self
                .lookup(&dir, seg)?
                .ok_or_else(|| Error::not_found(format!("path '{}'", walked)))?;
        }
        Ok(cur)
    }

    /// Walk `dirs` from the root, creating missing directories when
    /// `parents` is set. Returns the inode of the last one.
    fn walk_dirs(&mut self, dirs: &[&str], parents: bool) -> Result<i32> {
        let mut cur = ROOT_INODE;
        for seg in dirs {
            let dir = self.folder_inode(cur, seg)?;
            cur = match self.lookup(&dir, seg)? {
                Some(idx) => {
                    self.folder_inode(idx, seg)?;
                    idx
                }
                None if parents => self.make_dir(cur, seg)?,
                None => return Err(Error::not_found(format!("directory '{}'", seg))),
            };
        }
        Ok(cur)
    }

    /* ---------------- LINKING ---------------- */

    fn free_slot(&self, dir: &Inode) -> Result<Slot> {
        for blk in dir.blocks() {
            if let Some(index) = self.read_folder(blk)?.free_slot() {
                return Ok(Slot::Entry { block: blk, index });
            }
        }
        dir.first_free_pointer()
            .map(|pointer| Slot::Chain { pointer })
            .ok_or_else(|| Error::full("directory has no free entries left"))
    }

    fn link(&mut self, parent: i32, slot: Slot, name: &str, child: i32) -> Result<()> {
        let entry = FolderEntry::new(name, child)?;
        let mut dir = self.read_inode(parent)?;
        match slot {
            Slot::Entry { block, index } => {
                let mut folder = self.read_folder(block)?;
                folder.entries[index] = entry;
                self.write_folder(block, &folder)?;
            }
            Slot::Chain { pointer } => {
                let grandparent = self.read_folder(dir.block[0])?.parent();
                let blk = self.allocate_block()?;
                let mut folder = FolderBlock::new(parent, grandparent);
                folder.entries[crate::layout::FIRST_USABLE_ENTRY] = entry;
                self.write_folder(blk, &folder)?;
                dir.block[pointer] = blk;
                dir.size += BLOCK_SIZE as i32;
                debug!("chained folder block {} into inode {}", blk, parent);
            }
        }
        dir.mtime = crate::layout::now();
        self.write_inode(parent, &dir)
    }

    fn make_dir(&mut self, parent: i32, name: &str) -> Result<i32> {
        check_name(name)?;
        let dir = self.read_inode(parent)?;
        let slot = self.free_slot(&dir)?;
        let extra = matches!(slot, Slot::Chain { .. }) as i32;
        self.ensure_space(1, 1 + extra)?;

        let idx = self.allocate_inode()?;
        let blk = self.allocate_block()?;
        self.write_folder(blk, &FolderBlock::new(idx, parent))?;

        let mut inode = Inode::new(InodeType::Folder, *b"664");
        (inode.uid, inode.gid) = self.owner;
        inode.block[0] = blk;
        inode.size = BLOCK_SIZE as i32;
        self.write_inode(idx, &inode)?;

        self.link(parent, slot, name, idx)?;
        debug!("directory '{}' -> inode {} (parent {})", name, idx, parent);
        Ok(idx)
    }

    /* ---------------- OPERATIONS ---------------- */

    /// Create the directory `path`. Existing intermediate directories are
    /// reused; missing ones are created only with `parents`.
    pub fn create_directory(&mut self, path: &str, parents: bool) -> Result<i32> {
        let segs = segments(path);
        let (leaf, dirs) = segs
            .split_last()
            .ok_or_else(|| Error::invalid("cannot create the root directory"))?;
        check_name(leaf)?;

        let parent = self.walk_dirs(dirs, parents)?;
        let dir = self.read_inode(parent)?;
        if self.lookup(&dir, leaf)?.is_some() {
            return Err(Error::Duplicate(format!("'{}'", path)));
        }
        let idx = self.make_dir(parent, leaf)?;
        info!("created directory {} (inode {})", path, idx);
        Ok(idx)
    }

    /// Create a file at `path` holding `content`.
    pub fn create_file(&mut self, path: &str, content: &[u8], parents: bool) -> Result<i32> {
        if content.len() > MAX_FILE_SIZE {
            return Err(Error::full(format!(
                "{} bytes exceed the {} byte file limit",
                content.len(),
                MAX_FILE_SIZE
            )));
        }
        let segs = segments(path);
        let (leaf, dirs) = segs
            .split_last()
            .ok_or_else(|| Error::invalid("file path has no name"))?;
        check_name(leaf)?;

        let parent = self.walk_dirs(dirs, parents)?;
        let dir = self.read_inode(parent)?;
        if self.lookup(&dir, leaf)?.is_some() {
            return Err(Error::Duplicate(format!("'{}'", path)));
        }

        let slot = self.free_slot(&dir)?;
        let chunks: Vec<&[u8]> = if content.is_empty() {
            vec![content]
        } else {
            content.chunks(BLOCK_SIZE).collect()
        };
        let extra = matches!(slot, Slot::Chain { .. }) as i32;
        self.ensure_space(1, chunks.len() as i32 + extra)?;

        let idx = self.allocate_inode()?;
        let mut inode = Inode::new(InodeType::File, *b"664");
        (inode.uid, inode.gid) = self.owner;
        inode.size = content.len() as i32;
        for (i, chunk) in chunks.iter().enumerate() {
            let blk = self.allocate_block()?;
            self.write_file_block(blk, &FileBlock::from_slice(chunk))?;
            inode.block[i] = blk;
        }
        self.write_inode(idx, &inode)?;

        self.link(parent, slot, leaf, idx)?;
        info!(
            "created file {} (inode {}, {} bytes)",
            path,
            idx,
            content.len()
        );
        Ok(idx)
    }

    /// Concatenated content of a file inode.
    pub fn read_content(&self, idx: i32) -> Result<String> {
        let inode = self.read_inode(idx)?;
        if inode.is_folder() {
            return Err(Error::invalid(format!("inode {} is a directory", idx)));
        }
        // blocks split content at byte boundaries, so decode only once joined
        let mut raw = Vec::with_capacity(inode.size.max(0) as usize);
        for blk in inode.blocks() {
            raw.extend_from_slice(self.read_file_block(blk)?.bytes());
        }
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    pub fn read_file(&self, path: &str) -> Result<String> {
        let idx = self.resolve(path)?;
        let inode = self.read_inode(idx)?;
        if inode.is_folder() {
            return Err(Error::invalid(format!("'{}' is a directory", path)));
        }
        self.read_content(idx)
    }

    pub fn list_directory(&self, path: &str) -> Result<Vec<DirEntry>> {
        let idx = self.resolve(path)?;
        let dir = self.folder_inode(idx, path)?;
        let mut out = Vec::new();
        for blk in dir.blocks() {
            for e in self.read_folder(blk)?.children() {
                out.push(DirEntry {
                    name: e.name(),
                    inode: e.inode,
                    kind: self.read_inode(e.inode)?.kind,
                });
            }
        }
        Ok(out)
    }
}

/// `0123456789` repeated and cut to `size` bytes.
pub fn digit_pattern(size: usize) -> String {
    (0..size).map(|i| (b'0' + (i % 10) as u8) as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::partition::{find_by_name, Located};
    use crate::superblock::tests::formatted;

    #[test]
    fn nested_directories_need_parents_flag() {
        let (_dir, mut fs) = formatted(256 * 1024);
        assert!(matches!(
            fs.create_directory("/a/b", false),
            Err(Error::NotFound(_))
        ));
        fs.create_directory("/a/b", true).unwrap();
        fs.create_directory("/a/c", false).unwrap();

        let names: Vec<_> = fs
            .list_directory("/A")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["b", "c"]);
    }

    #[test]
    fn existing_leaf_is_duplicate() {
        let (_dir, mut fs) = formatted(256 * 1024);
        fs.create_directory("/docs", false).unwrap();
        let free = fs.superblock().free_inodes_count;
        assert!(matches!(
            fs.create_directory("/DOCS", false),
            Err(Error::Duplicate(_))
        ));
        assert_eq!(fs.superblock().free_inodes_count, free);
    }

    #[test]
    fn directories_chain_extra_folder_blocks() {
        let (_dir, mut fs) = formatted(256 * 1024);
        // root already holds users.txt, so four more entries span two new blocks
        for name in ["d1", "d2", "d3", "d4"] {
            fs.create_directory(&format!("/{}", name), false).unwrap();
        }
        let root = fs.read_inode(ROOT_INODE).unwrap();
        assert_eq!(root.blocks().count(), 3);
        let second = fs.read_folder(root.block[1]).unwrap();
        assert_eq!(second.entries[0].inode, ROOT_INODE);
        assert_eq!(second.parent(), ROOT_INODE);

        let names: Vec<_> = fs
            .list_directory("/")
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, ["users.txt", "d1", "d2", "d3", "d4"]);
    }

    #[test]
    fn files_span_blocks() {
        let (_dir, mut fs) = formatted(256 * 1024);
        let body = digit_pattern(150);
        let idx = fs.create_file("/home/notes.txt", body.as_bytes(), true).unwrap();

        let inode = fs.read_inode(idx).unwrap();
        assert_eq!(inode.blocks().count(), 3);
        assert_eq!(inode.size, 150);
        assert_eq!(fs.read_file("/HOME/notes.txt").unwrap(), body);
    }

    #[test]
    fn multibyte_text_survives_block_boundaries() {
        let (_dir, mut fs) = formatted(256 * 1024);
        // 'ñ' is two bytes; the second one lands at offset 64
        let body = format!("a{}", "ñ".repeat(40));
        fs.create_file("/es.txt", body.as_bytes(), false).unwrap();
        assert_eq!(fs.read_file("/es.txt").unwrap(), body);
    }

    #[test]
    fn empty_file_still_gets_a_block() {
        let (_dir, mut fs) = formatted(256 * 1024);
        let idx = fs.create_file("/empty", b"", false).unwrap();
        assert_eq!(fs.read_inode(idx).unwrap().blocks().count(), 1);
        assert_eq!(fs.read_file("/empty").unwrap(), "");
    }

    #[test]
    fn oversized_file_writes_nothing() {
        let (_dir, mut fs) = formatted(256 * 1024);
        let before = *fs.superblock();
        let err = fs.create_file("/big", &[b'x'; MAX_FILE_SIZE + 1], false);
        assert!(matches!(err, Err(Error::CapacityExhausted(_))));
        assert_eq!(*fs.superblock(), before);

        fs.create_file("/max", &[b'x'; MAX_FILE_SIZE], false).unwrap();
        assert_eq!(fs.read_file("/max").unwrap().len(), MAX_FILE_SIZE);
    }

    #[test]
    fn files_are_not_directories() {
        let (_dir, mut fs) = formatted(256 * 1024);
        fs.create_file("/f", b"hi", false).unwrap();
        assert!(matches!(
            fs.create_directory("/f/sub", true),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(fs.list_directory("/f"), Err(Error::InvalidArgument(_))));
        assert!(matches!(fs.read_file("/"), Err(Error::InvalidArgument(_))));
        assert!(matches!(fs.read_file("/missing"), Err(Error::NotFound(_))));
    }

    #[test]
    fn long_entry_names_are_rejected() {
        let (_dir, mut fs) = formatted(256 * 1024);
        assert!(matches!(
            fs.create_directory("/thirteen-char", false),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_structure_sizes_are_corrupt() {
        let (_dir, fs) = formatted(64 * 1024);
        let Located::Slot(_, part) = find_by_name(fs.disk(), "p").unwrap() else {
            panic!("expected a slot");
        };
        let mut sb = *fs.superblock();
        sb.block_size = 0;
        serialize(fs.disk(), fs.start, &sb).unwrap();
        assert!(matches!(
            Filesystem::open(fs.disk(), &part),
            Err(Error::Corrupt(_))
        ));

        sb.block_size = BLOCK_SIZE as i32;
        sb.inode_size = 0;
        serialize(fs.disk(), fs.start, &sb).unwrap();
        assert!(matches!(
            Filesystem::open(fs.disk(), &part),
            Err(Error::Corrupt(_))
        ));
    }

    #[test]
    fn digit_pattern_repeats() {
        assert_eq!(digit_pattern(12), "012345678901");
        assert_eq!(digit_pattern(0), "");
    }
}
