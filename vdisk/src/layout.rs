//! On-disk record types.
//!
//! Widths and field order here are the disk format. Integers are `i32`,
//! timestamps are `f32` seconds since the Unix epoch, flags are single ASCII
//! bytes, names are NUL-padded byte arrays.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::{name_from_bytes, name_to_bytes, Decoder, Encoder, OnDisk};
use crate::error::{Error, Result};

pub const MAGIC: i32 = 0xEF53;
pub const FS_TYPE_EXT2: i32 = 2;

/// Marks an unused pointer, slot, or chain end.
pub const NONE: i32 = -1;

pub const PARTITION_SLOTS: usize = 4;
pub const PARTITION_NAME_LEN: usize = 16;
pub const MOUNT_ID_LEN: usize = 4;

pub const DIRECT_POINTERS: usize = 15;
pub const BLOCK_SIZE: usize = 64;
pub const ENTRY_NAME_LEN: usize = 12;
pub const FOLDER_ENTRIES: usize = 4;
/// Slots 0 and 1 of every folder block hold `.` and `..`.
pub const FIRST_USABLE_ENTRY: usize = 2;

pub const ROOT_INODE: i32 = 0;
pub const USERS_INODE: i32 = 1;

/// Largest file body a single inode can address.
pub const MAX_FILE_SIZE: usize = DIRECT_POINTERS * BLOCK_SIZE;

pub fn now() -> f32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as f32)
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    Best,
    First,
    Worst,
}

impl Fit {
    pub fn byte(self) -> u8 {
        match self {
            Fit::Best => b'B',
            Fit::First => b'F',
            Fit::Worst => b'W',
        }
    }

    pub fn from_byte(b: u8) -> Option<Fit> {
        match b {
            b'B' => Some(Fit::Best),
            b'F' => Some(Fit::First),
            b'W' => Some(Fit::Worst),
            _ => None,
        }
    }
}

impl FromStr for Fit {
    type Err = Error;

    fn from_str(s: &str) -> Result<Fit> {
        match s.to_ascii_uppercase().as_str() {
            "BF" | "B" => Ok(Fit::Best),
            "FF" | "F" => Ok(Fit::First),
            "WF" | "W" => Ok(Fit::Worst),
            other => Err(Error::invalid(format!("unknown fit '{}'", other))),
        }
    }
}

impl fmt::Display for Fit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}F", self.byte() as char)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionType {
    Primary,
    Extended,
    Logical,
}

impl PartitionType {
    pub fn byte(self) -> u8 {
        match self {
            PartitionType::Primary => b'P',
            PartitionType::Extended => b'E',
            PartitionType::Logical => b'L',
        }
    }

    pub fn from_byte(b: u8) -> Option<PartitionType> {
        match b {
            b'P' => Some(PartitionType::Primary),
            b'E' => Some(PartitionType::Extended),
            b'L' => Some(PartitionType::Logical),
            _ => None,
        }
    }
}

impl FromStr for PartitionType {
    type Err = Error;

    fn from_str(s: &str) -> Result<PartitionType> {
        match s.to_ascii_uppercase().as_str() {
            "P" => Ok(PartitionType::Primary),
            "E" => Ok(PartitionType::Extended),
            "L" => Ok(PartitionType::Logical),
            other => Err(Error::invalid(format!("unknown partition type '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionStatus {
    Free,
    Occupied,
    Mounted,
}

impl PartitionStatus {
    pub fn byte(self) -> u8 {
        match self {
            PartitionStatus::Free => b'N',
            PartitionStatus::Occupied => b'0',
            PartitionStatus::Mounted => b'1',
        }
    }

    pub fn from_byte(b: u8) -> Result<PartitionStatus> {
        match b {
            b'N' | 0 => Ok(PartitionStatus::Free),
            b'0' => Ok(PartitionStatus::Occupied),
            b'1' => Ok(PartitionStatus::Mounted),
            other => Err(Error::Corrupt(format!("bad partition status byte {:#x}", other))),
        }
    }
}

fn opt_byte<T>(v: Option<T>, f: impl Fn(T) -> u8) -> u8 {
    v.map(f).unwrap_or(b'N')
}

/// One MBR slot. `start == -1` marks the slot free.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partition {
    pub status: PartitionStatus,
    pub kind: Option<PartitionType>,
    pub fit: Option<Fit>,
    pub start: i32,
    pub size: i32,
    pub name: [u8; PARTITION_NAME_LEN],
    pub correlative: i32,
    pub id: [u8; MOUNT_ID_LEN],
}

impl Partition {
    pub fn empty() -> Self {
        Self {
            status: PartitionStatus::Free,
            kind: None,
            fit: None,
            start: NONE,
            size: NONE,
            name: [0; PARTITION_NAME_LEN],
            correlative: NONE,
            id: [0; MOUNT_ID_LEN],
        }
    }

    pub fn is_free(&self) -> bool {
        self.start == NONE
    }

    pub fn name(&self) -> String {
        name_from_bytes(&self.name)
    }

    pub fn id(&self) -> String {
        name_from_bytes(&self.id)
    }

    pub fn end(&self) -> i64 {
        self.start as i64 + self.size as i64
    }
}

impl OnDisk for Partition {
    const SIZE: usize = 3 + 4 + 4 + PARTITION_NAME_LEN + 4 + MOUNT_ID_LEN;

    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.status.byte());
        enc.u8(opt_byte(self.kind, PartitionType::byte));
        enc.u8(opt_byte(self.fit, Fit::byte));
        enc.i32(self.start);
        enc.i32(self.size);
        enc.bytes(&self.name);
        enc.i32(self.correlative);
        enc.bytes(&self.id);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            status: PartitionStatus::from_byte(dec.u8()?)?,
            kind: PartitionType::from_byte(dec.u8()?),
            fit: Fit::from_byte(dec.u8()?),
            start: dec.i32()?,
            size: dec.i32()?,
            name: dec.array()?,
            correlative: dec.i32()?,
            id: dec.array()?,
        })
    }
}

/// Master boot record at byte 0 of the disk image.
#[derive(Debug, Clone, PartialEq)]
pub struct Mbr {
    pub size: i32,
    pub created: f32,
    pub signature: i32,
    pub fit: Fit,
    pub partitions: [Partition; PARTITION_SLOTS],
}

impl Mbr {
    pub fn new(size: i32, signature: i32, fit: Fit) -> Self {
        Self {
            size,
            created: now(),
            signature,
            fit,
            partitions: [Partition::empty(); PARTITION_SLOTS],
        }
    }

    /// Slots currently holding a partition.
    pub fn partitions(&self) -> impl Iterator<Item = &Partition> {
        self.partitions.iter().filter(|p| !p.is_free())
    }

    pub fn extended(&self) -> Option<&Partition> {
        self.partitions()
            .find(|p| p.kind == Some(PartitionType::Extended))
    }
}

impl OnDisk for Mbr {
    const SIZE: usize = 4 + 4 + 4 + 1 + PARTITION_SLOTS * Partition::SIZE;

    fn encode(&self, enc: &mut Encoder) {
        enc.i32(self.size);
        enc.f32(self.created);
        enc.i32(self.signature);
        enc.u8(self.fit.byte());
        for p in &self.partitions {
            p.encode(enc);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let size = dec.i32()?;
        let created = dec.f32()?;
        let signature = dec.i32()?;
        let fit_byte = dec.u8()?;
        let fit = Fit::from_byte(fit_byte)
            .ok_or_else(|| Error::Corrupt(format!("bad disk fit byte {:#x}", fit_byte)))?;
        let mut partitions = [Partition::empty(); PARTITION_SLOTS];
        for slot in partitions.iter_mut() {
            *slot = Partition::decode(dec)?;
        }
        Ok(Self {
            size,
            created,
            signature,
            fit,
            partitions,
        })
    }
}

/// Extended boot record: one node of the logical partition chain.
///
/// `start` is the byte offset of the record itself; the partition body
/// follows it directly.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ebr {
    pub mount: PartitionStatus,
    pub fit: Option<Fit>,
    pub start: i32,
    pub size: i32,
    pub next: i32,
    pub name: [u8; PARTITION_NAME_LEN],
}

impl Ebr {
    /// Placeholder record written at the head of a new extended partition.
    pub fn empty(start: i32) -> Self {
        Self {
            mount: PartitionStatus::Free,
            fit: None,
            start,
            size: NONE,
            next: NONE,
            name: [0; PARTITION_NAME_LEN],
        }
    }

    pub fn name(&self) -> String {
        name_from_bytes(&self.name)
    }

    pub fn is_vacant(&self) -> bool {
        self.name().is_empty()
    }

    /// First byte of the logical partition body.
    pub fn data_start(&self) -> i64 {
        self.start as i64 + Ebr::SIZE as i64
    }

    /// First byte past the logical partition body.
    pub fn end(&self) -> i64 {
        self.data_start() + self.size.max(0) as i64
    }
}

impl OnDisk for Ebr {
    const SIZE: usize = 2 + 4 + 4 + 4 + PARTITION_NAME_LEN;

    fn encode(&self, enc: &mut Encoder) {
        enc.u8(self.mount.byte());
        enc.u8(opt_byte(self.fit, Fit::byte));
        enc.i32(self.start);
        enc.i32(self.size);
        enc.i32(self.next);
        enc.bytes(&self.name);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            mount: PartitionStatus::from_byte(dec.u8()?)?,
            fit: Fit::from_byte(dec.u8()?),
            start: dec.i32()?,
            size: dec.i32()?,
            next: dec.i32()?,
            name: dec.array()?,
        })
    }
}

/// Per-partition filesystem header. All `*_start` and `first_*` fields are
/// absolute byte offsets in the disk image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuperBlock {
    pub filesystem_type: i32,
    pub inodes_count: i32,
    pub blocks_count: i32,
    pub free_inodes_count: i32,
    pub free_blocks_count: i32,
    pub mtime: f32,
    pub umtime: f32,
    pub mnt_count: i32,
    pub magic: i32,
    pub inode_size: i32,
    pub block_size: i32,
    pub first_ino: i32,
    pub first_blo: i32,
    pub bm_inode_start: i32,
    pub bm_block_start: i32,
    pub inode_start: i32,
    pub block_start: i32,
}

impl OnDisk for SuperBlock {
    const SIZE: usize = 17 * 4;

    fn encode(&self, enc: &mut Encoder) {
        enc.i32(self.filesystem_type);
        enc.i32(self.inodes_count);
        enc.i32(self.blocks_count);
        enc.i32(self.free_inodes_count);
        enc.i32(self.free_blocks_count);
        enc.f32(self.mtime);
        enc.f32(self.umtime);
        enc.i32(self.mnt_count);
        enc.i32(self.magic);
        enc.i32(self.inode_size);
        enc.i32(self.block_size);
        enc.i32(self.first_ino);
        enc.i32(self.first_blo);
        enc.i32(self.bm_inode_start);
        enc.i32(self.bm_block_start);
        enc.i32(self.inode_start);
        enc.i32(self.block_start);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            filesystem_type: dec.i32()?,
            inodes_count: dec.i32()?,
            blocks_count: dec.i32()?,
            free_inodes_count: dec.i32()?,
            free_blocks_count: dec.i32()?,
            mtime: dec.f32()?,
            umtime: dec.f32()?,
            mnt_count: dec.i32()?,
            magic: dec.i32()?,
            inode_size: dec.i32()?,
            block_size: dec.i32()?,
            first_ino: dec.i32()?,
            first_blo: dec.i32()?,
            bm_inode_start: dec.i32()?,
            bm_block_start: dec.i32()?,
            inode_start: dec.i32()?,
            block_start: dec.i32()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeType {
    Folder,
    File,
}

impl InodeType {
    pub fn byte(self) -> u8 {
        match self {
            InodeType::Folder => b'0',
            InodeType::File => b'1',
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inode {
    pub uid: i32,
    pub gid: i32,
    pub size: i32,
    pub atime: f32,
    pub ctime: f32,
    pub mtime: f32,
    pub block: [i32; DIRECT_POINTERS],
    pub kind: InodeType,
    pub perm: [u8; 3],
}

impl Inode {
    pub fn new(kind: InodeType, perm: [u8; 3]) -> Self {
        let t = now();
        Self {
            uid: 1,
            gid: 1,
            size: 0,
            atime: t,
            ctime: t,
            mtime: t,
            block: [NONE; DIRECT_POINTERS],
            kind,
            perm,
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == InodeType::Folder
    }

    /// Used pointers, in order. Pointers fill left to right without gaps.
    pub fn blocks(&self) -> impl Iterator<Item = i32> + '_ {
        self.block.iter().copied().take_while(|&b| b != NONE)
    }

    pub fn first_free_pointer(&self) -> Option<usize> {
        self.block.iter().position(|&b| b == NONE)
    }
}

impl OnDisk for Inode {
    const SIZE: usize = 6 * 4 + DIRECT_POINTERS * 4 + 1 + 3;

    fn encode(&self, enc: &mut Encoder) {
        enc.i32(self.uid);
        enc.i32(self.gid);
        enc.i32(self.size);
        enc.f32(self.atime);
        enc.f32(self.ctime);
        enc.f32(self.mtime);
        for b in &self.block {
            enc.i32(*b);
        }
        enc.u8(self.kind.byte());
        enc.bytes(&self.perm);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let uid = dec.i32()?;
        let gid = dec.i32()?;
        let size = dec.i32()?;
        let atime = dec.f32()?;
        let ctime = dec.f32()?;
        let mtime = dec.f32()?;
        let mut block = [NONE; DIRECT_POINTERS];
        for b in block.iter_mut() {
            *b = dec.i32()?;
        }
        let kind = match dec.u8()? {
            b'0' => InodeType::Folder,
            b'1' => InodeType::File,
            other => {
                return Err(Error::Corrupt(format!("bad inode type byte {:#x}", other)))
            }
        };
        Ok(Self {
            uid,
            gid,
            size,
            atime,
            ctime,
            mtime,
            block,
            kind,
            perm: dec.array()?,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderEntry {
    pub name: [u8; ENTRY_NAME_LEN],
    pub inode: i32,
}

impl FolderEntry {
    pub fn empty() -> Self {
        let mut name = [0u8; ENTRY_NAME_LEN];
        name[0] = b'-';
        Self { name, inode: NONE }
    }

    pub fn new(name: &str, inode: i32) -> Result<Self> {
        Ok(Self {
            name: name_to_bytes(name)?,
            inode,
        })
    }

    pub fn name(&self) -> String {
        name_from_bytes(&self.name)
    }

    pub fn is_free(&self) -> bool {
        self.inode == NONE
    }
}

/// Four directory entries; `.` and `..` occupy the first two.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FolderBlock {
    pub entries: [FolderEntry; FOLDER_ENTRIES],
}

impl FolderBlock {
    pub fn new(own: i32, parent: i32) -> Self {
        let mut entries = [FolderEntry::empty(); FOLDER_ENTRIES];
        entries[0] = FolderEntry {
            name: *b".\0\0\0\0\0\0\0\0\0\0\0",
            inode: own,
        };
        entries[1] = FolderEntry {
            name: *b"..\0\0\0\0\0\0\0\0\0\0",
            inode: parent,
        };
        Self { entries }
    }

    pub fn parent(&self) -> i32 {
        self.entries[1].inode
    }

    /// Occupied entries past `.` and `..`.
    pub fn children(&self) -> impl Iterator<Item = &FolderEntry> {
        self.entries[FIRST_USABLE_ENTRY..]
            .iter()
            .filter(|e| !e.is_free())
    }

    pub fn free_slot(&self) -> Option<usize> {
        (FIRST_USABLE_ENTRY..FOLDER_ENTRIES).find(|&i| self.entries[i].is_free())
    }
}

impl OnDisk for FolderBlock {
    const SIZE: usize = FOLDER_ENTRIES * (ENTRY_NAME_LEN + 4);

    fn encode(&self, enc: &mut Encoder) {
        for e in &self.entries {
            enc.bytes(&e.name);
            enc.i32(e.inode);
        }
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let mut entries = [FolderEntry::empty(); FOLDER_ENTRIES];
        for e in entries.iter_mut() {
            e.name = dec.array()?;
            e.inode = dec.i32()?;
        }
        Ok(Self { entries })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileBlock {
    pub content: [u8; BLOCK_SIZE],
}

impl FileBlock {
    pub fn empty() -> Self {
        Self {
            content: [0; BLOCK_SIZE],
        }
    }

    /// Build a block from at most [`BLOCK_SIZE`] bytes; the rest stays zero.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut block = Self::empty();
        let n = data.len().min(BLOCK_SIZE);
        block.content[..n].copy_from_slice(&data[..n]);
        block
    }

    /// Content up to the trailing NUL padding.
    pub fn bytes(&self) -> &[u8] {
        let end = self
            .content
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        &self.content[..end]
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(self.bytes()).into_owned()
    }
}

impl OnDisk for FileBlock {
    const SIZE: usize = BLOCK_SIZE;

    fn encode(&self, enc: &mut Encoder) {
        enc.bytes(&self.content);
    }

    fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        Ok(Self {
            content: dec.array()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{from_bytes, to_bytes};

    #[test]
    fn record_sizes_match_disk_format() {
        assert_eq!(Partition::SIZE, 35);
        assert_eq!(Mbr::SIZE, 153);
        assert_eq!(Ebr::SIZE, 30);
        assert_eq!(SuperBlock::SIZE, 68);
        assert_eq!(Inode::SIZE, 88);
        assert_eq!(FolderBlock::SIZE, 64);
        assert_eq!(FileBlock::SIZE, 64);
    }

    #[test]
    fn superblock_is_little_endian() {
        let sb = SuperBlock {
            filesystem_type: FS_TYPE_EXT2,
            inodes_count: 0,
            blocks_count: 0,
            free_inodes_count: 0,
            free_blocks_count: 0,
            mtime: 0.0,
            umtime: 0.0,
            mnt_count: 0,
            magic: MAGIC,
            inode_size: 0,
            block_size: 0,
            first_ino: 0,
            first_blo: 0,
            bm_inode_start: 0,
            bm_block_start: 0,
            inode_start: 0,
            block_start: 0,
        };
        let bytes = to_bytes(&sb);
        assert_eq!(&bytes[0..4], &[2, 0, 0, 0]);
        assert_eq!(&bytes[32..36], &[0x53, 0xEF, 0, 0]);
    }

    #[test]
    fn free_partition_slot_layout() {
        let bytes = to_bytes(&Partition::empty());
        assert_eq!(&bytes[0..3], b"NNN");
        assert_eq!(&bytes[3..7], &(-1i32).to_le_bytes());
        let back: Partition = from_bytes(&bytes).unwrap();
        assert!(back.is_free());
        assert_eq!(back.kind, None);
    }

    #[test]
    fn folder_block_dot_entries() {
        let block = FolderBlock::new(3, 0);
        assert_eq!(block.entries[0].name(), ".");
        assert_eq!(block.entries[1].name(), "..");
        assert_eq!(block.parent(), 0);
        assert_eq!(block.free_slot(), Some(2));
        assert_eq!(block.children().count(), 0);
    }

    #[test]
    fn inode_rejects_unknown_type() {
        let mut bytes = to_bytes(&Inode::new(InodeType::File, *b"664"));
        bytes[84] = b'x';
        assert!(matches!(from_bytes::<Inode>(&bytes), Err(Error::Corrupt(_))));
    }

    #[test]
    fn file_block_text_trims_padding() {
        let block = FileBlock::from_slice(b"1,G,root\n");
        assert_eq!(block.text(), "1,G,root\n");
        assert_eq!(FileBlock::empty().text(), "");
    }

    #[test]
    fn fit_parsing() {
        assert_eq!("wf".parse::<Fit>().unwrap(), Fit::Worst);
        assert_eq!("B".parse::<Fit>().unwrap(), Fit::Best);
        assert!("XF".parse::<Fit>().is_err());
        assert_eq!(Fit::First.to_string(), "FF");
    }
}
