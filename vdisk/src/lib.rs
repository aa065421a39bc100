//! vdisk library
//!
//! EXT2-style virtual disks inside a single image file: MBR partition table
//! with logical partitions, per-partition superblock, bitmaps, inodes and
//! 64-byte blocks, plus a users/groups store. Shared by the `fdisk`,
//! `vdisk_info` and `mkdisk` binaries.

pub mod codec;
pub mod config;
pub mod disk;
pub mod error;
pub mod inspect;
pub mod layout;
pub mod lock;
pub mod mount;
pub mod partition;
pub mod session;
pub mod store;
pub mod superblock;
pub mod users;

pub use config::{load_config, Config};
pub use disk::{create_disk, remove_disk, Unit};
pub use error::{Error, Result};
pub use layout::{Fit, PartitionType};
pub use mount::MountTable;
pub use partition::{create_partition, find_by_id, find_by_name, logical_partitions, Located};
pub use session::{Content, Login, Session};
pub use store::Filesystem;
