//! Per-caller context: mounted partitions plus the current login.
//!
//! Each operation locks the disk image it works on for its whole duration.

use std::path::Path;

use log::{info, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::layout::SuperBlock;
use crate::lock::DiskLock;
use crate::mount::MountTable;
use crate::partition::find_by_id;
use crate::store::{digit_pattern, Filesystem};
use crate::superblock::format;
use crate::users::{self, ROOT};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Login {
    pub user: String,
    pub uid: i32,
    pub gid: i32,
    pub mount_id: String,
}

/// Body of a new file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Content {
    Text(String),
    /// `size` bytes of the repeating `0123456789` pattern.
    Size(usize),
}

impl Content {
    fn into_bytes(self) -> Vec<u8> {
        match self {
            Content::Text(s) => s.into_bytes(),
            Content::Size(n) => digit_pattern(n).into_bytes(),
        }
    }
}

#[derive(Debug, Default)]
pub struct Session {
    mounts: MountTable,
    login: Option<Login>,
}

impl Session {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            mounts: MountTable::new(prefix),
            login: None,
        }
    }

    pub fn from_config(cfg: &Config) -> Self {
        Self::new(cfg.prefix.clone())
    }

    pub fn mounts(&self) -> &MountTable {
        &self.mounts
    }

    pub fn current(&self) -> Option<&Login> {
        self.login.as_ref()
    }

    pub fn mount(&mut self, disk: &Path, name: &str) -> Result<String> {
        self.mounts.mount(disk, name)
    }

    /// Ids of every partition mounted through this session.
    pub fn mounted(&self) -> Vec<String> {
        self.mounts.entries().iter().map(|e| e.id.clone()).collect()
    }

    /// Lock the disk behind `id` and open its filesystem.
    fn open(&self, id: &str) -> Result<(DiskLock, Filesystem)> {
        let entry = self.mounts.resolve(id)?;
        let lock = DiskLock::acquire(&entry.disk)?;
        let (_, part) = find_by_id(&entry.disk, &entry.id)?;
        let fs = Filesystem::open(&entry.disk, &part)?;
        Ok((lock, fs))
    }

    fn require_login(&self) -> Result<&Login> {
        self.login
            .as_ref()
            .ok_or_else(|| Error::PermissionDenied("no active session".into()))
    }

    fn require_root(&self) -> Result<&Login> {
        let login = self.require_login()?;
        if login.user != ROOT {
            warn!("'{}' attempted a root-only operation", login.user);
            return Err(Error::PermissionDenied(format!(
                "'{}' is not root",
                login.user
            )));
        }
        Ok(login)
    }

    /// Open the filesystem of the logged-in mount with inode ownership set
    /// to the current user.
    fn open_as_user(&self) -> Result<(DiskLock, Filesystem)> {
        let login = self.require_login()?;
        let (lock, mut fs) = self.open(&login.mount_id)?;
        fs.set_owner(login.uid, login.gid);
        Ok((lock, fs))
    }

    fn open_as_root(&self) -> Result<(DiskLock, Filesystem)> {
        let login = self.require_root()?;
        self.open(&login.mount_id)
    }

    /// Format the mounted partition `id`.
    pub fn mkfs(&mut self, id: &str) -> Result<SuperBlock> {
        let entry = self.mounts.resolve(id)?;
        let _lock = DiskLock::acquire(&entry.disk)?;
        let (_, part) = find_by_id(&entry.disk, &entry.id)?;
        let fs = format(&entry.disk, &part)?;
        Ok(*fs.superblock())
    }

    pub fn login(&mut self, user: &str, password: &str, id: &str) -> Result<()> {
        if let Some(current) = &self.login {
            return Err(Error::InvalidState(format!(
                "'{}' is already logged in",
                current.user
            )));
        }
        let (_lock, fs) = self.open(id)?;
        let found = users::authenticate(&fs, user, password)?;
        let mount_id = self.mounts.resolve(id)?.id.clone();
        info!("'{}' logged in on {}", found.name, mount_id);
        self.login = Some(Login {
            user: found.name,
            uid: found.id,
            gid: found.gid,
            mount_id,
        });
        Ok(())
    }

    pub fn logout(&mut self) -> Result<()> {
        match self.login.take() {
            Some(login) => {
                info!("'{}' logged out", login.user);
                Ok(())
            }
            None => Err(Error::InvalidState("no active session".into())),
        }
    }

    pub fn mkgrp(&mut self, name: &str) -> Result<i32> {
        let (_lock, mut fs) = self.open_as_root()?;
        users::add_group(&mut fs, name)
    }

    pub fn rmgrp(&mut self, name: &str) -> Result<()> {
        let (_lock, mut fs) = self.open_as_root()?;
        users::remove_group(&mut fs, name)
    }

    pub fn mkusr(&mut self, user: &str, password: &str, group: &str) -> Result<i32> {
        let (_lock, mut fs) = self.open_as_root()?;
        users::add_user(&mut fs, user, password, group)
    }

    pub fn rmusr(&mut self, user: &str) -> Result<()> {
        let (_lock, mut fs) = self.open_as_root()?;
        users::remove_user(&mut fs, user)
    }

    pub fn chgrp(&mut self, user: &str, group: &str) -> Result<()> {
        let (_lock, mut fs) = self.open_as_root()?;
        users::change_group(&mut fs, user, group)
    }

    pub fn mkdir(&mut self, path: &str, parents: bool) -> Result<i32> {
        let (_lock, mut fs) = self.open_as_user()?;
        fs.create_directory(path, parents)
    }

    pub fn mkfile(&mut self, path: &str, content: Content, parents: bool) -> Result<i32> {
        let (_lock, mut fs) = self.open_as_user()?;
        fs.create_file(path, &content.into_bytes(), parents)
    }

    /// Contents of `paths`, concatenated in order.
    pub fn cat(&self, paths: &[&str]) -> Result<String> {
        let (_lock, fs) = self.open_as_user()?;
        let mut out = String::new();
        for path in paths {
            out.push_str(&fs.read_file(path)?);
        }
        Ok(out)
    }
}
