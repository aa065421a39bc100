//! Users and groups, stored as CSV rows in `/users.txt` (inode 1).
//!
//! ```text
//! 1,G,root
//! 1,U,root,root,123
//! ```
//!
//! Group rows are `id,G,name`, user rows `id,U,group,user,password`. An id
//! of `0` marks a deleted row; rows are never physically removed. A row
//! never spans two blocks.

use std::fmt;

use log::{debug, info};

use crate::error::{Error, Result};
use crate::layout::{now, FileBlock, BLOCK_SIZE, USERS_INODE};
use crate::store::Filesystem;

pub const ROOT: &str = "root";
pub const MAX_NAME_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Group {
        id: i32,
        name: String,
    },
    User {
        id: i32,
        group: String,
        name: String,
        password: String,
    },
    /// Anything unparseable, kept verbatim.
    Other(String),
}

impl Record {
    pub fn parse(line: &str) -> Record {
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        let id = fields.first().and_then(|f| f.parse::<i32>().ok());
        match (id, fields.as_slice()) {
            (Some(id), [_, "G", name]) => Record::Group {
                id,
                name: name.to_string(),
            },
            (Some(id), [_, "U", group, name, password]) => Record::User {
                id,
                group: group.to_string(),
                name: name.to_string(),
                password: password.to_string(),
            },
            _ => Record::Other(line.to_string()),
        }
    }

    fn id(&self) -> i32 {
        match self {
            Record::Group { id, .. } | Record::User { id, .. } => *id,
            Record::Other(_) => 0,
        }
    }

    fn set_id(&mut self, value: i32) {
        if let Record::Group { id, .. } | Record::User { id, .. } = self {
            *id = value;
        }
    }

    pub fn is_live(&self) -> bool {
        self.id() != 0
    }

    fn is_group(&self, wanted: &str) -> bool {
        matches!(self, Record::Group { name, .. } if name == wanted)
    }

    fn is_user(&self, wanted: &str) -> bool {
        matches!(self, Record::User { name, .. } if name == wanted)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Record::Group { id, name } => write!(f, "{},G,{}", id, name),
            Record::User {
                id,
                group,
                name,
                password,
            } => write!(f, "{},U,{},{},{}", id, group, name, password),
            Record::Other(raw) => f.write_str(raw),
        }
    }
}

/// A live user as returned by [`authenticate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: i32,
    pub gid: i32,
    pub group: String,
    pub name: String,
}

struct Block {
    index: i32,
    rows: Vec<Record>,
}

impl Block {
    fn text(&self) -> String {
        self.rows.iter().map(|r| format!("{}\n", r)).collect()
    }
}

/// Rows of `/users.txt`, grouped by the block holding them.
struct Table {
    blocks: Vec<Block>,
}

impl Table {
    fn load(fs: &Filesystem) -> Result<Table> {
        let inode = fs.read_inode(USERS_INODE)?;
        let mut blocks = Vec::new();
        for index in inode.blocks() {
            let text = fs.read_file_block(index)?.text();
            let rows = text
                .split('\n')
                .filter(|l| !l.trim().is_empty())
                .map(Record::parse)
                .collect();
            blocks.push(Block { index, rows });
        }
        Ok(Table { blocks })
    }

    fn rows(&self) -> impl Iterator<Item = &Record> {
        self.blocks.iter().flat_map(|b| b.rows.iter())
    }

    /// Block and row position of the first match, preferring live rows.
    fn position(&self, pred: impl Fn(&Record) -> bool) -> Option<(usize, usize)> {
        let mut dead = None;
        for (b, block) in self.blocks.iter().enumerate() {
            for (r, row) in block.rows.iter().enumerate() {
                if pred(row) {
                    if row.is_live() {
                        return Some((b, r));
                    }
                    dead.get_or_insert((b, r));
                }
            }
        }
        dead
    }

    fn live_group(&self, name: &str) -> Option<&Record> {
        self.rows().find(|r| r.is_live() && r.is_group(name))
    }

    /// One past the highest live id, groups and users alike.
    fn next_id(&self) -> i32 {
        self.rows()
            .filter(|r| r.is_live())
            .map(Record::id)
            .max()
            .unwrap_or(0)
            + 1
    }
}

fn check_field(what: &str, value: &str) -> Result<()> {
    if value.trim() != value {
        return Err(Error::invalid(format!(
            "{} may not start or end with whitespace",
            what
        )));
    }
    if value.is_empty() || value.len() > MAX_NAME_LEN {
        return Err(Error::invalid(format!(
            "{} must be 1 to {} characters",
            what, MAX_NAME_LEN
        )));
    }
    if value.contains(|c| c == ',' || c == '\n') {
        return Err(Error::invalid(format!("{} may not contain ',' or newlines", what)));
    }
    Ok(())
}

fn write_block(fs: &Filesystem, block: &Block) -> Result<()> {
    let text = block.text();
    if text.len() >= BLOCK_SIZE {
        return Err(Error::full(format!(
            "user records in block {} would not fit {} bytes",
            block.index, BLOCK_SIZE
        )));
    }
    fs.write_file_block(block.index, &FileBlock::from_slice(text.as_bytes()))
}

/// Rewrite the size and mtime of `/users.txt` after a change.
fn touch(fs: &Filesystem, table: &Table) -> Result<()> {
    let mut inode = fs.read_inode(USERS_INODE)?;
    inode.size = table.blocks.iter().map(|b| b.text().len() as i32).sum();
    inode.mtime = now();
    fs.write_inode(USERS_INODE, &inode)
}

fn append(fs: &mut Filesystem, mut table: Table, row: Record) -> Result<()> {
    let line = format!("{}\n", row);
    let fits_last = table
        .blocks
        .last()
        .map_or(false, |b| b.text().len() + line.len() < BLOCK_SIZE);

    if fits_last {
        if let Some(last) = table.blocks.last_mut() {
            last.rows.push(row);
            write_block(fs, last)?;
        }
    } else {
        let mut inode = fs.read_inode(USERS_INODE)?;
        let pointer = inode
            .first_free_pointer()
            .ok_or_else(|| Error::full("users.txt has no free block pointers"))?;
        let index = fs.allocate_block()?;
        let block = Block {
            index,
            rows: vec![row],
        };
        write_block(fs, &block)?;
        inode.block[pointer] = index;
        fs.write_inode(USERS_INODE, &inode)?;
        debug!("users.txt grew into block {}", index);
        table.blocks.push(block);
    }
    touch(fs, &table)
}

fn soft_delete(fs: &Filesystem, mut table: Table, (b, r): (usize, usize), what: &str) -> Result<()> {
    let row = &mut table.blocks[b].rows[r];
    if !row.is_live() {
        return Err(Error::InvalidState(format!("{} is already deleted", what)));
    }
    row.set_id(0);
    write_block(fs, &table.blocks[b])?;
    touch(fs, &table)
}

pub fn add_group(fs: &mut Filesystem, name: &str) -> Result<i32> {
    check_field("group name", name)?;
    let table = Table::load(fs)?;
    if table.live_group(name).is_some() {
        return Err(Error::Duplicate(format!("group '{}'", name)));
    }
    let id = table.next_id();
    append(
        fs,
        table,
        Record::Group {
            id,
            name: name.to_string(),
        },
    )?;
    info!("added group '{}' with id {}", name, id);
    Ok(id)
}

pub fn remove_group(fs: &mut Filesystem, name: &str) -> Result<()> {
    if name == ROOT {
        return Err(Error::PermissionDenied("the root group cannot be removed".into()));
    }
    let table = Table::load(fs)?;
    let pos = table
        .position(|r| r.is_group(name))
        .ok_or_else(|| Error::not_found(format!("group '{}'", name)))?;
    soft_delete(fs, table, pos, &format!("group '{}'", name))?;
    info!("removed group '{}'", name);
    Ok(())
}

pub fn add_user(fs: &mut Filesystem, name: &str, password: &str, group: &str) -> Result<i32> {
    check_field("user name", name)?;
    check_field("password", password)?;
    check_field("group name", group)?;
    let table = Table::load(fs)?;
    if table.live_group(group).is_none() {
        return Err(Error::not_found(format!("group '{}'", group)));
    }
    if table.rows().any(|r| r.is_live() && r.is_user(name)) {
        return Err(Error::Duplicate(format!("user '{}'", name)));
    }
    let id = table.next_id();
    append(
        fs,
        table,
        Record::User {
            id,
            group: group.to_string(),
            name: name.to_string(),
            password: password.to_string(),
        },
    )?;
    info!("added user '{}' in group '{}' with id {}", name, group, id);
    Ok(id)
}

pub fn remove_user(fs: &mut Filesystem, name: &str) -> Result<()> {
    let table = Table::load(fs)?;
    let pos = table
        .position(|r| r.is_user(name))
        .ok_or_else(|| Error::not_found(format!("user '{}'", name)))?;
    soft_delete(fs, table, pos, &format!("user '{}'", name))?;
    info!("removed user '{}'", name);
    Ok(())
}

/// Move a live user to another live group, editing the row in place.
pub fn change_group(fs: &mut Filesystem, name: &str, group: &str) -> Result<()> {
    let mut table = Table::load(fs)?;
    if table.live_group(group).is_none() {
        return Err(Error::not_found(format!("group '{}'", group)));
    }
    let (b, r) = table
        .position(|r| r.is_live() && r.is_user(name))
        .ok_or_else(|| Error::not_found(format!("user '{}'", name)))?;
    if let Record::User { group: g, .. } = &mut table.blocks[b].rows[r] {
        *g = group.to_string();
    }
    write_block(fs, &table.blocks[b])?;
    touch(fs, &table)?;
    info!("user '{}' moved to group '{}'", name, group);
    Ok(())
}

/// Check credentials against the live user rows.
pub fn authenticate(fs: &Filesystem, name: &str, password: &str) -> Result<User> {
    let table = Table::load(fs)?;
    let (group, id) = table
        .rows()
        .find_map(|r| match r {
            Record::User {
                id,
                group,
                name: n,
                password: p,
            } if *id != 0 && n == name && p == password => Some((group.clone(), *id)),
            _ => None,
        })
        .ok_or_else(|| Error::not_found(format!("user '{}' with these credentials", name)))?;
    let gid = table.live_group(&group).map_or(0, Record::id);
    Ok(User {
        id,
        gid,
        group,
        name: name.to_string(),
    })
}

/// Every row of `/users.txt`, deleted ones included.
pub fn records(fs: &Filesystem) -> Result<Vec<Record>> {
    Ok(Table::load(fs)?.rows().cloned().collect())
}
