//! Fixed-layout little-endian codec for on-disk records.
//!
//! Every record is written field by field in declaration order, with no
//! padding. The encoded length of a type never changes, so a record can be
//! read back from any byte offset it was written to.

use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};

/// A record with a fixed on-disk width.
pub trait OnDisk: Sized {
    /// Encoded size in bytes.
    const SIZE: usize;

    fn encode(&self, enc: &mut Encoder);

    fn decode(dec: &mut Decoder<'_>) -> Result<Self>;
}

/// Append-only byte sink used by [`OnDisk::encode`].
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn with_capacity(cap: usize) -> Self {
        Self {
            buf: Vec::with_capacity(cap),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.buf.push(v);
    }

    pub fn i32(&mut self, v: i32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn f32(&mut self, v: f32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn bytes(&mut self, v: &[u8]) {
        self.buf.extend_from_slice(v);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an encoded record.
pub struct Decoder<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(Error::Corrupt(format!(
                "record truncated: wanted {} bytes at {}, have {}",
                n,
                self.pos,
                self.bytes.len()
            )));
        }
        let out = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    pub fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

pub fn to_bytes<T: OnDisk>(record: &T) -> Vec<u8> {
    let mut enc = Encoder::with_capacity(T::SIZE);
    record.encode(&mut enc);
    let buf = enc.into_inner();
    debug_assert_eq!(buf.len(), T::SIZE);
    buf
}

pub fn from_bytes<T: OnDisk>(bytes: &[u8]) -> Result<T> {
    if bytes.len() != T::SIZE {
        return Err(Error::Corrupt(format!(
            "size mismatch: expected {} bytes, got {}",
            T::SIZE,
            bytes.len()
        )));
    }
    T::decode(&mut Decoder::new(bytes))
}

/// Write `record` at `offset`, creating the file if it does not exist.
pub fn serialize<T: OnDisk>(path: &Path, offset: u64, record: &T) -> Result<()> {
    write_bytes(path, offset, &to_bytes(record))
}

/// Read one `T` from `offset`. A short read is reported as corruption.
pub fn deserialize<T: OnDisk>(path: &Path, offset: u64) -> Result<T> {
    let buf = read_bytes(path, offset, T::SIZE)?;
    from_bytes(&buf)
}

pub fn write_bytes(path: &Path, offset: u64, bytes: &[u8]) -> Result<()> {
    let mut file = OpenOptions::new().write(true).create(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(bytes)?;
    Ok(())
}

pub fn read_bytes(path: &Path, offset: u64, len: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Corrupt(format!(
            "{}: fewer than {} bytes at offset {}",
            path.display(),
            len,
            offset
        )),
        _ => Error::Io(e),
    })?;
    Ok(buf)
}

/// Overwrite `len` bytes starting at `offset` with `fill`.
pub fn fill_bytes(path: &Path, offset: u64, len: u64, fill: u8) -> Result<()> {
    const CHUNK: u64 = 64 * 1024;
    let mut file = OpenOptions::new().write(true).create(true).open(path)?;
    file.seek(SeekFrom::Start(offset))?;
    let chunk = vec![fill; CHUNK.min(len) as usize];
    let mut left = len;
    while left > 0 {
        let n = left.min(CHUNK) as usize;
        file.write_all(&chunk[..n])?;
        left -= n as u64;
    }
    Ok(())
}

/// Fixed-width name field: bytes up to the first NUL, surrounding spaces trimmed.
pub fn name_from_bytes(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).trim().to_string()
}

/// Copy `name` into a zeroed fixed-width field. Longer names are rejected.
pub fn name_to_bytes<const N: usize>(name: &str) -> Result<[u8; N]> {
    let bytes = name.as_bytes();
    if bytes.len() > N {
        return Err(Error::invalid(format!(
            "name '{}' longer than {} bytes",
            name, N
        )));
    }
    let mut out = [0u8; N];
    out[..bytes.len()].copy_from_slice(bytes);
    Ok(out)
}
