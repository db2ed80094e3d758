//! Purpose: Reference consumer that decodes a published debug header through raw memory reads.
//! Exports: `MemorySource`, `LocalMemory`, `ByteImage`, `ProcMemory` (Linux), `Reader`, `Limits`,
//!   `HeaderSnapshot` and its entry types.
//! Role: What an attaching diagnostic tool does: validate cookie and major version, then walk
//!   the directory and rows by documented offsets, never by Rust types.
//! Invariants: Every count and string is bounded by `Limits` before memory is read.
//! Invariants: A zero table count yields `Ok(None)`, not an error.
//! Invariants: Unknown table names are reported, not fatal; duplicate known names are corrupt.
use std::collections::HashSet;

use serde::Serialize;

use crate::core::error::{Error, ErrorKind};
use crate::core::format::{COOKIE, MAJOR_VERSION, cookie_error, version_error};
use crate::core::layout::TableKind;

pub trait MemorySource {
    /// Fills `buf` from `address` or fails; partial reads are errors.
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), Error>;
}

/// Reads the current process's own address space.
#[derive(Debug)]
pub struct LocalMemory {
    _private: (),
}

impl LocalMemory {
    /// # Safety
    /// Every address handed to `read` (including pointers discovered while walking
    /// the tables) must be mapped and readable for the requested length.
    pub unsafe fn new() -> Self {
        Self { _private: () }
    }
}

impl MemorySource for LocalMemory {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), Error> {
        if address == 0 {
            return Err(Error::new(ErrorKind::Corrupt)
                .with_message("null pointer")
                .with_address(address));
        }
        let src = usize::try_from(address).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("address exceeds pointer width")
                .with_address(address)
                .with_source(err)
        })? as *const u8;
        unsafe { std::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
        Ok(())
    }
}

/// A captured memory range, e.g. from a dump file.
#[derive(Clone, Debug)]
pub struct ByteImage {
    base: u64,
    bytes: Vec<u8>,
}

impl ByteImage {
    /// Fails if the capture would extend past the end of the 64-bit address space.
    pub fn new(base: u64, bytes: Vec<u8>) -> Result<Self, Error> {
        let len = bytes.len() as u64;
        if base.checked_add(len).is_none() {
            return Err(corrupt(
                format!("{len}-byte image does not fit in the address space"),
                base,
            ));
        }
        Ok(Self { base, bytes })
    }
}

impl MemorySource for ByteImage {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), Error> {
        let out_of_range = || {
            Error::new(ErrorKind::Corrupt)
                .with_message(format!("{} bytes outside captured image", buf.len()))
                .with_address(address)
        };
        let start = address
            .checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or_else(out_of_range)?;
        let end = start.checked_add(buf.len()).ok_or_else(out_of_range)?;
        let slice = self.bytes.get(start..end).ok_or_else(out_of_range)?;
        buf.copy_from_slice(slice);
        Ok(())
    }
}

/// Reads another process through `/proc/<pid>/mem`.
#[cfg(target_os = "linux")]
#[derive(Debug)]
pub struct ProcMemory {
    pid: u32,
    file: std::fs::File,
}

#[cfg(target_os = "linux")]
impl ProcMemory {
    pub fn open(pid: u32) -> Result<Self, Error> {
        let path = format!("/proc/{pid}/mem");
        let file = std::fs::File::open(&path).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("cannot open {path}"))
                .with_hint("Reading another process needs ptrace permission over it.")
                .with_source(err)
        })?;
        Ok(Self { pid, file })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

#[cfg(target_os = "linux")]
impl MemorySource for ProcMemory {
    fn read(&self, address: u64, buf: &mut [u8]) -> Result<(), Error> {
        use std::os::unix::fs::FileExt;
        self.file.read_exact_at(buf, address).map_err(|err| {
            Error::new(ErrorKind::Io)
                .with_message(format!("read of {} bytes from pid {} failed", buf.len(), self.pid))
                .with_address(address)
                .with_source(err)
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Limits {
    pub max_tables: u32,
    pub max_rows: u32,
    pub max_name_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tables: 64,
            max_rows: 65_536,
            max_name_len: 1024,
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct GlobalEntry {
    pub name: String,
    pub address: u64,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TypeEntry {
    pub id: u32,
    pub name: String,
    pub size: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct MemberEntry {
    pub type_id: u32,
    pub type_name: String,
    pub name: String,
    pub offset: u32,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct DefineEntry {
    pub name: String,
    pub value: u32,
}

#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize)]
pub struct HeaderSnapshot {
    pub address: u64,
    pub major_version: u16,
    pub minor_version: u16,
    pub table_count: u32,
    pub globals: Vec<GlobalEntry>,
    pub types: Vec<TypeEntry>,
    pub fields: Vec<MemberEntry>,
    pub bases: Vec<MemberEntry>,
    pub defines: Vec<DefineEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unknown_tables: Vec<String>,
}

impl HeaderSnapshot {
    pub fn type_named(&self, name: &str) -> Option<&TypeEntry> {
        self.types.iter().find(|entry| entry.name == name)
    }

    pub fn field_offset(&self, type_name: &str, field: &str) -> Option<u32> {
        let id = self.type_named(type_name)?.id;
        self.fields
            .iter()
            .find(|entry| entry.type_id == id && entry.name == field)
            .map(|entry| entry.offset)
    }

    pub fn base_offset(&self, type_name: &str, base: &str) -> Option<u32> {
        let id = self.type_named(type_name)?.id;
        self.bases
            .iter()
            .find(|entry| entry.type_id == id && entry.name == base)
            .map(|entry| entry.offset)
    }

    pub fn define(&self, name: &str) -> Option<u32> {
        self.defines
            .iter()
            .find(|entry| entry.name == name)
            .map(|entry| entry.value)
    }
}

pub struct Reader<'a, S: MemorySource + ?Sized> {
    source: &'a S,
    pointer_width: usize,
    limits: Limits,
}

impl<'a, S: MemorySource + ?Sized> Reader<'a, S> {
    /// A reader for a target with this process's pointer width.
    pub fn new(source: &'a S) -> Self {
        Self {
            source,
            pointer_width: std::mem::size_of::<usize>(),
            limits: Limits::default(),
        }
    }

    pub fn with_pointer_width(mut self, width: usize) -> Result<Self, Error> {
        if width != 4 && width != 8 {
            return Err(Error::new(ErrorKind::Usage)
                .with_message(format!("pointer width must be 4 or 8, got {width}")));
        }
        self.pointer_width = width;
        Ok(self)
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Decodes the header at `address`; `None` while its table count is still zero.
    pub fn read_header(&self, address: u64) -> Result<Option<HeaderSnapshot>, Error> {
        let pw = self.pointer_width as u64;
        let mut cookie = [0u8; 4];
        self.source.read(address, &mut cookie)?;
        if cookie != COOKIE {
            return Err(cookie_error(cookie).with_address(address));
        }
        let major = self.read_u16(offset(address, 4)?)?;
        let minor = self.read_u16(offset(address, 6)?)?;
        if major != MAJOR_VERSION {
            return Err(version_error(major, minor).with_address(address));
        }
        let table_count = self.read_u32(offset(address, 8 + pw)?)?;
        if table_count == 0 {
            return Ok(None);
        }
        if table_count > self.limits.max_tables {
            return Err(corrupt(format!("table count {table_count} exceeds limit"), address));
        }
        let directory = self.read_ptr(offset(address, 8)?)?;

        let mut snapshot = HeaderSnapshot {
            address,
            major_version: major,
            minor_version: minor,
            table_count,
            ..HeaderSnapshot::default()
        };
        let entry_stride = align(2 * pw + 4, pw);
        let mut seen = HashSet::new();
        let mut tables = Vec::new();
        for index in 0..u64::from(table_count) {
            let entry = element(directory, index, entry_stride)?;
            let name = self.read_name(self.read_ptr(entry)?)?;
            let rows = self.read_ptr(offset(entry, pw)?)?;
            let count = self.read_u32(offset(entry, 2 * pw)?)?;
            if count > self.limits.max_rows {
                return Err(corrupt(format!("table {name} has {count} rows"), entry));
            }
            match TableKind::from_name(&name) {
                Some(kind) => {
                    if !seen.insert(kind) {
                        return Err(corrupt(format!("table {name} appears twice"), entry));
                    }
                    tables.push((kind, rows, count));
                }
                None => snapshot.unknown_tables.push(name),
            }
        }

        // Types first so member rows can be checked against them.
        tables.sort_by_key(|(kind, _, _)| *kind != TableKind::Type);
        for (kind, rows, count) in tables {
            self.read_table(&mut snapshot, kind, rows, count)?;
        }
        tracing::debug!(
            address,
            types = snapshot.types.len(),
            fields = snapshot.fields.len(),
            "debug header decoded"
        );
        Ok(Some(snapshot))
    }

    fn read_table(
        &self,
        snapshot: &mut HeaderSnapshot,
        kind: TableKind,
        rows: u64,
        count: u32,
    ) -> Result<(), Error> {
        let pw = self.pointer_width as u64;
        let stride = match kind {
            TableKind::Global => 2 * pw,
            TableKind::Type | TableKind::Define => align(pw + 4, pw),
            TableKind::Field | TableKind::Base => align(pw + 8, pw),
        };
        for index in 0..u64::from(count) {
            let row = element(rows, index, stride)?;
            let name = self.read_name(self.read_ptr(row)?)?;
            match kind {
                TableKind::Global => snapshot.globals.push(GlobalEntry {
                    name,
                    address: self.read_ptr(offset(row, pw)?)?,
                }),
                TableKind::Type => snapshot.types.push(TypeEntry {
                    id: index as u32,
                    name,
                    size: self.read_u32(offset(row, pw)?)?,
                }),
                TableKind::Define => snapshot.defines.push(DefineEntry {
                    name,
                    value: self.read_u32(offset(row, pw)?)?,
                }),
                TableKind::Field | TableKind::Base => {
                    let type_id = self.read_u32(offset(row, pw)?)?;
                    let member_offset = self.read_u32(offset(row, pw + 4)?)?;
                    let type_name = snapshot
                        .types
                        .get(type_id as usize)
                        .map(|entry| entry.name.clone())
                        .ok_or_else(|| {
                            corrupt(
                                format!("{} row {name} references unknown type {type_id}", kind.name()),
                                row,
                            )
                        })?;
                    let entry = MemberEntry {
                        type_id,
                        type_name,
                        name,
                        offset: member_offset,
                    };
                    if kind == TableKind::Field {
                        snapshot.fields.push(entry);
                    } else {
                        snapshot.bases.push(entry);
                    }
                }
            }
        }
        Ok(())
    }

    fn read_u16(&self, address: u64) -> Result<u16, Error> {
        let mut buf = [0u8; 2];
        self.source.read(address, &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_u32(&self, address: u64) -> Result<u32, Error> {
        let mut buf = [0u8; 4];
        self.source.read(address, &mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    fn read_ptr(&self, address: u64) -> Result<u64, Error> {
        if self.pointer_width == 4 {
            return self.read_u32(address).map(u64::from);
        }
        let mut buf = [0u8; 8];
        self.source.read(address, &mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    /// Reads a NUL-terminated name in chunks that never cross a page boundary.
    fn read_name(&self, address: u64) -> Result<String, Error> {
        const PAGE: u64 = 4096;
        const CHUNK: u64 = 64;
        if address == 0 {
            return Err(corrupt("null name pointer", address));
        }
        let mut bytes = Vec::new();
        let mut cursor = address;
        loop {
            let mut len = CHUNK.min(PAGE - cursor % PAGE) as usize;
            let mut buf = vec![0u8; len];
            if let Err(err) = self.source.read(cursor, &mut buf) {
                // The name may end right before unreadable memory.
                if len == 1 {
                    return Err(err);
                }
                len = 1;
                buf.truncate(1);
                self.source.read(cursor, &mut buf)?;
            }
            if let Some(end) = buf.iter().position(|byte| *byte == 0) {
                bytes.extend_from_slice(&buf[..end]);
                break;
            }
            bytes.extend_from_slice(&buf);
            if bytes.len() > self.limits.max_name_len {
                return Err(corrupt("name is not terminated within limit", address));
            }
            cursor = offset(cursor, len as u64)?;
        }
        if bytes.len() > self.limits.max_name_len {
            return Err(corrupt("name exceeds limit", address));
        }
        String::from_utf8(bytes).map_err(|err| {
            Error::new(ErrorKind::Corrupt)
                .with_message("name is not valid UTF-8")
                .with_address(address)
                .with_source(err)
        })
    }
}

/// Decodes the header at `address` with default limits and this process's pointer width.
pub fn read_header<S: MemorySource + ?Sized>(
    source: &S,
    address: u64,
) -> Result<Option<HeaderSnapshot>, Error> {
    Reader::new(source).read_header(address)
}

/// `base + delta`, or `Corrupt` when a target pointer would wrap.
fn offset(base: u64, delta: u64) -> Result<u64, Error> {
    base.checked_add(delta)
        .ok_or_else(|| corrupt(format!("address {base:#x} + {delta} overflows"), base))
}

fn element(base: u64, index: u64, stride: u64) -> Result<u64, Error> {
    index
        .checked_mul(stride)
        .and_then(|delta| base.checked_add(delta))
        .ok_or_else(|| corrupt(format!("element {index} past {base:#x} overflows"), base))
}

fn align(value: u64, to: u64) -> u64 {
    value.div_ceil(to) * to
}

fn corrupt(message: impl Into<String>, address: u64) -> Error {
    Error::new(ErrorKind::Corrupt)
        .with_message(message)
        .with_address(address)
}
