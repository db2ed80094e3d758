//! Purpose: The published debug header and the finished, immutable table catalog.
//! Exports: `DebugHeader`, `Catalog`, `header_layout`.
//! Role: Root of the structure an out-of-process reader locates through the exported symbol.
//! Invariants: Cookie and versions are fixed at construction and never written again.
//! Invariants: `table_count` is 0 until `publish`; it is written last, with release ordering,
//!   after the directory pointer and every row, so a nonzero count means all tables are readable.
//! Invariants: A header is published at most once; its catalog lives for the rest of the process.
use std::mem::{offset_of, size_of};
use std::ptr;
use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};

use crate::core::error::{Error, ErrorKind};
use crate::core::format::{COOKIE, MAJOR_VERSION, MINOR_VERSION};
use crate::core::layout::{
    DefineRow, GlobalRow, MemberOffsetRow, RecordLayout, TableDirectoryEntry, TableKind, TypeRow,
    field,
};

/// `AtomicPtr`/`AtomicU32` share the in-memory representation of `*mut T`/`u32`,
/// so this is byte-for-byte the documented header layout.
#[repr(C)]
#[derive(Debug)]
pub struct DebugHeader {
    cookie: [u8; 4],
    major_version: u16,
    minor_version: u16,
    directory: AtomicPtr<TableDirectoryEntry>,
    table_count: AtomicU32,
}

const _: () = {
    assert!(offset_of!(DebugHeader, cookie) == 0);
    assert!(offset_of!(DebugHeader, major_version) == 4);
    assert!(offset_of!(DebugHeader, minor_version) == 6);
    assert!(offset_of!(DebugHeader, directory) == 8);
    assert!(offset_of!(DebugHeader, table_count) == 8 + size_of::<usize>());
};

impl Default for DebugHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl DebugHeader {
    pub const fn new() -> Self {
        Self {
            cookie: COOKIE,
            major_version: MAJOR_VERSION.to_le(),
            minor_version: MINOR_VERSION.to_le(),
            directory: AtomicPtr::new(ptr::null_mut()),
            table_count: AtomicU32::new(0),
        }
    }

    pub fn cookie(&self) -> [u8; 4] {
        self.cookie
    }

    pub fn major_version(&self) -> u16 {
        u16::from_le(self.major_version)
    }

    pub fn minor_version(&self) -> u16 {
        u16::from_le(self.minor_version)
    }

    /// Zero means "not yet populated".
    pub fn table_count(&self) -> u32 {
        u32::from_le(self.table_count.load(Ordering::Acquire))
    }

    pub fn is_published(&self) -> bool {
        self.table_count() != 0
    }

    pub fn address(&self) -> usize {
        self as *const Self as usize
    }

    pub fn directory(&self) -> Option<&'static [TableDirectoryEntry]> {
        let count = self.table_count();
        if count == 0 {
            return None;
        }
        let directory = self.directory.load(Ordering::Acquire);
        // Only `publish` stores a non-null pointer, and it points into a `&'static Catalog`.
        Some(unsafe { std::slice::from_raw_parts(directory, count as usize) })
    }

    /// Points the header at `catalog` and then, last, writes the table count.
    pub fn publish(&self, catalog: &'static Catalog) -> Result<(), Error> {
        let directory = catalog.directory.as_ptr().cast_mut();
        self.directory
            .compare_exchange(
                ptr::null_mut(),
                directory,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| {
                Error::new(ErrorKind::AlreadyPublished)
                    .with_message("debug header already points at a catalog")
                    .with_address(self.address() as u64)
            })?;
        let count = catalog.directory.len() as u32;
        self.table_count.store(count.to_le(), Ordering::Release);
        tracing::debug!(
            header = self.address(),
            tables = count,
            "debug header published"
        );
        Ok(())
    }
}

/// The frozen output of one builder pass: five row arrays plus the directory
/// that names them. Row storage never moves once assembled.
#[derive(Debug)]
pub struct Catalog {
    globals: Vec<GlobalRow>,
    types: Vec<TypeRow>,
    fields: Vec<MemberOffsetRow>,
    bases: Vec<MemberOffsetRow>,
    defines: Vec<DefineRow>,
    directory: Vec<TableDirectoryEntry>,
}

// Rows hold pointers to `'static` names and recorded addresses; nothing is
// dereferenced through them except the names, and the catalog is immutable.
unsafe impl Send for Catalog {}
unsafe impl Sync for Catalog {}

impl Catalog {
    pub(crate) fn assemble(
        globals: Vec<GlobalRow>,
        types: Vec<TypeRow>,
        fields: Vec<MemberOffsetRow>,
        bases: Vec<MemberOffsetRow>,
        defines: Vec<DefineRow>,
    ) -> Self {
        let mut directory = Vec::with_capacity(TableKind::ALL.len());
        for kind in TableKind::ALL {
            let entry = match kind {
                TableKind::Global => TableDirectoryEntry::new(kind, &globals),
                TableKind::Type => TableDirectoryEntry::new(kind, &types),
                TableKind::Field => TableDirectoryEntry::new(kind, &fields),
                TableKind::Base => TableDirectoryEntry::new(kind, &bases),
                TableKind::Define => TableDirectoryEntry::new(kind, &defines),
            };
            directory.push(entry);
        }
        Self {
            globals,
            types,
            fields,
            bases,
            defines,
            directory,
        }
    }

    pub fn globals(&self) -> &[GlobalRow] {
        &self.globals
    }

    pub fn types(&self) -> &[TypeRow] {
        &self.types
    }

    pub fn fields(&self) -> &[MemberOffsetRow] {
        &self.fields
    }

    pub fn bases(&self) -> &[MemberOffsetRow] {
        &self.bases
    }

    pub fn defines(&self) -> &[DefineRow] {
        &self.defines
    }

    pub fn directory(&self) -> &[TableDirectoryEntry] {
        &self.directory
    }

    pub fn entry(&self, kind: TableKind) -> &TableDirectoryEntry {
        &self.directory[kind as usize]
    }
}

pub fn header_layout() -> RecordLayout {
    let ptr = size_of::<usize>();
    RecordLayout {
        record: "Header",
        size: size_of::<DebugHeader>(),
        fields: vec![
            field("cookie", offset_of!(DebugHeader, cookie), 4),
            field("majorVersion", offset_of!(DebugHeader, major_version), 2),
            field("minorVersion", offset_of!(DebugHeader, minor_version), 2),
            field("tableDirectoryPtr", offset_of!(DebugHeader, directory), ptr),
            field("tableCount", offset_of!(DebugHeader, table_count), 4),
        ],
    }
}
