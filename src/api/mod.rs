//! Purpose: Define the stable public Rust API boundary for the runtime debug header.
//! Exports: Builder, header, row, and error types plus the consumer-side `reader`.
//! Role: Public, additive-only surface; embedders and tools import from here.
//! Invariants: Row accessors decode little-endian storage; callers never see raw encodings.

pub mod reader;

pub use crate::core::error::{Error, ErrorKind, to_exit_code};
pub use crate::core::exe_path::executable_path;
pub use crate::core::format::{COOKIE, HEADER_SYMBOL, MAJOR_VERSION, MINOR_VERSION, TABLE_COUNT};
pub use crate::core::header::{Catalog, DebugHeader, header_layout};
pub use crate::core::layout::{
    DefineRow, FieldLayout, GlobalRow, MemberOffsetRow, RecordLayout, TableDirectoryEntry,
    TableKind, TypeId, TypeRow, row_layouts,
};
pub use crate::core::registrar::Registrar;
pub use crate::core::table::Capacities;
pub use crate::runtime::{RuntimeDebugHeader, header, populate, populate_with};
pub use reader::{HeaderSnapshot, LocalMemory, MemorySource, Reader, read_header};
