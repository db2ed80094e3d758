// Row schemas shared by the producer and consumers; every type here is `#[repr(C)]`.
// Integers are stored little-endian; pointers use the target's native width.
use std::ffi::{CStr, c_char, c_void};
use std::mem::{offset_of, size_of};

use serde::Serialize;

const PTR: usize = size_of::<usize>();

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum TableKind {
    Global,
    Type,
    Field,
    Base,
    Define,
}

impl TableKind {
    /// Directory order.
    pub const ALL: [TableKind; 5] = [
        TableKind::Global,
        TableKind::Type,
        TableKind::Field,
        TableKind::Base,
        TableKind::Define,
    ];

    pub fn name(self) -> &'static str {
        match self {
            TableKind::Global => "Global",
            TableKind::Type => "Type",
            TableKind::Field => "Field",
            TableKind::Base => "Base",
            TableKind::Define => "Define",
        }
    }

    pub fn c_name(self) -> &'static CStr {
        match self {
            TableKind::Global => c"Global",
            TableKind::Type => c"Type",
            TableKind::Field => c"Field",
            TableKind::Base => c"Base",
            TableKind::Define => c"Define",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn row_size(self) -> usize {
        match self {
            TableKind::Global => size_of::<GlobalRow>(),
            TableKind::Type => size_of::<TypeRow>(),
            TableKind::Field | TableKind::Base => size_of::<MemberOffsetRow>(),
            TableKind::Define => size_of::<DefineRow>(),
        }
    }
}

/// Zero-based position of a row in the Type table.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
pub struct TypeId(pub(crate) u32);

impl TypeId {
    pub fn index(self) -> u32 {
        self.0
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct GlobalRow {
    name: *const c_char,
    address: *const c_void,
}

impl GlobalRow {
    pub fn new(name: &'static CStr, address: *const c_void) -> Self {
        Self {
            name: name.as_ptr(),
            address,
        }
    }

    pub fn name(&self) -> &'static CStr {
        // Rows are only built from `&'static CStr`.
        unsafe { CStr::from_ptr(self.name) }
    }

    pub fn address(&self) -> usize {
        self.address as usize
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TypeRow {
    name: *const c_char,
    size: u32,
}

impl TypeRow {
    pub fn new(name: &'static CStr, size: u32) -> Self {
        Self {
            name: name.as_ptr(),
            size: size.to_le(),
        }
    }

    pub fn name(&self) -> &'static CStr {
        unsafe { CStr::from_ptr(self.name) }
    }

    pub fn size(&self) -> u32 {
        u32::from_le(self.size)
    }
}

/// Row shape of both the Field and Base tables. For Base rows `name` is the
/// base type's name and `offset` is where the base sub-object starts.
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct MemberOffsetRow {
    name: *const c_char,
    type_id: u32,
    offset: u32,
}

impl MemberOffsetRow {
    pub fn new(name: &'static CStr, type_id: TypeId, offset: u32) -> Self {
        Self {
            name: name.as_ptr(),
            type_id: type_id.0.to_le(),
            offset: offset.to_le(),
        }
    }

    pub fn name(&self) -> &'static CStr {
        unsafe { CStr::from_ptr(self.name) }
    }

    pub fn type_id(&self) -> TypeId {
        TypeId(u32::from_le(self.type_id))
    }

    pub fn offset(&self) -> u32 {
        u32::from_le(self.offset)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct DefineRow {
    name: *const c_char,
    value: u32,
}

impl DefineRow {
    pub fn new(name: &'static CStr, value: u32) -> Self {
        Self {
            name: name.as_ptr(),
            value: value.to_le(),
        }
    }

    pub fn name(&self) -> &'static CStr {
        unsafe { CStr::from_ptr(self.name) }
    }

    pub fn value(&self) -> u32 {
        u32::from_le(self.value)
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TableDirectoryEntry {
    name: *const c_char,
    rows: *const c_void,
    row_count: u32,
}

impl TableDirectoryEntry {
    pub(crate) fn new<R>(kind: TableKind, rows: &[R]) -> Self {
        Self {
            name: kind.c_name().as_ptr(),
            rows: rows.as_ptr().cast(),
            row_count: (rows.len() as u32).to_le(),
        }
    }

    pub fn name(&self) -> &'static CStr {
        unsafe { CStr::from_ptr(self.name) }
    }

    pub fn kind(&self) -> Option<TableKind> {
        self.name().to_str().ok().and_then(TableKind::from_name)
    }

    pub fn rows_address(&self) -> usize {
        self.rows as usize
    }

    pub fn row_count(&self) -> u32 {
        u32::from_le(self.row_count)
    }
}

const _: () = {
    assert!(offset_of!(GlobalRow, name) == 0);
    assert!(offset_of!(GlobalRow, address) == PTR);
    assert!(size_of::<GlobalRow>() == 2 * PTR);

    assert!(offset_of!(TypeRow, size) == PTR);
    assert!(offset_of!(MemberOffsetRow, type_id) == PTR);
    assert!(offset_of!(MemberOffsetRow, offset) == PTR + 4);
    assert!(offset_of!(DefineRow, value) == PTR);

    assert!(offset_of!(TableDirectoryEntry, rows) == PTR);
    assert!(offset_of!(TableDirectoryEntry, row_count) == 2 * PTR);
};

#[derive(Clone, Debug, Serialize)]
pub struct FieldLayout {
    pub name: &'static str,
    pub offset: usize,
    pub size: usize,
}

/// Byte layout of one record shape, as a consumer would need to parse it.
#[derive(Clone, Debug, Serialize)]
pub struct RecordLayout {
    pub record: &'static str,
    pub size: usize,
    pub fields: Vec<FieldLayout>,
}

pub fn row_layouts() -> Vec<RecordLayout> {
    vec![
        RecordLayout {
            record: "TableDirectoryEntry",
            size: size_of::<TableDirectoryEntry>(),
            fields: vec![
                field("name", offset_of!(TableDirectoryEntry, name), PTR),
                field("rowArrayPtr", offset_of!(TableDirectoryEntry, rows), PTR),
                field("rowCount", offset_of!(TableDirectoryEntry, row_count), 4),
            ],
        },
        RecordLayout {
            record: "GlobalRow",
            size: size_of::<GlobalRow>(),
            fields: vec![
                field("name", offset_of!(GlobalRow, name), PTR),
                field("address", offset_of!(GlobalRow, address), PTR),
            ],
        },
        RecordLayout {
            record: "TypeRow",
            size: size_of::<TypeRow>(),
            fields: vec![
                field("name", offset_of!(TypeRow, name), PTR),
                field("size", offset_of!(TypeRow, size), 4),
            ],
        },
        RecordLayout {
            record: "MemberOffsetRow",
            size: size_of::<MemberOffsetRow>(),
            fields: vec![
                field("name", offset_of!(MemberOffsetRow, name), PTR),
                field("typeId", offset_of!(MemberOffsetRow, type_id), 4),
                field("offset", offset_of!(MemberOffsetRow, offset), 4),
            ],
        },
        RecordLayout {
            record: "DefineRow",
            size: size_of::<DefineRow>(),
            fields: vec![
                field("name", offset_of!(DefineRow, name), PTR),
                field("value", offset_of!(DefineRow, value), 4),
            ],
        },
    ]
}

pub(crate) fn field(name: &'static str, offset: usize, size: usize) -> FieldLayout {
    FieldLayout { name, offset, size }
}
