//! Purpose: A small managed-runtime layout and its hand-written registration sequence.
//! Exports: Sample runtime structures, `THREAD_STORE`, `FREE_OBJECT_METHOD_TABLE`, `register_sample`.
//! Role: Stands in for real runtime types so the CLI and tests can exercise a full pass.
//! Invariants: Every type is registered before its fields and bases.
//! Invariants: "Derived" structs embed their base as a field; base offsets come from a shared member.
use std::ffi::{c_char, c_void};
use std::mem::{offset_of, size_of};
use std::sync::atomic::AtomicPtr;

use crate::core::error::Error;
use crate::core::registrar::Registrar;

#[repr(C)]
pub struct ThreadStore {
    pub thread_list: *mut Thread,
    pub thread_count: u32,
    pub pending_thread_count: u32,
}

#[repr(C)]
pub struct AllocContext {
    pub alloc_ptr: usize,
    pub alloc_limit: usize,
    pub alloc_bytes: i64,
    pub alloc_bytes_uoh: i64,
    pub alloc_count: u32,
}

#[repr(C)]
pub struct Thread {
    pub link: *mut Thread,
    pub thread_id: u32,
    pub os_thread_id: u64,
    pub last_thrown_object_handle: usize,
    pub alloc_context: AllocContext,
}

#[repr(C)]
pub struct MethodTable {
    pub flags: u32,
    pub base_size: u32,
    pub flags2: u16,
    pub token: u16,
    pub num_virtuals: u16,
    pub num_interfaces: u16,
    pub parent: *const MethodTable,
    pub loader_module: *const c_void,
}

#[repr(C)]
pub struct MethodDesc {
    pub chunk_index: u8,
    pub flags2: u8,
    pub slot_number: u16,
    pub flags: u16,
    pub flags3_and_token_remainder: u16,
}

#[repr(C)]
pub struct FCallMethodDesc {
    pub method_desc: MethodDesc,
    pub ecall_id: u32,
}

#[repr(C)]
pub struct DynamicMethodDesc {
    pub method_desc: MethodDesc,
    pub method_name: *const c_char,
    pub resolver: *const c_void,
}

#[repr(C)]
pub struct Object {
    pub method_table: *const MethodTable,
}

#[repr(C)]
pub struct StringObject {
    pub object: Object,
    pub string_length: u32,
    pub first_char: u16,
}

#[repr(C)]
pub struct ArrayBase {
    pub object: Object,
    pub num_components: u32,
}

#[repr(C)]
pub struct ExceptionObject {
    pub object: Object,
    pub message: *const StringObject,
    pub inner_exception: *const ExceptionObject,
    pub stack_trace: *const c_void,
}

pub static THREAD_STORE: AtomicPtr<ThreadStore> = AtomicPtr::new(std::ptr::null_mut());
pub static FREE_OBJECT_METHOD_TABLE: AtomicPtr<MethodTable> =
    AtomicPtr::new(std::ptr::null_mut());

/// Method table pointer plus sync block plus one component slot.
pub const MIN_OBJECT_SIZE: u32 = (3 * size_of::<usize>()) as u32;
pub const METHOD_TABLE_UNION_MASK: u32 = 0x3;

pub fn register_sample(r: &mut Registrar) -> Result<(), Error> {
    r.global(c"ThreadStore::s_pThreadStore", &THREAD_STORE)?;
    let thread_store = r.type_of::<ThreadStore>(c"ThreadStore")?;
    r.field(thread_store, c"m_ThreadList", offset_of!(ThreadStore, thread_list))?;
    r.field(thread_store, c"m_ThreadCount", offset_of!(ThreadStore, thread_count))?;

    let thread = r.type_of::<Thread>(c"Thread")?;
    r.field(thread, c"m_Link", offset_of!(Thread, link))?;
    r.field(thread, c"m_ThreadId", offset_of!(Thread, thread_id))?;
    r.field(thread, c"m_OSThreadId", offset_of!(Thread, os_thread_id))?;
    r.field(
        thread,
        c"m_LastThrownObjectHandle",
        offset_of!(Thread, last_thrown_object_handle),
    )?;
    r.field(thread, c"m_alloc_context", offset_of!(Thread, alloc_context))?;

    let alloc_context = r.type_of::<AllocContext>(c"gc_alloc_context")?;
    r.field(alloc_context, c"alloc_ptr", offset_of!(AllocContext, alloc_ptr))?;
    r.field(alloc_context, c"alloc_limit", offset_of!(AllocContext, alloc_limit))?;
    r.field(alloc_context, c"alloc_bytes", offset_of!(AllocContext, alloc_bytes))?;
    r.field(alloc_context, c"alloc_bytes_uoh", offset_of!(AllocContext, alloc_bytes_uoh))?;
    r.field(alloc_context, c"alloc_count", offset_of!(AllocContext, alloc_count))?;

    let method_table = r.type_of::<MethodTable>(c"MethodTable")?;
    r.field(method_table, c"m_dwFlags", offset_of!(MethodTable, flags))?;
    r.field(method_table, c"m_BaseSize", offset_of!(MethodTable, base_size))?;
    r.field(method_table, c"m_wFlags2", offset_of!(MethodTable, flags2))?;
    r.field(method_table, c"m_wToken", offset_of!(MethodTable, token))?;
    r.field(method_table, c"m_wNumVirtuals", offset_of!(MethodTable, num_virtuals))?;
    r.field(method_table, c"m_wNumInterfaces", offset_of!(MethodTable, num_interfaces))?;
    r.field(method_table, c"m_pParentMethodTable", offset_of!(MethodTable, parent))?;
    r.field(method_table, c"m_pLoaderModule", offset_of!(MethodTable, loader_module))?;

    let method_desc = r.type_of::<MethodDesc>(c"MethodDesc")?;
    r.field(method_desc, c"m_chunkIndex", offset_of!(MethodDesc, chunk_index))?;
    r.field(method_desc, c"m_bFlags2", offset_of!(MethodDesc, flags2))?;
    r.field(method_desc, c"m_wSlotNumber", offset_of!(MethodDesc, slot_number))?;
    r.field(method_desc, c"m_wFlags", offset_of!(MethodDesc, flags))?;
    r.field(
        method_desc,
        c"m_wFlags3AndTokenRemainder",
        offset_of!(MethodDesc, flags3_and_token_remainder),
    )?;

    let fcall = r.type_of::<FCallMethodDesc>(c"FCallMethodDesc")?;
    r.base_from_member(
        fcall,
        c"MethodDesc",
        offset_of!(FCallMethodDesc, method_desc.chunk_index),
        offset_of!(MethodDesc, chunk_index),
    )?;

    let dynamic = r.type_of::<DynamicMethodDesc>(c"DynamicMethodDesc")?;
    r.base_from_member(
        dynamic,
        c"MethodDesc",
        offset_of!(DynamicMethodDesc, method_desc.chunk_index),
        offset_of!(MethodDesc, chunk_index),
    )?;

    let object = r.type_of::<Object>(c"Object")?;
    r.field(object, c"m_pMethTab", offset_of!(Object, method_table))?;

    let exception = r.type_of::<ExceptionObject>(c"ExceptionObject")?;
    r.base_from_member(
        exception,
        c"Object",
        offset_of!(ExceptionObject, object.method_table),
        offset_of!(Object, method_table),
    )?;
    r.field(exception, c"_message", offset_of!(ExceptionObject, message))?;
    r.field(exception, c"_innerException", offset_of!(ExceptionObject, inner_exception))?;
    r.field(exception, c"_stackTrace", offset_of!(ExceptionObject, stack_trace))?;

    let string = r.type_of::<StringObject>(c"StringObject")?;
    r.base_from_member(
        string,
        c"Object",
        offset_of!(StringObject, object.method_table),
        offset_of!(Object, method_table),
    )?;
    r.field(string, c"m_StringLength", offset_of!(StringObject, string_length))?;
    r.field(string, c"m_FirstChar", offset_of!(StringObject, first_char))?;

    let array = r.type_of::<ArrayBase>(c"ArrayBase")?;
    r.base_from_member(
        array,
        c"Object",
        offset_of!(ArrayBase, object.method_table),
        offset_of!(Object, method_table),
    )?;
    r.field(array, c"m_NumComponents", offset_of!(ArrayBase, num_components))?;

    r.global(c"g_pFreeObjectMethodTable", &FREE_OBJECT_METHOD_TABLE)?;

    r.define(c"MinObjectSize", MIN_OBJECT_SIZE)?;
    r.define(c"UNION_METHODTABLE", METHOD_TABLE_UNION_MASK)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{
        FREE_OBJECT_METHOD_TABLE, MIN_OBJECT_SIZE, StringObject, THREAD_STORE, Thread,
        register_sample,
    };
    use crate::core::error::ErrorKind;
    use crate::core::layout::TableKind;
    use crate::core::registrar::Registrar;
    use crate::core::table::Capacities;
    use std::mem::{offset_of, size_of};

    fn build() -> crate::core::header::Catalog {
        let mut registrar = Registrar::new();
        register_sample(&mut registrar).expect("register");
        registrar.finalize().expect("finalize")
    }

    #[test]
    fn sample_sequence_fits_default_capacities() {
        let catalog = build();
        let counts: Vec<_> = catalog.directory().iter().map(|e| e.row_count()).collect();
        assert_eq!(counts, [2, 11, 32, 5, 2]);
    }

    #[test]
    fn every_member_row_references_an_earlier_type() {
        let catalog = build();
        let types = catalog.types().len() as u32;
        for row in catalog.fields().iter().chain(catalog.bases()) {
            assert!(row.type_id().index() < types, "{:?}", row.name());
        }
    }

    #[test]
    fn recorded_sizes_and_offsets_match_rust_layout() {
        let catalog = build();
        let thread = catalog
            .types()
            .iter()
            .position(|row| row.name() == c"Thread")
            .expect("thread type");
        assert_eq!(catalog.types()[thread].size() as usize, size_of::<Thread>());

        let string = catalog
            .types()
            .iter()
            .position(|row| row.name() == c"StringObject")
            .expect("string type") as u32;
        let length = catalog
            .fields()
            .iter()
            .find(|row| row.type_id().index() == string && row.name() == c"m_StringLength")
            .expect("length field");
        assert_eq!(length.offset() as usize, offset_of!(StringObject, string_length));
    }

    #[test]
    fn embedded_bases_start_at_zero() {
        let catalog = build();
        assert!(catalog.bases().iter().all(|row| row.offset() == 0));
    }

    #[test]
    fn globals_record_static_addresses() {
        let catalog = build();
        let addresses: Vec<_> = catalog.globals().iter().map(|row| row.address()).collect();
        assert_eq!(
            addresses,
            [
                &THREAD_STORE as *const _ as usize,
                &FREE_OBJECT_METHOD_TABLE as *const _ as usize,
            ]
        );
    }

    #[test]
    fn defines_carry_runtime_values() {
        let catalog = build();
        assert_eq!(catalog.defines()[0].name(), c"MinObjectSize");
        assert_eq!(catalog.defines()[0].value(), MIN_OBJECT_SIZE);
    }

    #[test]
    fn undersized_field_table_stops_the_pass() {
        let capacities = Capacities {
            fields: 4,
            ..Capacities::default()
        };
        let mut registrar = Registrar::with_capacities(capacities);
        let err = register_sample(&mut registrar).expect_err("overflow");
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(err.table(), Some(TableKind::Field));
        assert!(registrar.finalize().is_err());
    }
}
