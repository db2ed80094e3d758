//! Purpose: Single-pass, bounds-checked builder for the debug tables.
//! Exports: `Registrar`.
//! Role: Owns the five bounded row tables until `finalize` freezes them into a `Catalog`.
//! Invariants: A type is registered before any Field/Base row that references it.
//! Invariants: `TypeId`s are assigned 0, 1, 2, ... in registration order and never reused.
//! Invariants: The first failure poisons the builder; later calls and `finalize` return it,
//!   so a truncated catalog can never be produced.
use std::ffi::{CStr, c_void};

use crate::core::error::{Error, ErrorKind};
use crate::core::header::Catalog;
use crate::core::layout::{
    DefineRow, GlobalRow, MemberOffsetRow, TableKind, TypeId, TypeRow,
};
use crate::core::table::{BoundedTable, Capacities};

#[derive(Debug)]
pub struct Registrar {
    globals: BoundedTable<GlobalRow>,
    types: BoundedTable<TypeRow>,
    fields: BoundedTable<MemberOffsetRow>,
    bases: BoundedTable<MemberOffsetRow>,
    defines: BoundedTable<DefineRow>,
    fault: Option<Error>,
}

impl Default for Registrar {
    fn default() -> Self {
        Self::new()
    }
}

impl Registrar {
    pub fn new() -> Self {
        Self::with_capacities(Capacities::default())
    }

    pub fn with_capacities(capacities: Capacities) -> Self {
        Self {
            globals: BoundedTable::new(TableKind::Global, capacities.globals),
            types: BoundedTable::new(TableKind::Type, capacities.types),
            fields: BoundedTable::new(TableKind::Field, capacities.fields),
            bases: BoundedTable::new(TableKind::Base, capacities.bases),
            defines: BoundedTable::new(TableKind::Define, capacities.defines),
            fault: None,
        }
    }

    /// Records the address of a process-wide variable.
    pub fn global<T: ?Sized>(&mut self, name: &'static CStr, address: *const T) -> Result<(), Error> {
        self.check()?;
        let row = GlobalRow::new(name, address.cast::<c_void>());
        let pushed = self.globals.push(row);
        self.settle(pushed)?;
        tracing::trace!(name = ?name, "registered global");
        Ok(())
    }

    /// Records a type's name and byte size; the returned id is its row index.
    pub fn register_type(&mut self, name: &'static CStr, size: usize) -> Result<TypeId, Error> {
        self.check()?;
        let size = self.narrow(size, TableKind::Type, "type size")?;
        let pushed = self.types.push(TypeRow::new(name, size));
        let index = self.settle(pushed)?;
        tracing::trace!(name = ?name, size, type_id = index, "registered type");
        Ok(TypeId(index as u32))
    }

    pub fn type_of<T>(&mut self, name: &'static CStr) -> Result<TypeId, Error> {
        self.register_type(name, std::mem::size_of::<T>())
    }

    /// Records the byte offset of `name` within the type `type_id`.
    pub fn field(&mut self, type_id: TypeId, name: &'static CStr, offset: usize) -> Result<(), Error> {
        self.check()?;
        self.known(type_id, TableKind::Field)?;
        let offset = self.narrow(offset, TableKind::Field, "field offset")?;
        let pushed = self.fields.push(MemberOffsetRow::new(name, type_id, offset));
        self.settle(pushed)?;
        tracing::trace!(name = ?name, type_id = type_id.0, offset, "registered field");
        Ok(())
    }

    /// Records where the `base_name` sub-object starts within the type `type_id`.
    pub fn base(&mut self, type_id: TypeId, base_name: &'static CStr, offset: usize) -> Result<(), Error> {
        self.check()?;
        self.known(type_id, TableKind::Base)?;
        let offset = self.narrow(offset, TableKind::Base, "base offset")?;
        let pushed = self.bases.push(MemberOffsetRow::new(base_name, type_id, offset));
        self.settle(pushed)?;
        tracing::trace!(name = ?base_name, type_id = type_id.0, offset, "registered base");
        Ok(())
    }

    /// Derives the base offset from one member shared by both types:
    /// its offset in the derived type minus its offset in the base type.
    pub fn base_from_member(
        &mut self,
        type_id: TypeId,
        base_name: &'static CStr,
        derived_member_offset: usize,
        base_member_offset: usize,
    ) -> Result<(), Error> {
        self.check()?;
        let Some(offset) = derived_member_offset.checked_sub(base_member_offset) else {
            let err = Error::new(ErrorKind::Overflow)
                .with_message(format!(
                    "member sits at {derived_member_offset} in the derived type but \
                     {base_member_offset} in the base type"
                ))
                .with_table(TableKind::Base);
            return Err(self.poison(err));
        };
        self.base(type_id, base_name, offset)
    }

    /// Records a named compile-time constant.
    pub fn define(&mut self, name: &'static CStr, value: u32) -> Result<(), Error> {
        self.check()?;
        let pushed = self.defines.push(DefineRow::new(name, value));
        self.settle(pushed)?;
        tracing::trace!(name = ?name, value, "registered define");
        Ok(())
    }

    pub fn len(&self, kind: TableKind) -> usize {
        match kind {
            TableKind::Global => self.globals.len(),
            TableKind::Type => self.types.len(),
            TableKind::Field => self.fields.len(),
            TableKind::Base => self.bases.len(),
            TableKind::Define => self.defines.len(),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.fault.is_some()
    }

    /// Freezes the tables and builds the directory in {Global, Type, Field, Base, Define} order.
    pub fn finalize(self) -> Result<Catalog, Error> {
        if let Some(fault) = self.fault {
            return Err(fault);
        }
        let catalog = Catalog::assemble(
            self.globals.into_rows(),
            self.types.into_rows(),
            self.fields.into_rows(),
            self.bases.into_rows(),
            self.defines.into_rows(),
        );
        tracing::debug!(
            globals = catalog.globals().len(),
            types = catalog.types().len(),
            fields = catalog.fields().len(),
            bases = catalog.bases().len(),
            defines = catalog.defines().len(),
            "debug tables finalized"
        );
        Ok(catalog)
    }

    fn check(&self) -> Result<(), Error> {
        match &self.fault {
            Some(fault) => Err(fault.detached()),
            None => Ok(()),
        }
    }

    fn known(&mut self, type_id: TypeId, table: TableKind) -> Result<(), Error> {
        let registered = self.types.len();
        if (type_id.0 as usize) < registered {
            return Ok(());
        }
        let err = Error::new(ErrorKind::OrderingViolation)
            .with_message(format!(
                "type id {} referenced before registration ({registered} types registered)",
                type_id.0
            ))
            .with_table(table)
            .with_hint("Register the type before its fields and bases.");
        Err(self.poison(err))
    }

    fn narrow(&mut self, value: usize, table: TableKind, what: &str) -> Result<u32, Error> {
        match u32::try_from(value) {
            Ok(value) => Ok(value),
            Err(source) => {
                let err = Error::new(ErrorKind::Overflow)
                    .with_message(format!("{what} {value} does not fit in u32"))
                    .with_table(table)
                    .with_source(source);
                Err(self.poison(err))
            }
        }
    }

    fn settle(&mut self, pushed: Result<usize, Error>) -> Result<usize, Error> {
        pushed.map_err(|err| {
            tracing::error!(error = %err, "debug table overflow");
            self.poison(err)
        })
    }

    fn poison(&mut self, err: Error) -> Error {
        let returned = err.detached();
        self.fault.get_or_insert(err);
        returned
    }
}
