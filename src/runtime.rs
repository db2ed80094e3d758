//! Purpose: Own the process-wide exported debug header and its one-shot population pass.
//! Exports: `RuntimeDebugHeader`, `header`, `populate`, `populate_with`.
//! Role: The only place where a finished `Catalog` becomes shared, process-lifetime state.
//! Invariants: `RuntimeDebugHeader` is exported unmangled so readers find it by symbol lookup.
//! Invariants: Population succeeds at most once; a failed pass leaves the table count at 0.
use std::sync::OnceLock;

use crate::core::error::{Error, ErrorKind};
use crate::core::format::HEADER_SYMBOL;
use crate::core::header::{Catalog, DebugHeader};
use crate::core::registrar::Registrar;
use crate::core::table::Capacities;

#[allow(non_upper_case_globals)]
#[unsafe(no_mangle)]
pub static RuntimeDebugHeader: DebugHeader = DebugHeader::new();

static CATALOG: OnceLock<Catalog> = OnceLock::new();

pub fn header() -> &'static DebugHeader {
    &RuntimeDebugHeader
}

pub fn populate(
    register: impl FnOnce(&mut Registrar) -> Result<(), Error>,
) -> Result<&'static DebugHeader, Error> {
    populate_with(Capacities::default(), register)
}

/// Runs one builder pass, then publishes the result into `RuntimeDebugHeader`.
pub fn populate_with(
    capacities: Capacities,
    register: impl FnOnce(&mut Registrar) -> Result<(), Error>,
) -> Result<&'static DebugHeader, Error> {
    if CATALOG.get().is_some() {
        return Err(already_published());
    }
    let mut registrar = Registrar::with_capacities(capacities);
    register(&mut registrar)?;
    let catalog = registrar.finalize()?;

    CATALOG.set(catalog).map_err(|_| already_published())?;
    let catalog = CATALOG.get().ok_or_else(|| {
        Error::new(ErrorKind::Internal).with_message("catalog vanished after set")
    })?;
    RuntimeDebugHeader.publish(catalog)?;
    tracing::debug!(symbol = HEADER_SYMBOL, "runtime debug header populated");
    Ok(&RuntimeDebugHeader)
}

fn already_published() -> Error {
    Error::new(ErrorKind::AlreadyPublished)
        .with_message(format!("{HEADER_SYMBOL} is already populated"))
        .with_address(RuntimeDebugHeader.address() as u64)
}
