// Fixed-capacity backing arrays, one per row category.
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, ErrorKind};
use crate::core::layout::TableKind;

/// Per-table row ceilings. Sized for the known registration sequence; a hard limit.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Capacities {
    pub globals: usize,
    pub types: usize,
    pub fields: usize,
    pub bases: usize,
    pub defines: usize,
}

impl Default for Capacities {
    fn default() -> Self {
        Self {
            globals: 50,
            types: 100,
            fields: 200,
            bases: 100,
            defines: 50,
        }
    }
}

impl Capacities {
    pub fn get(&self, kind: TableKind) -> usize {
        match kind {
            TableKind::Global => self.globals,
            TableKind::Type => self.types,
            TableKind::Field => self.fields,
            TableKind::Base => self.bases,
            TableKind::Define => self.defines,
        }
    }
}

/// Contiguous storage allocated once; `push` never reallocates, so row
/// addresses stay valid for the lifetime of the table.
#[derive(Debug)]
pub struct BoundedTable<R> {
    kind: TableKind,
    rows: Vec<R>,
    capacity: usize,
}

impl<R> BoundedTable<R> {
    pub fn new(kind: TableKind, capacity: usize) -> Self {
        Self {
            kind,
            rows: Vec::with_capacity(capacity),
            capacity,
        }
    }

    pub fn kind(&self) -> TableKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Appends a row and returns its index.
    pub fn push(&mut self, row: R) -> Result<usize, Error> {
        let index = self.rows.len();
        if index >= self.capacity {
            return Err(Error::new(ErrorKind::CapacityExceeded)
                .with_message(format!(
                    "table holds at most {} rows",
                    self.capacity
                ))
                .with_table(self.kind)
                .with_hint("Raise the table capacity to match the registration sequence."));
        }
        self.rows.push(row);
        Ok(index)
    }

    pub fn rows(&self) -> &[R] {
        &self.rows
    }

    pub(crate) fn into_rows(self) -> Vec<R> {
        self.rows
    }
}

#[cfg(test)]
mod tests {
    use super::{BoundedTable, Capacities};
    use crate::core::error::ErrorKind;
    use crate::core::layout::TableKind;

    #[test]
    fn default_capacities_match_known_sequence_sizes() {
        let caps = Capacities::default();
        assert_eq!(caps.get(TableKind::Global), 50);
        assert_eq!(caps.get(TableKind::Type), 100);
        assert_eq!(caps.get(TableKind::Field), 200);
        assert_eq!(caps.get(TableKind::Base), 100);
        assert_eq!(caps.get(TableKind::Define), 50);
    }

    #[test]
    fn capacities_fill_missing_keys_from_defaults() {
        let caps: Capacities = serde_json::from_str(r#"{"globals": 2}"#).expect("parse");
        assert_eq!(caps.globals, 2);
        assert_eq!(caps.fields, 200);
        assert!(serde_json::from_str::<Capacities>(r#"{"rows": 2}"#).is_err());
    }

    #[test]
    fn push_returns_sequential_indexes() {
        let mut table = BoundedTable::new(TableKind::Define, 3);
        assert_eq!(table.push(10u32).unwrap(), 0);
        assert_eq!(table.push(20u32).unwrap(), 1);
        assert_eq!(table.rows(), &[10, 20]);
    }

    #[test]
    fn push_past_capacity_fails_without_writing() {
        let mut table = BoundedTable::new(TableKind::Global, 1);
        table.push(1u8).expect("first row");
        let base = table.rows().as_ptr();

        let err = table.push(2u8).expect_err("should overflow");
        assert_eq!(err.kind(), ErrorKind::CapacityExceeded);
        assert_eq!(err.table(), Some(TableKind::Global));
        assert_eq!(table.rows(), &[1]);
        assert_eq!(table.rows().as_ptr(), base);
    }

    #[test]
    fn zero_capacity_rejects_everything() {
        let mut table = BoundedTable::new(TableKind::Base, 0);
        assert!(table.is_empty());
        assert!(table.push(()).is_err());
        assert_eq!(table.len(), 0);
    }
}
