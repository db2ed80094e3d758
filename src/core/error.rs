use std::error::Error as StdError;
use std::fmt;

use crate::core::layout::TableKind;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorKind {
    Internal,
    Usage,
    CapacityExceeded,
    OrderingViolation,
    Overflow,
    AlreadyPublished,
    CookieMismatch,
    VersionMismatch,
    Corrupt,
    PathResolution,
    Io,
}

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
    message: Option<String>,
    hint: Option<String>,
    table: Option<TableKind>,
    address: Option<u64>,
    source: Option<Box<dyn StdError + Send + Sync>>,
}

impl Error {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
            hint: None,
            table: None,
            address: None,
            source: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn hint(&self) -> Option<&str> {
        self.hint.as_deref()
    }

    pub fn table(&self) -> Option<TableKind> {
        self.table
    }

    pub fn address(&self) -> Option<u64> {
        self.address
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_table(mut self, table: TableKind) -> Self {
        self.table = Some(table);
        self
    }

    pub fn with_address(mut self, address: u64) -> Self {
        self.address = Some(address);
        self
    }

    pub fn with_source(mut self, source: impl StdError + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Copies kind, message, and table without the boxed source.
    pub(crate) fn detached(&self) -> Self {
        Self {
            kind: self.kind,
            message: self.message.clone(),
            hint: self.hint.clone(),
            table: self.table,
            address: self.address,
            source: None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.kind)?;
        if let Some(message) = &self.message {
            write!(f, ": {message}")?;
        }
        if let Some(table) = self.table {
            write!(f, " (table: {})", table.name())?;
        }
        if let Some(address) = self.address {
            write!(f, " (address: {address:#x})")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn StdError + 'static))
    }
}

pub fn to_exit_code(kind: ErrorKind) -> i32 {
    match kind {
        ErrorKind::Internal => 1,
        ErrorKind::Usage => 2,
        ErrorKind::CapacityExceeded => 3,
        ErrorKind::OrderingViolation => 4,
        ErrorKind::Overflow => 5,
        ErrorKind::AlreadyPublished => 6,
        ErrorKind::CookieMismatch => 7,
        ErrorKind::VersionMismatch => 8,
        ErrorKind::Corrupt => 9,
        ErrorKind::PathResolution => 10,
        ErrorKind::Io => 11,
    }
}
