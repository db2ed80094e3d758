//! Purpose: Centralize the debug header identity, versioning, and compatibility policy.
//! Exports: `COOKIE`, `MAJOR_VERSION`, `MINOR_VERSION`, `HEADER_SYMBOL`, `version_error`.
//! Role: Shared contract between the producer (registrar/header) and consumers (reader/CLI).
//! Invariants: Bump `MAJOR_VERSION` for any layout-breaking change: removing, reordering, or
//!   retyping a header/row field, retyping a structure whose offsets are recorded, or changing
//!   what a recorded global/offset/constant means.
//! Invariants: Purely additive changes bump only `MINOR_VERSION`.

use crate::core::error::{Error, ErrorKind};

/// Space followed by "CDH".
pub const COOKIE: [u8; 4] = [0x20, 0x43, 0x44, 0x48];
pub const MAJOR_VERSION: u16 = 2;
pub const MINOR_VERSION: u16 = 0;

/// Exported data symbol consumers look up in the module image.
pub const HEADER_SYMBOL: &str = "RuntimeDebugHeader";

/// Number of row categories; also the published table count.
pub const TABLE_COUNT: u32 = 5;

pub fn cookie_error(found: [u8; 4]) -> Error {
    Error::new(ErrorKind::CookieMismatch)
        .with_message(format!(
            "unexpected cookie {found:02x?} (expected {COOKIE:02x?})"
        ))
        .with_hint("The address does not point at a runtime debug header.")
}

pub fn version_error(major: u16, minor: u16) -> Error {
    Error::new(ErrorKind::VersionMismatch)
        .with_message(format!(
            "unsupported debug header version {major}.{minor} (supported major: {MAJOR_VERSION})"
        ))
        .with_hint("Use a reader built for this header major version.")
}
