// Core modules: row schemas, bounded storage, the registrar, and the published header.
pub mod error;
pub mod exe_path;
pub mod format;
pub mod header;
pub mod layout;
pub mod registrar;
pub mod table;
