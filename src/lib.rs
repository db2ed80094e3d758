//! Purpose: Self-describing debug header that out-of-process tools use to interpret runtime memory.
//! Exports: `api` (public surface), `core` (schemas, registrar, header), `runtime` (exported
//!   symbol and population pass), `sample` (demo runtime layout), `abi` (C entry points).
//! Role: Library backing the `rtdebug` CLI and any runtime that embeds the header.
//! Invariants: The header is built in one pass, published once, and never mutated afterwards.
//! Invariants: Tables are bounds-checked in every build profile; overflow stops the pass.
pub mod abi;
pub mod api;
pub mod core;
pub mod runtime;
pub mod sample;
