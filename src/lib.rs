//! Purpose: Library crate for reading and writing xBase/FoxPro table files.
//! Exports: `api` (stable public surface).
//! Role: Public API boundary with private codec and storage modules.
//! Invariants: Additive-only changes to `api`; internal modules remain private.
//! Invariants: Core modules prefer explicit inputs/outputs over hidden state.
pub mod api;
mod core;
