//! Integration tests for the catalog facade.
//!
//! These tests drive the `vecmeta` crate the way an embedding server would:
//! open a data directory, publish operations, close and reopen. Unit and
//! crate-level tests under crates/ cover each layer in isolation; these
//! cover the guarantees that only show up across a full open/close cycle.

#[path = "../common/mod.rs"]
mod common;

mod config;
mod crash_recovery;
mod lifecycle;
