//! Storage layer for vecmeta
//!
//! This crate implements the in-memory append-only store:
//! - MemoryStore: one DashMap-backed table per resource kind
//! - Per-kind atomic id allocation
//! - Replay hooks used by the durable store to rebuild state from its log
//!
//! # Performance
//!
//! - get(): lock-free via DashMap shard read
//! - put(): only locks the target shard of one kind
//! - Different kinds never contend

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;

pub use memory::MemoryStore;
