//! Storage layer for strata-session
//!
//! This crate implements the in-process versioned backend:
//! - ShardedStore: DashMap-sharded record histories with compare-and-set
//! - MemoryBackend: the `Backend` implementation over ShardedStore, with
//!   request counters and fault injection for tests

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod sharded;

pub use memory::{BackendStats, MemoryBackend};
pub use sharded::{KeyHistory, Revision, Shard, ShardedStore};
