//! # warden-storage
//!
//! Storage abstraction layer for warden using RocksDB.
//!
//! Every logical table is a column family. Multi-key writes go through
//! [`Batch`]; read-check-write sequences that must not interleave take a
//! row lock with [`Storage::lock`] first.

#![warn(clippy::all)]

pub mod column_families;
pub mod errors;
pub mod keys;
pub mod rocksdb_impl;
pub mod traits;

pub use column_families::*;
pub use errors::{Result, StorageError};
pub use keys::{child_id_from_key, child_key, sequence_key, ChildKey, SequenceKey};
pub use rocksdb_impl::RocksDbStorage;
pub use traits::{Batch, BatchExt, RowGuard, Storage};
