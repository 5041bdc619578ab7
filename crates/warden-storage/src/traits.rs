//! Storage trait definitions.

use crate::errors::Result;
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

/// Exclusive hold on a logical row, released on drop
pub type RowGuard = tokio::sync::OwnedMutexGuard<()>;

/// Typed key-value access over named column families.
///
/// Keys and values are bincode-encoded. Services are generic over this trait
/// and only the binary picks RocksDB.
#[async_trait]
pub trait Storage: Send + Sync {
    /// `Ok(None)` when `key` is absent
    async fn get<K, V>(&self, cf: &str, key: &K) -> Result<Option<V>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Single-key write outside any batch
    async fn put<K, V>(&self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize + Send + Sync,
        V: Serialize + Send + Sync;

    async fn delete<K>(&self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize + Send + Sync;

    /// Presence check without decoding the value
    async fn exists<K>(&self, cf: &str, key: &K) -> Result<bool>
    where
        K: Serialize + Send + Sync;

    /// Entries whose encoded key starts with the encoded `prefix`, in key order
    async fn get_by_prefix<K, V>(&self, cf: &str, prefix: &K) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Iterate forward from `start` (inclusive), returning at most `limit` entries
    async fn scan_from<K, V>(&self, cf: &str, start: &K, limit: usize) -> Result<Vec<(Vec<u8>, V)>>
    where
        K: Serialize + Send + Sync,
        V: DeserializeOwned;

    /// Read every entry of a column family
    async fn scan_all<V>(&self, cf: &str) -> Result<Vec<(Vec<u8>, V)>>
    where
        V: DeserializeOwned;

    /// Start a write batch; nothing is visible until `commit`
    fn batch(&self) -> Box<dyn Batch>;

    /// Take the exclusive lock for a logical row.
    ///
    /// Callers that read a record, check a condition and write it back hold
    /// the guard across the whole sequence; a second caller for the same
    /// `row` waits until the first guard drops.
    async fn lock(&self, row: &str) -> RowGuard;
}

/// Atomic group of writes.
///
/// Raw bytes keep the trait object safe; [`BatchExt`] adds the typed calls.
#[async_trait]
pub trait Batch: Send {
    fn put_raw(&mut self, cf: &str, key: Vec<u8>, value: Vec<u8>) -> Result<()>;

    fn delete_raw(&mut self, cf: &str, key: Vec<u8>) -> Result<()>;

    /// Apply every staged write or none
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Discard the staged writes
    fn rollback(self: Box<Self>);
}

/// Typed staging on top of [`Batch`]
pub trait BatchExt: Batch {
    fn put<K, V>(&mut self, cf: &str, key: &K, value: &V) -> Result<()>
    where
        K: Serialize,
        V: Serialize,
    {
        self.put_raw(cf, serialize_key(key)?, serialize_value(value)?)
    }

    fn delete<K>(&mut self, cf: &str, key: &K) -> Result<()>
    where
        K: Serialize,
    {
        self.delete_raw(cf, serialize_key(key)?)
    }
}

impl<T: Batch + ?Sized> BatchExt for T {}

pub(crate) fn serialize_key<K: Serialize + ?Sized>(key: &K) -> Result<Vec<u8>> {
    bincode::serialize(key).map_err(|e| crate::errors::StorageError::Serialization(e.to_string()))
}

pub(crate) fn serialize_value<V: Serialize + ?Sized>(value: &V) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| crate::errors::StorageError::Serialization(e.to_string()))
}

pub(crate) fn deserialize_value<V: DeserializeOwned>(bytes: &[u8]) -> Result<V> {
    bincode::deserialize(bytes)
        .map_err(|e| crate::errors::StorageError::Deserialization(e.to_string()))
}
