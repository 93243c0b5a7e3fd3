//! Key-value storage for preview records and fetch locks.
//!
//! The preview service only talks to the `KvStore` trait; this module
//! provides two implementations of it:
//!
//! - `CacheDb`: SQLite with async access via tokio-rusqlite, WAL mode,
//!   versioned migrations. Shared by every process pointed at the same file.
//! - `MemoryStore`: a process-local map, used by tests and one-shot runs.
//!
//! Both expire entries lazily on read and treat an expired key as absent
//! for `set_if_absent`, which is what lets a dead lock holder's lock lapse.

pub mod connection;
pub mod hash;
pub mod kv;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use hash::{LOCK_PREFIX, PREVIEW_PREFIX, lock_key, preview_key};
pub use memory::MemoryStore;
pub use store::KvStore;
