//! Core types and shared functionality for linkpeek.
//!
//! This crate provides:
//! - The `KvStore` abstraction with SQLite and in-memory backends
//! - Preview records and cache key hashing
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;
pub mod preview;

pub use cache::{CacheDb, KvStore, MemoryStore};
pub use config::{AppConfig, ConfigError, FetchStrategy};
pub use error::Error;
pub use preview::PreviewRecord;
