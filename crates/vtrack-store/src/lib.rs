//! Task record persistence.
//!
//! This crate provides:
//! - The [`TaskStore`] trait (last-write-wins, time-expiring records)
//! - A Redis implementation (`SET .. EX`) and an in-memory one
//! - Status watching as a polled stream
//! - Optional submission fingerprint dedup

pub mod config;
pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;
pub mod watch;

pub use config::{StoreBackend, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use memory::MemoryTaskStore;
pub use redis_store::RedisTaskStore;
pub use store::{build_store, submission_fingerprint, TaskStore};
pub use watch::{watch_task, WatchConfig};
