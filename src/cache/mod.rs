//! In-memory TTL caching for resolved persona configuration.

pub mod config;
mod lock;
pub mod store;

pub use config::CacheConfig;
pub use store::{CacheRead, CacheStore, Freshness, FreshnessSource};
