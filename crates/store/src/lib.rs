//! Event and session persistence.
//!
//! The [`BehaviorStore`] trait is the seam between the pipeline and its
//! storage backend. [`ClickHouseStore`] is the production backend;
//! [`MemoryStore`] backs tests and single-instance deployments without a
//! ClickHouse cluster.

pub mod cache;
pub mod client;
pub mod clickhouse_store;
pub mod config;
pub mod export;
pub mod memory;
pub mod schema;
pub mod store;

pub use cache::SessionCache;
pub use client::ClickHouseClient;
pub use clickhouse_store::ClickHouseStore;
pub use config::StoreConfig;
pub use export::events_to_csv;
pub use memory::MemoryStore;
pub use schema::init_schema;
pub use store::BehaviorStore;
