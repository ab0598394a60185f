//! Persistence for docview
//!
//! One [`Store`] trait, two backends: Postgres for production and an
//! in-memory implementation for tests and the `memory://` database URL.
//! Every write that participates in engine independence is a single-row
//! operation; the composite uniqueness of `(document_id, view)` and the
//! per-document uniqueness of intermediates are contracts of the trait.

pub mod memory;
pub mod postgres;
pub mod store;

pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use store::{HistoryFilter, HistoryPage, Store};

/// Error types for persistence operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt row: {0}")]
    CorruptRow(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
