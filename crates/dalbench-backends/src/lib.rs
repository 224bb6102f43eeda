//! Persistence adapters benchmarked by dalbench.
//!
//! Every adapter implements [`dalbench_core::Bench`] for the shapes it
//! supports:
//!
//! - **Memory**: document store keeping each aggregate as one JSON value;
//!   also offers the composable query surface
//! - **SQLite**: hand-written relational mapping over rusqlite
//! - **PostgreSQL**: the same mapping over sqlx (feature `postgres`)

pub mod config;
pub mod error;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod sqlite;

pub use config::ConnectionConfig;
pub use error::{BackendError, Result};
pub use memory::MemoryBackend;
#[cfg(feature = "postgres")]
pub use postgres::{PgShape, PostgresBackend};
pub use sqlite::{SqliteBackend, SqliteShape};
