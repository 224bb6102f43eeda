//! Core of the dalbench data-access benchmark.
//!
//! This crate holds everything that does not touch a database driver:
//!
//! - **Model**: the three aggregate shapes (`Post`, `Invoice`, `BankScrape`)
//! - **Factory**: deterministic synthetic data derived from an index and a [`Clock`]
//! - **Bench**: the capability trait every persistence adapter implements
//! - **Report**: the six-way report read and its reference semantics
//! - **Relational**: reconciliation, graph reconstruction and statement text
//!   shared by the SQL adapters
//! - **Protocol**: the correctness pass followed by the timed throughput pass

pub mod bench;
pub mod clock;
pub mod config;
pub mod error;
pub mod factory;
pub mod model;
pub mod protocol;
pub mod relational;
pub mod report;
pub mod timing;

pub use bench::{Bench, Query, QuerySource};
pub use clock::Clock;
pub use config::{BenchConfig, Repetitions};
pub use error::{BoxError, Error, Result};
pub use factory::Synthetic;
pub use model::{
    Account, Aggregate, BankScrape, Currency, Invoice, Item, Post, Transaction, Window,
};
pub use protocol::{run_benchmark, BLOCKS};
pub use report::{Report, ReportKeys, ReportRequest, Slot};
pub use timing::{LineSink, TimingSink, Timings};
