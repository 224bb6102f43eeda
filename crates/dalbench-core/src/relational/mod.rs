//! Engine-independent pieces of the relational adapters.
//!
//! - [`reconcile`]: diff-based child row changes for updates
//! - [`hydrate`]: graph reconstruction from flat row streams
//! - [`sql`]: table layouts and statement text

pub mod hydrate;
pub mod reconcile;
pub mod sql;

pub use hydrate::{assemble_invoices, assemble_scrapes, ChildRow, GrandchildRow, GraphBuilder};
pub use reconcile::{
    reconcile_invoices, reconcile_scrapes, AccountRow, ChangeSet, ChildPlan, ItemChanges,
    ItemRow, ScrapeChanges, StoredScrapes, TransactionRow, Truncate,
};
pub use sql::{Dialect, Filter, Layout};
