//! PostgreSQL backend.
//!
//! Hand-written relational mapping over one long-lived sqlx connection,
//! driven from the synchronous harness through a private tokio runtime.
//! Requires a running PostgreSQL instance; enable with `--features postgres`.

mod complex;
mod simple;
mod standard;

use dalbench_core::relational::sql::{self, Table};
use dalbench_core::relational::{Filter, Layout};
use dalbench_core::report::{ReportKeys, Slot, FIND_MANY_OFFSETS};
use dalbench_core::{Aggregate, Bench, Report, ReportRequest, Window};
use sqlx::postgres::{PgArguments, PgConnection, PgRow};
use sqlx::Connection;
use tokio::runtime::Runtime;
use tracing::{debug, info};

use crate::config::ConnectionConfig;
use crate::error::{BackendError, Result};

/// A statement with positional binds.
pub type PgQuery<'q> = sqlx::query::Query<'q, sqlx::Postgres, PgArguments>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS simple_post (
    id UUID PRIMARY KEY,
    title TEXT NOT NULL,
    created DATE NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_simple_post_created ON simple_post(created);

CREATE TABLE IF NOT EXISTS standard_invoice (
    number TEXT PRIMARY KEY,
    total NUMERIC NOT NULL,
    due_date DATE NOT NULL,
    paid TIMESTAMPTZ,
    reference TEXT,
    tax NUMERIC NOT NULL,
    version BIGINT NOT NULL,
    canceled BOOLEAN NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_standard_invoice_version ON standard_invoice(version);

CREATE TABLE IF NOT EXISTS standard_item (
    invoice_number TEXT NOT NULL REFERENCES standard_invoice(number) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    product TEXT NOT NULL,
    cost NUMERIC NOT NULL,
    quantity INTEGER NOT NULL,
    tax_group NUMERIC NOT NULL,
    discount NUMERIC NOT NULL,
    PRIMARY KEY (invoice_number, position)
);

CREATE TABLE IF NOT EXISTS complex_bank_scrape (
    id INTEGER PRIMARY KEY,
    website TEXT NOT NULL,
    scraped_at TIMESTAMPTZ NOT NULL,
    info JSONB NOT NULL,
    external_id TEXT,
    ranking INTEGER NOT NULL,
    tags TEXT[] NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_complex_bank_scrape_created ON complex_bank_scrape(created_at);

CREATE TABLE IF NOT EXISTS complex_account (
    scrape_id INTEGER NOT NULL REFERENCES complex_bank_scrape(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    balance NUMERIC NOT NULL,
    number TEXT NOT NULL,
    name TEXT NOT NULL,
    notes TEXT NOT NULL,
    PRIMARY KEY (scrape_id, position)
);

CREATE TABLE IF NOT EXISTS complex_transaction (
    scrape_id INTEGER NOT NULL,
    account_position INTEGER NOT NULL,
    position INTEGER NOT NULL,
    tran_date DATE NOT NULL,
    description TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount NUMERIC NOT NULL,
    PRIMARY KEY (scrape_id, account_position, position),
    FOREIGN KEY (scrape_id, account_position)
        REFERENCES complex_account(scrape_id, position) ON DELETE CASCADE
);
"#;

/// PostgreSQL backend for all three shapes.
pub struct PostgresBackend {
    conn: PgConnection,
    rt: Runtime,
}

impl PostgresBackend {
    /// Connect, apply the statement timeout and create the schema.
    pub fn connect(config: &ConnectionConfig) -> Result<Self> {
        let rt = Runtime::new().map_err(BackendError::Runtime)?;
        let url = config.postgres_url();

        let conn = rt.block_on(async {
            let mut conn = PgConnection::connect(&url).await?;
            if let Some(timeout) = config.statement_timeout {
                let statement = format!("SET statement_timeout = {}", timeout.as_millis());
                sqlx::query(&statement).execute(&mut conn).await?;
            }
            sqlx::raw_sql(SCHEMA).execute(&mut conn).await?;
            Ok::<_, BackendError>(conn)
        })?;

        info!("connected postgres backend");
        Ok(Self { conn, rt })
    }

    /// Connect using `DATABASE_URL` or the default URL.
    pub fn from_env() -> Result<Self> {
        Self::connect(&ConnectionConfig::default())
    }
}

/// Which roots a load returns, with the values to bind.
pub enum Selection<'a, T: Aggregate> {
    All,
    Key(&'a T::Key),
    Keys(&'a [T::Key]),
    Window(&'a Window<T::Order>),
}

impl<T: Aggregate> Clone for Selection<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: Aggregate> Copy for Selection<'_, T> {}

impl<T: PgShape> Selection<'_, T> {
    pub fn filter(&self) -> Filter {
        match self {
            Selection::All => Filter::All,
            Selection::Key(_) => Filter::Key,
            Selection::Keys(keys) => Filter::Keys(keys.len()),
            Selection::Window(_) => Filter::Window,
        }
    }

    pub fn bind<'q>(&self, query: PgQuery<'q>) -> PgQuery<'q> {
        match self {
            Selection::All => query,
            Selection::Key(key) => T::bind_key(query, key),
            Selection::Keys(keys) => T::bind_keys(query, keys),
            Selection::Window(window) => {
                T::bind_order(T::bind_order(query, &window.from), &window.until)
            }
        }
    }
}

/// Per-shape mapping between the model and the PostgreSQL tables.
#[allow(async_fn_in_trait)]
pub trait PgShape: Aggregate + Sized {
    const LAYOUT: Layout;

    fn bind_key<'q>(query: PgQuery<'q>, key: &Self::Key) -> PgQuery<'q>;

    /// Bind a key set as one array parameter.
    fn bind_keys<'q>(query: PgQuery<'q>, keys: &[Self::Key]) -> PgQuery<'q>;

    fn bind_order<'q>(query: PgQuery<'q>, order: &Self::Order) -> PgQuery<'q>;

    /// Read the key at column `idx`.
    fn read_key(row: &PgRow, idx: usize) -> Result<Self::Key>;

    /// Load and assemble the selected roots, ordered by key.
    async fn load(conn: &mut PgConnection, selection: Selection<'_, Self>) -> Result<Vec<Self>>;

    async fn insert(conn: &mut PgConnection, values: &[Self]) -> Result<()>;

    async fn update(conn: &mut PgConnection, values: &[Self]) -> Result<()>;
}

#[derive(Debug, Clone, Copy)]
enum Write {
    Insert,
    Update,
}

async fn write<T: PgShape>(conn: &mut PgConnection, values: &[T], write: Write) -> Result<()> {
    let mut tx = conn.begin().await?;
    match write {
        Write::Insert => T::insert(&mut tx, values).await?,
        Write::Update => T::update(&mut tx, values).await?,
    }
    tx.commit().await?;
    Ok(())
}

async fn clean(conn: &mut PgConnection, layout: &Layout) -> Result<()> {
    let mut tx = conn.begin().await?;
    for statement in layout.delete_all() {
        sqlx::query(&statement).execute(&mut *tx).await?;
    }
    tx.commit().await?;
    Ok(())
}

async fn report<T: PgShape>(conn: &mut PgConnection, request: &ReportRequest<T>) -> Result<Report<T>> {
    if request.find_many.len() != FIND_MANY_OFFSETS.len() {
        return Err(BackendError::InvalidData(format!(
            "report expects {} find-many keys, got {}",
            FIND_MANY_OFFSETS.len(),
            request.find_many.len()
        )));
    }
    let statement = T::LAYOUT.report_keys(&sql::Postgres);
    let mut query = T::bind_key(sqlx::query(&statement), &request.find_one);
    for key in &request.find_many {
        query = T::bind_key(query, key);
    }
    query = T::bind_order(query, &request.window.from);
    query = T::bind_order(query, &request.window.until);
    let rows = query.fetch_all(&mut *conn).await?;

    let mut keys = ReportKeys::new();
    for row in &rows {
        let tag: i32 = sqlx::Row::try_get(row, 0)?;
        keys.push(Slot::from_tag(tag.into()).map_err(corrupt)?, T::read_key(row, 1)?);
    }

    let distinct = keys.distinct();
    let hydrated = if distinct.is_empty() {
        Vec::new()
    } else {
        T::load(conn, Selection::Keys(&distinct)).await?
    };
    keys.resolve(hydrated).map_err(corrupt)
}

impl<T: PgShape> Bench<T> for PostgresBackend {
    fn clean(&mut self) -> dalbench_core::Result<()> {
        Ok(self.rt.block_on(clean(&mut self.conn, &T::LAYOUT))?)
    }

    fn analyze(&mut self) -> dalbench_core::Result<()> {
        let layout = T::LAYOUT;
        let tables: Vec<&str> = std::iter::once(layout.root.name)
            .chain(layout.children.iter().map(|t| t.name))
            .collect();
        let statement = format!("ANALYZE {}", tables.join(", "));
        self.rt
            .block_on(sqlx::query(&statement).execute(&mut self.conn))
            .map_err(BackendError::from)?;
        Ok(())
    }

    fn search_all(&mut self) -> dalbench_core::Result<Vec<T>> {
        Ok(self.rt.block_on(T::load(&mut self.conn, Selection::All))?)
    }

    fn search_subset(&mut self, window: &Window<T::Order>) -> dalbench_core::Result<Vec<T>> {
        Ok(self
            .rt
            .block_on(T::load(&mut self.conn, Selection::Window(window)))?)
    }

    fn find_single(&mut self, key: &T::Key) -> dalbench_core::Result<Option<T>> {
        let found = self.rt.block_on(T::load(&mut self.conn, Selection::Key(key)))?;
        Ok(found.into_iter().next())
    }

    fn find_many(&mut self, keys: &[T::Key]) -> dalbench_core::Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        Ok(self.rt.block_on(T::load(&mut self.conn, Selection::Keys(keys)))?)
    }

    fn insert_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        Ok(self
            .rt
            .block_on(write(&mut self.conn, values, Write::Insert))?)
    }

    fn update_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        Ok(self
            .rt
            .block_on(write(&mut self.conn, values, Write::Update))?)
    }

    fn report(&mut self, request: &ReportRequest<T>) -> dalbench_core::Result<Report<T>> {
        Ok(self.rt.block_on(report(&mut self.conn, request))?)
    }
}

// -------------------------------------------------------------------------
// Statement helpers
// -------------------------------------------------------------------------

/// Multi-row insert, chunked so no statement exceeds the parameter limit.
pub(crate) async fn insert_rows<R>(
    conn: &mut PgConnection,
    table: &Table,
    rows: &[R],
    bind: for<'q> fn(PgQuery<'q>, &'q R) -> PgQuery<'q>,
) -> Result<u64> {
    let mut inserted = 0;
    for chunk in rows.chunks(sql::rows_per_insert(&sql::Postgres, table)) {
        let statement = sql::insert_rows(&sql::Postgres, table, chunk.len());
        let query = chunk
            .iter()
            .fold(sqlx::query(&statement), |query, row| bind(query, row));
        inserted += query.execute(&mut *conn).await?.rows_affected();
    }
    Ok(inserted)
}

/// Update rows in place by key. Returns the number of rows touched.
pub(crate) async fn update_rows<R>(
    conn: &mut PgConnection,
    table: &Table,
    rows: &[R],
    bind: for<'q> fn(PgQuery<'q>, &'q R) -> PgQuery<'q>,
) -> Result<u64> {
    let statement = sql::update_row(&sql::Postgres, table);
    let mut updated = 0;
    for row in rows {
        updated += bind(sqlx::query(&statement), row)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }
    Ok(updated)
}

/// Fail when an update touched fewer roots than it was given.
pub(crate) fn ensure_updated(shape: &str, updated: u64, expected: usize) -> Result<()> {
    if updated == expected as u64 {
        Ok(())
    } else {
        Err(BackendError::NotFound(format!(
            "{} of {expected} {shape} aggregates do not exist",
            (expected as u64).saturating_sub(updated)
        )))
    }
}

pub(crate) fn corrupt(err: dalbench_core::Error) -> BackendError {
    BackendError::InvalidData(err.to_string())
}

pub(crate) fn log_changes(shape: &str, inserts: usize, updates: usize, truncations: usize) {
    debug!(shape, inserts, updates, truncations, "reconciled child rows");
}
