//! SQLite backend.
//!
//! Hand-written relational mapping over a single rusqlite connection. Each
//! shape lives in its own tables; child tables carry a position column and
//! a composite key. Writes run in one transaction per call, inserts are
//! multi-row statements chunked by the bind parameter limit.

mod complex;
mod simple;
mod standard;

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, Utc};
use dalbench_core::relational::sql::{self, Dialect, Sqlite, Table};
use dalbench_core::relational::{Filter, Layout};
use dalbench_core::report::{ReportKeys, Slot, FIND_MANY_OFFSETS};
use dalbench_core::{Aggregate, Bench, Query, QuerySource, Report, ReportRequest, Window};
use rust_decimal::Decimal;
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::ConnectionConfig;
use crate::error::{BackendError, Result};

const SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS simple_post (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    created TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_simple_post_created ON simple_post(created);

CREATE TABLE IF NOT EXISTS standard_invoice (
    number TEXT PRIMARY KEY,
    total TEXT NOT NULL,
    due_date TEXT NOT NULL,
    paid INTEGER,
    reference TEXT,
    tax TEXT NOT NULL,
    version INTEGER NOT NULL,
    canceled INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_standard_invoice_version ON standard_invoice(version);

CREATE TABLE IF NOT EXISTS standard_item (
    invoice_number TEXT NOT NULL REFERENCES standard_invoice(number) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    product TEXT NOT NULL,
    cost TEXT NOT NULL,
    quantity INTEGER NOT NULL,
    tax_group TEXT NOT NULL,
    discount TEXT NOT NULL,
    PRIMARY KEY (invoice_number, position)
);

CREATE TABLE IF NOT EXISTS complex_bank_scrape (
    id INTEGER PRIMARY KEY,
    website TEXT NOT NULL,
    scraped_at INTEGER NOT NULL,
    info TEXT NOT NULL,
    external_id TEXT,
    ranking INTEGER NOT NULL,
    tags TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_complex_bank_scrape_created ON complex_bank_scrape(created_at);

CREATE TABLE IF NOT EXISTS complex_account (
    scrape_id INTEGER NOT NULL REFERENCES complex_bank_scrape(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    balance TEXT NOT NULL,
    number TEXT NOT NULL,
    name TEXT NOT NULL,
    notes TEXT NOT NULL,
    PRIMARY KEY (scrape_id, position)
);

CREATE TABLE IF NOT EXISTS complex_transaction (
    scrape_id INTEGER NOT NULL,
    account_position INTEGER NOT NULL,
    position INTEGER NOT NULL,
    tran_date TEXT NOT NULL,
    description TEXT NOT NULL,
    currency TEXT NOT NULL,
    amount TEXT NOT NULL,
    PRIMARY KEY (scrape_id, account_position, position),
    FOREIGN KEY (scrape_id, account_position)
        REFERENCES complex_account(scrape_id, position) ON DELETE CASCADE
);
"#;

/// SQLite backend for all three shapes.
pub struct SqliteBackend {
    conn: Connection,
}

impl SqliteBackend {
    /// Open the database described by `config` and create the schema.
    pub fn open(config: &ConnectionConfig) -> Result<Self> {
        let conn = match &config.sqlite_path {
            Some(path) => Connection::open(path)?,
            None => Connection::open_in_memory()?,
        };
        // Lock waits only; SQLite has no statement deadline.
        if let Some(timeout) = config.statement_timeout {
            conn.busy_timeout(timeout)?;
        }
        conn.execute_batch(SCHEMA)?;
        info!(path = ?config.sqlite_path, "opened sqlite backend");
        Ok(Self { conn })
    }

    /// Open a fresh in-memory database.
    pub fn in_memory() -> Result<Self> {
        Self::open(&ConnectionConfig::default())
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn write<F>(&mut self, apply: F) -> Result<()>
    where
        F: FnOnce(&Connection) -> Result<()>,
    {
        let tx = self.conn.transaction()?;
        apply(&tx)?;
        tx.commit()?;
        Ok(())
    }

    fn clean_layout(&mut self, layout: &Layout) -> Result<()> {
        self.write(|conn| {
            for statement in layout.delete_all() {
                conn.execute(&statement, [])?;
            }
            Ok(())
        })
    }

    fn report_of<T: SqliteShape>(&self, request: &ReportRequest<T>) -> Result<Report<T>> {
        if request.find_many.len() != FIND_MANY_OFFSETS.len() {
            return Err(BackendError::InvalidData(format!(
                "report expects {} find-many keys, got {}",
                FIND_MANY_OFFSETS.len(),
                request.find_many.len()
            )));
        }
        let mut params = Vec::with_capacity(7);
        params.push(T::key_value(&request.find_one));
        params.extend(request.find_many.iter().map(T::key_value));
        params.push(T::order_value(&request.window.from));
        params.push(T::order_value(&request.window.until));

        let tagged = select(
            &self.conn,
            &T::LAYOUT.report_keys(&Sqlite),
            &params,
            |row| Ok((row.get::<_, i64>(0)?, T::read_key(row, 1)?)),
        )?;
        let mut keys = ReportKeys::new();
        for (tag, key) in tagged {
            keys.push(Slot::from_tag(tag).map_err(corrupt)?, key);
        }

        let distinct = keys.distinct();
        let hydrated = if distinct.is_empty() {
            Vec::new()
        } else {
            let params: Vec<Value> = distinct.iter().map(T::key_value).collect();
            T::load(&self.conn, Filter::Keys(params.len()), &params)?
        };
        keys.resolve(hydrated).map_err(corrupt)
    }
}

/// Per-shape mapping between the model and the SQLite tables.
pub trait SqliteShape: Aggregate + Sized {
    const LAYOUT: Layout;

    fn key_value(key: &Self::Key) -> Value;

    fn order_value(order: &Self::Order) -> Value;

    fn read_key(row: &Row<'_>, idx: usize) -> Result<Self::Key>;

    /// Load and assemble the roots selected by `filter`, ordered by key.
    fn load(conn: &Connection, filter: Filter, params: &[Value]) -> Result<Vec<Self>>;

    fn insert(conn: &Connection, values: &[Self]) -> Result<()>;

    fn update(conn: &Connection, values: &[Self]) -> Result<()>;
}

impl<T: SqliteShape> Bench<T> for SqliteBackend {
    fn clean(&mut self) -> dalbench_core::Result<()> {
        Ok(self.clean_layout(&T::LAYOUT)?)
    }

    fn analyze(&mut self) -> dalbench_core::Result<()> {
        self.conn.execute_batch("ANALYZE").map_err(BackendError::from)?;
        Ok(())
    }

    fn search_all(&mut self) -> dalbench_core::Result<Vec<T>> {
        Ok(T::load(&self.conn, Filter::All, &[])?)
    }

    fn search_subset(&mut self, window: &Window<T::Order>) -> dalbench_core::Result<Vec<T>> {
        let params = [T::order_value(&window.from), T::order_value(&window.until)];
        Ok(T::load(&self.conn, Filter::Window, &params)?)
    }

    fn query(&mut self) -> Option<Query<'_, T>> {
        Some(Query::new(self))
    }

    fn find_single(&mut self, key: &T::Key) -> dalbench_core::Result<Option<T>> {
        let found = T::load(&self.conn, Filter::Key, &[T::key_value(key)])?;
        Ok(found.into_iter().next())
    }

    fn find_many(&mut self, keys: &[T::Key]) -> dalbench_core::Result<Vec<T>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let params: Vec<Value> = keys.iter().map(T::key_value).collect();
        Ok(T::load(&self.conn, Filter::Keys(params.len()), &params)?)
    }

    fn insert_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        Ok(self.write(|conn| T::insert(conn, values))?)
    }

    fn update_all(&mut self, values: &[T]) -> dalbench_core::Result<()> {
        Ok(self.write(|conn| T::update(conn, values))?)
    }

    fn report(&mut self, request: &ReportRequest<T>) -> dalbench_core::Result<Report<T>> {
        Ok(self.report_of(request)?)
    }
}

impl<T: SqliteShape> QuerySource<T> for SqliteBackend {
    fn fetch(&mut self, window: Option<&Window<T::Order>>) -> dalbench_core::Result<Vec<T>> {
        match window {
            Some(window) => <Self as Bench<T>>::search_subset(self, window),
            None => <Self as Bench<T>>::search_all(self),
        }
    }
}

// -------------------------------------------------------------------------
// Statement helpers
// -------------------------------------------------------------------------

pub(crate) fn select<R, F>(conn: &Connection, sql: &str, params: &[Value], mut read: F) -> Result<Vec<R>>
where
    F: FnMut(&Row<'_>) -> Result<R>,
{
    let mut stmt = conn.prepare_cached(sql)?;
    let mut rows = stmt.query(params_from_iter(params))?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        out.push(read(row)?);
    }
    Ok(out)
}

/// Multi-row insert, chunked so no statement exceeds the parameter limit.
pub(crate) fn insert_rows<I>(conn: &Connection, table: &Table, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = Vec<Value>>,
{
    let per_statement = sql::rows_per_insert(&Sqlite, table);
    let mut buffer = Vec::new();
    let mut pending = 0;
    let mut inserted = 0;
    for row in rows {
        buffer.extend(row);
        pending += 1;
        if pending == per_statement {
            inserted += flush_insert(conn, table, pending, &mut buffer)?;
            pending = 0;
        }
    }
    if pending > 0 {
        inserted += flush_insert(conn, table, pending, &mut buffer)?;
    }
    Ok(inserted)
}

fn flush_insert(conn: &Connection, table: &Table, rows: usize, buffer: &mut Vec<Value>) -> Result<usize> {
    let statement = sql::insert_rows(&Sqlite, table, rows);
    let inserted = conn
        .prepare_cached(&statement)?
        .execute(params_from_iter(buffer.iter()))?;
    buffer.clear();
    Ok(inserted)
}

/// Update rows in place by key. Returns the number of rows touched.
pub(crate) fn update_rows<I>(conn: &Connection, table: &Table, rows: I) -> Result<usize>
where
    I: IntoIterator<Item = Vec<Value>>,
{
    let mut stmt = conn.prepare_cached(&sql::update_row(&Sqlite, table))?;
    let mut updated = 0;
    for row in rows {
        updated += stmt.execute(params_from_iter(row.iter()))?;
    }
    Ok(updated)
}

/// Delete the tail of a child list; see [`sql::truncate`].
pub(crate) fn truncate(conn: &Connection, table: &Table, prefix: usize, params: &[Value]) -> Result<usize> {
    let mut stmt = conn.prepare_cached(&sql::truncate(&Sqlite, table, prefix))?;
    Ok(stmt.execute(params_from_iter(params))?)
}

/// Fail when an update touched fewer roots than it was given.
pub(crate) fn ensure_updated(shape: &str, updated: usize, expected: usize) -> Result<()> {
    if updated == expected {
        Ok(())
    } else {
        Err(BackendError::NotFound(format!(
            "{} of {expected} {shape} aggregates do not exist",
            expected.saturating_sub(updated)
        )))
    }
}

/// Largest number of keys one key-set predicate may bind.
pub(crate) fn key_chunk() -> usize {
    Sqlite.max_params()
}

pub(crate) fn corrupt(err: dalbench_core::Error) -> BackendError {
    BackendError::InvalidData(err.to_string())
}

// -------------------------------------------------------------------------
// Value mapping
// -------------------------------------------------------------------------

pub(crate) fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn optional_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

pub(crate) fn integer(value: impl Into<i64>) -> Value {
    Value::Integer(value.into())
}

pub(crate) fn decimal(value: &Decimal) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn date(value: &NaiveDate) -> Value {
    Value::Text(value.format("%Y-%m-%d").to_string())
}

/// Timestamps are stored as microseconds since the Unix epoch.
pub(crate) fn timestamp(value: &DateTime<Utc>) -> Value {
    Value::Integer(value.timestamp_micros())
}

pub(crate) fn uuid(value: &Uuid) -> Value {
    Value::Text(value.to_string())
}

pub(crate) fn json<S: serde::Serialize>(value: &S) -> Result<Value> {
    Ok(Value::Text(serde_json::to_string(value)?))
}

pub(crate) fn read_decimal(row: &Row<'_>, idx: usize) -> Result<Decimal> {
    let raw: String = row.get(idx)?;
    Ok(Decimal::from_str(&raw)?)
}

pub(crate) fn read_timestamp(row: &Row<'_>, idx: usize) -> Result<DateTime<Utc>> {
    let micros: i64 = row.get(idx)?;
    from_micros(micros)
}

pub(crate) fn read_optional_timestamp(row: &Row<'_>, idx: usize) -> Result<Option<DateTime<Utc>>> {
    let micros: Option<i64> = row.get(idx)?;
    micros.map(from_micros).transpose()
}

fn from_micros(micros: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
        .ok_or_else(|| BackendError::InvalidData(format!("timestamp out of range: {micros}")))
}

pub(crate) fn read_uuid(row: &Row<'_>, idx: usize) -> Result<Uuid> {
    let raw: String = row.get(idx)?;
    Ok(Uuid::parse_str(&raw)?)
}

pub(crate) fn read_json<D: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> Result<D> {
    let raw: String = row.get(idx)?;
    Ok(serde_json::from_str(&raw)?)
}

pub(crate) fn log_changes(shape: &str, inserts: usize, updates: usize, truncations: usize) {
    debug!(shape, inserts, updates, truncations, "reconciled child rows");
}
