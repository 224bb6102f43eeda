//! Posts in a single table.

use chrono::NaiveDate;
use dalbench_core::relational::sql::{Sqlite, POST, SIMPLE};
use dalbench_core::relational::{Filter, Layout};
use dalbench_core::Post;
use rusqlite::types::Value;
use rusqlite::{Connection, Row};
use uuid::Uuid;

use super::{date, ensure_updated, insert_rows, read_uuid, select, text, update_rows, uuid, SqliteShape};
use crate::error::Result;

fn post_row(post: &Post) -> Vec<Value> {
    vec![uuid(&post.id), text(&post.title), date(&post.created)]
}

fn read_post(row: &Row<'_>) -> Result<Post> {
    Ok(Post {
        id: read_uuid(row, 0)?,
        title: row.get(1)?,
        created: row.get(2)?,
    })
}

impl SqliteShape for Post {
    const LAYOUT: Layout = SIMPLE;

    fn key_value(key: &Uuid) -> Value {
        uuid(key)
    }

    fn order_value(order: &NaiveDate) -> Value {
        date(order)
    }

    fn read_key(row: &Row<'_>, idx: usize) -> Result<Uuid> {
        read_uuid(row, idx)
    }

    fn load(conn: &Connection, filter: Filter, params: &[Value]) -> Result<Vec<Post>> {
        select(conn, &SIMPLE.select_roots(&Sqlite, filter), params, read_post)
    }

    fn insert(conn: &Connection, values: &[Post]) -> Result<()> {
        insert_rows(conn, &POST, values.iter().map(post_row))?;
        Ok(())
    }

    fn update(conn: &Connection, values: &[Post]) -> Result<()> {
        let updated = update_rows(conn, &POST, values.iter().map(post_row))?;
        ensure_updated("Simple", updated, values.len())
    }
}
