use chrono::NaiveDate;
use dalbench_core::relational::sql::{Postgres, POST, SIMPLE};
use dalbench_core::relational::Layout;
use dalbench_core::Post;
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::{ensure_updated, insert_rows, update_rows, PgQuery, PgShape, Selection};
use crate::error::Result;

fn bind_post<'q>(query: PgQuery<'q>, post: &'q Post) -> PgQuery<'q> {
    query.bind(post.id).bind(post.title.as_str()).bind(post.created)
}

fn read_post(row: &PgRow) -> Result<Post> {
    Ok(Post {
        id: row.try_get(0)?,
        title: row.try_get(1)?,
        created: row.try_get(2)?,
    })
}

impl PgShape for Post {
    const LAYOUT: Layout = SIMPLE;

    fn bind_key<'q>(query: PgQuery<'q>, key: &Uuid) -> PgQuery<'q> {
        query.bind(*key)
    }

    fn bind_keys<'q>(query: PgQuery<'q>, keys: &[Uuid]) -> PgQuery<'q> {
        query.bind(keys.to_vec())
    }

    fn bind_order<'q>(query: PgQuery<'q>, order: &NaiveDate) -> PgQuery<'q> {
        query.bind(*order)
    }

    fn read_key(row: &PgRow, idx: usize) -> Result<Uuid> {
        Ok(row.try_get(idx)?)
    }

    async fn load(conn: &mut PgConnection, selection: Selection<'_, Self>) -> Result<Vec<Post>> {
        let statement = SIMPLE.select_roots(&Postgres, selection.filter());
        let rows = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?;
        rows.iter().map(read_post).collect()
    }

    async fn insert(conn: &mut PgConnection, values: &[Post]) -> Result<()> {
        insert_rows(conn, &POST, values, bind_post).await?;
        Ok(())
    }

    async fn update(conn: &mut PgConnection, values: &[Post]) -> Result<()> {
        let updated = update_rows(conn, &POST, values, bind_post).await?;
        ensure_updated("Simple", updated, values.len())
    }
}
