use std::collections::HashMap;

use dalbench_core::relational::sql::{self, Postgres, INVOICE, ITEM, STANDARD};
use dalbench_core::relational::{
    assemble_invoices, reconcile_invoices, ChildRow, ItemChanges, ItemRow, Layout,
};
use dalbench_core::{Invoice, Item};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::Row;

use super::{
    corrupt, ensure_updated, insert_rows, log_changes, update_rows, PgQuery, PgShape, Selection,
};
use crate::error::Result;

fn bind_invoice<'q>(query: PgQuery<'q>, invoice: &'q Invoice) -> PgQuery<'q> {
    query
        .bind(invoice.number.as_str())
        .bind(invoice.total)
        .bind(invoice.due_date)
        .bind(invoice.paid)
        .bind(invoice.reference.as_deref())
        .bind(invoice.tax)
        .bind(invoice.version)
        .bind(invoice.canceled)
}

fn bind_item<'q>(query: PgQuery<'q>, row: &'q ItemRow<'_>) -> PgQuery<'q> {
    query
        .bind(row.invoice)
        .bind(row.position)
        .bind(row.item.product.as_str())
        .bind(row.item.cost)
        .bind(row.item.quantity)
        .bind(row.item.tax_group)
        .bind(row.item.discount)
}

fn read_invoice(row: &PgRow) -> Result<Invoice> {
    Ok(Invoice {
        number: row.try_get(0)?,
        total: row.try_get(1)?,
        due_date: row.try_get(2)?,
        paid: row.try_get(3)?,
        reference: row.try_get(4)?,
        tax: row.try_get(5)?,
        version: row.try_get(6)?,
        canceled: row.try_get(7)?,
        items: Vec::new(),
    })
}

fn read_item(row: &PgRow) -> Result<ChildRow<String, Item>> {
    Ok(ChildRow {
        parent: row.try_get(0)?,
        position: row.try_get(1)?,
        value: Item {
            product: row.try_get(2)?,
            cost: row.try_get(3)?,
            quantity: row.try_get(4)?,
            tax_group: row.try_get(5)?,
            discount: row.try_get(6)?,
        },
    })
}

async fn stored_items(conn: &mut PgConnection, invoices: &[Invoice]) -> Result<HashMap<String, usize>> {
    let statement = sql::count_children(&Postgres, &INVOICE, &ITEM, invoices.len());
    let numbers: Vec<String> = invoices.iter().map(|i| i.number.clone()).collect();
    let rows = sqlx::query(&statement)
        .bind(numbers)
        .fetch_all(&mut *conn)
        .await?;
    let mut stored = HashMap::with_capacity(rows.len());
    for row in &rows {
        let count: i64 = row.try_get(1)?;
        stored.insert(row.try_get::<String, _>(0)?, count as usize);
    }
    Ok(stored)
}

async fn apply(conn: &mut PgConnection, changes: &ItemChanges<'_>) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let cut_items = sql::truncate(&Postgres, &ITEM, 1);
    for cut in &changes.truncations {
        sqlx::query(&cut_items)
            .bind(cut.parent)
            .bind(cut.from)
            .execute(&mut *conn)
            .await?;
    }
    update_rows(conn, &ITEM, &changes.updates, bind_item).await?;
    insert_rows(conn, &ITEM, &changes.inserts, bind_item).await?;
    log_changes(
        "Standard",
        changes.inserts.len(),
        changes.updates.len(),
        changes.truncations.len(),
    );
    Ok(())
}

impl PgShape for Invoice {
    const LAYOUT: Layout = STANDARD;

    fn bind_key<'q>(query: PgQuery<'q>, key: &String) -> PgQuery<'q> {
        query.bind(key.clone())
    }

    fn bind_keys<'q>(query: PgQuery<'q>, keys: &[String]) -> PgQuery<'q> {
        query.bind(keys.to_vec())
    }

    fn bind_order<'q>(query: PgQuery<'q>, order: &i64) -> PgQuery<'q> {
        query.bind(*order)
    }

    fn read_key(row: &PgRow, idx: usize) -> Result<String> {
        Ok(row.try_get(idx)?)
    }

    async fn load(conn: &mut PgConnection, selection: Selection<'_, Self>) -> Result<Vec<Invoice>> {
        let filter = selection.filter();
        let statement = STANDARD.select_roots(&Postgres, filter);
        let heads = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(read_invoice)
            .collect::<Result<Vec<_>>>()?;
        if heads.is_empty() {
            return Ok(heads);
        }

        let statement = STANDARD.select_children(&Postgres, 0, filter);
        let items = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(read_item)
            .collect::<Result<Vec<_>>>()?;
        assemble_invoices(heads, items).map_err(corrupt)
    }

    async fn insert(conn: &mut PgConnection, values: &[Invoice]) -> Result<()> {
        insert_rows(conn, &INVOICE, values, bind_invoice).await?;
        apply(conn, &reconcile_invoices(values, &HashMap::new())).await
    }

    async fn update(conn: &mut PgConnection, values: &[Invoice]) -> Result<()> {
        let updated = update_rows(conn, &INVOICE, values, bind_invoice).await?;
        ensure_updated("Standard", updated, values.len())?;
        let stored = stored_items(conn, values).await?;
        apply(conn, &reconcile_invoices(values, &stored)).await
    }
}
