//! Invoices with positioned items.

use std::collections::HashMap;

use dalbench_core::relational::sql::{self, Sqlite, INVOICE, ITEM, STANDARD};
use dalbench_core::relational::{
    assemble_invoices, reconcile_invoices, ChildRow, Filter, ItemChanges, ItemRow, Layout,
};
use dalbench_core::{Invoice, Item};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use super::{
    corrupt, date, decimal, ensure_updated, insert_rows, integer, key_chunk, log_changes,
    optional_text, read_decimal, read_optional_timestamp, select, text, timestamp, truncate,
    update_rows, SqliteShape,
};
use crate::error::Result;

fn invoice_row(invoice: &Invoice) -> Vec<Value> {
    vec![
        text(&invoice.number),
        decimal(&invoice.total),
        date(&invoice.due_date),
        invoice.paid.as_ref().map_or(Value::Null, timestamp),
        optional_text(invoice.reference.as_deref()),
        decimal(&invoice.tax),
        integer(invoice.version),
        integer(invoice.canceled),
    ]
}

fn item_row(row: &ItemRow<'_>) -> Vec<Value> {
    vec![
        text(row.invoice),
        integer(row.position),
        text(&row.item.product),
        decimal(&row.item.cost),
        integer(row.item.quantity),
        decimal(&row.item.tax_group),
        decimal(&row.item.discount),
    ]
}

fn read_invoice(row: &Row<'_>) -> Result<Invoice> {
    Ok(Invoice {
        number: row.get(0)?,
        total: read_decimal(row, 1)?,
        due_date: row.get(2)?,
        paid: read_optional_timestamp(row, 3)?,
        reference: row.get(4)?,
        tax: read_decimal(row, 5)?,
        version: row.get(6)?,
        canceled: row.get(7)?,
        items: Vec::new(),
    })
}

fn read_item(row: &Row<'_>) -> Result<ChildRow<String, Item>> {
    Ok(ChildRow {
        parent: row.get(0)?,
        position: row.get(1)?,
        value: Item {
            product: row.get(2)?,
            cost: read_decimal(row, 3)?,
            quantity: row.get(4)?,
            tax_group: read_decimal(row, 5)?,
            discount: read_decimal(row, 6)?,
        },
    })
}

/// Stored item count per invoice, including invoices without items.
fn stored_items(conn: &Connection, invoices: &[Invoice]) -> Result<HashMap<String, usize>> {
    let mut stored = HashMap::with_capacity(invoices.len());
    for chunk in invoices.chunks(key_chunk()) {
        let statement = sql::count_children(&Sqlite, &INVOICE, &ITEM, chunk.len());
        let params: Vec<Value> = chunk.iter().map(|i| text(&i.number)).collect();
        let counts = select(conn, &statement, &params, |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        stored.extend(counts.into_iter().map(|(number, count)| (number, count as usize)));
    }
    Ok(stored)
}

fn apply(conn: &Connection, changes: &ItemChanges<'_>) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    for cut in &changes.truncations {
        truncate(conn, &ITEM, 1, &[text(cut.parent), integer(cut.from)])?;
    }
    update_rows(conn, &ITEM, changes.updates.iter().map(item_row))?;
    insert_rows(conn, &ITEM, changes.inserts.iter().map(item_row))?;
    log_changes(
        "Standard",
        changes.inserts.len(),
        changes.updates.len(),
        changes.truncations.len(),
    );
    Ok(())
}

impl SqliteShape for Invoice {
    const LAYOUT: Layout = STANDARD;

    fn key_value(key: &String) -> Value {
        text(key)
    }

    fn order_value(order: &i64) -> Value {
        integer(*order)
    }

    fn read_key(row: &Row<'_>, idx: usize) -> Result<String> {
        Ok(row.get(idx)?)
    }

    fn load(conn: &Connection, filter: Filter, params: &[Value]) -> Result<Vec<Invoice>> {
        let heads = select(conn, &STANDARD.select_roots(&Sqlite, filter), params, read_invoice)?;
        if heads.is_empty() {
            return Ok(heads);
        }
        let items = select(
            conn,
            &STANDARD.select_children(&Sqlite, 0, filter),
            params,
            read_item,
        )?;
        assemble_invoices(heads, items).map_err(corrupt)
    }

    fn insert(conn: &Connection, values: &[Invoice]) -> Result<()> {
        insert_rows(conn, &INVOICE, values.iter().map(invoice_row))?;
        apply(conn, &reconcile_invoices(values, &HashMap::new()))
    }

    fn update(conn: &Connection, values: &[Invoice]) -> Result<()> {
        let updated = update_rows(conn, &INVOICE, values.iter().map(invoice_row))?;
        ensure_updated("Standard", updated, values.len())?;
        let stored = stored_items(conn, values)?;
        apply(conn, &reconcile_invoices(values, &stored))
    }
}
