//! Bank scrapes with positioned accounts and transactions.

use chrono::{DateTime, Utc};
use dalbench_core::relational::sql::{self, Sqlite, ACCOUNT, COMPLEX, SCRAPE, TRANSACTION};
use dalbench_core::relational::{
    assemble_scrapes, reconcile_scrapes, AccountRow, ChildRow, Filter, GrandchildRow, Layout,
    ScrapeChanges, StoredScrapes, TransactionRow,
};
use dalbench_core::{Account, BankScrape, Currency, Transaction};
use rusqlite::types::Value;
use rusqlite::{Connection, Row};

use super::{
    corrupt, date, decimal, ensure_updated, insert_rows, integer, json, key_chunk, log_changes,
    optional_text, read_decimal, read_json, read_timestamp, select, text, timestamp, truncate,
    update_rows, SqliteShape,
};
use crate::error::{BackendError, Result};

fn scrape_row(scrape: &BankScrape) -> Result<Vec<Value>> {
    Ok(vec![
        integer(scrape.id),
        text(&scrape.website),
        timestamp(&scrape.at),
        json(&scrape.info)?,
        optional_text(scrape.external_id.as_deref()),
        integer(scrape.ranking),
        json(&scrape.tags)?,
        timestamp(&scrape.created_at),
    ])
}

fn account_row(row: &AccountRow<'_>) -> Vec<Value> {
    vec![
        integer(row.scrape),
        integer(row.position),
        decimal(&row.account.balance),
        text(&row.account.number),
        text(&row.account.name),
        text(&row.account.notes),
    ]
}

fn transaction_row(row: &TransactionRow<'_>) -> Vec<Value> {
    vec![
        integer(row.scrape),
        integer(row.account),
        integer(row.position),
        date(&row.transaction.date),
        text(&row.transaction.description),
        text(row.transaction.currency.as_str()),
        decimal(&row.transaction.amount),
    ]
}

fn read_scrape(row: &Row<'_>) -> Result<BankScrape> {
    Ok(BankScrape {
        id: row.get(0)?,
        website: row.get(1)?,
        at: read_timestamp(row, 2)?,
        info: read_json(row, 3)?,
        external_id: row.get(4)?,
        ranking: row.get(5)?,
        tags: read_json(row, 6)?,
        created_at: read_timestamp(row, 7)?,
        accounts: Vec::new(),
    })
}

fn read_account(row: &Row<'_>) -> Result<ChildRow<i32, Account>> {
    Ok(ChildRow {
        parent: row.get(0)?,
        position: row.get(1)?,
        value: Account {
            balance: read_decimal(row, 2)?,
            number: row.get(3)?,
            name: row.get(4)?,
            notes: row.get(5)?,
            transactions: Vec::new(),
        },
    })
}

fn read_transaction(row: &Row<'_>) -> Result<GrandchildRow<i32, Transaction>> {
    let currency: String = row.get(5)?;
    Ok(GrandchildRow {
        root: row.get(0)?,
        owner: row.get(1)?,
        position: row.get(2)?,
        value: Transaction {
            date: row.get(3)?,
            description: row.get(4)?,
            currency: currency.parse::<Currency>().map_err(BackendError::InvalidData)?,
            amount: read_decimal(row, 6)?,
        },
    })
}

/// Stored account positions and their transaction counts per scrape.
fn stored_accounts(conn: &Connection, scrapes: &[BankScrape]) -> Result<StoredScrapes> {
    let mut stored = StoredScrapes::new();
    for chunk in scrapes.chunks(key_chunk()) {
        let statement = sql::count_children(&Sqlite, &ACCOUNT, &TRANSACTION, chunk.len());
        let params: Vec<Value> = chunk.iter().map(|s| integer(s.id)).collect();
        let counts = select(conn, &statement, &params, |row| {
            Ok((
                row.get::<_, i32>(0)?,
                row.get::<_, i32>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        for (scrape, position, transactions) in counts {
            stored
                .record(scrape, position, transactions as usize)
                .map_err(corrupt)?;
        }
    }
    Ok(stored)
}

fn apply(conn: &Connection, changes: &ScrapeChanges<'_>) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    for cut in &changes.accounts.truncations {
        let params = [integer(cut.parent), integer(cut.from)];
        truncate(conn, &TRANSACTION, 1, &params)?;
        truncate(conn, &ACCOUNT, 1, &params)?;
    }
    for cut in &changes.transactions.truncations {
        let (scrape, account) = cut.parent;
        truncate(
            conn,
            &TRANSACTION,
            2,
            &[integer(scrape), integer(account), integer(cut.from)],
        )?;
    }

    update_rows(conn, &ACCOUNT, changes.accounts.updates.iter().map(account_row))?;
    insert_rows(conn, &ACCOUNT, changes.accounts.inserts.iter().map(account_row))?;
    update_rows(
        conn,
        &TRANSACTION,
        changes.transactions.updates.iter().map(transaction_row),
    )?;
    insert_rows(
        conn,
        &TRANSACTION,
        changes.transactions.inserts.iter().map(transaction_row),
    )?;

    log_changes(
        "Complex",
        changes.accounts.inserts.len() + changes.transactions.inserts.len(),
        changes.accounts.updates.len() + changes.transactions.updates.len(),
        changes.accounts.truncations.len() + changes.transactions.truncations.len(),
    );
    Ok(())
}

fn scrape_rows(scrapes: &[BankScrape]) -> Result<Vec<Vec<Value>>> {
    scrapes.iter().map(scrape_row).collect()
}

impl SqliteShape for BankScrape {
    const LAYOUT: Layout = COMPLEX;

    fn key_value(key: &i32) -> Value {
        integer(*key)
    }

    fn order_value(order: &DateTime<Utc>) -> Value {
        timestamp(order)
    }

    fn read_key(row: &Row<'_>, idx: usize) -> Result<i32> {
        Ok(row.get(idx)?)
    }

    fn load(conn: &Connection, filter: Filter, params: &[Value]) -> Result<Vec<BankScrape>> {
        let heads = select(conn, &COMPLEX.select_roots(&Sqlite, filter), params, read_scrape)?;
        if heads.is_empty() {
            return Ok(heads);
        }
        let accounts = select(
            conn,
            &COMPLEX.select_children(&Sqlite, 0, filter),
            params,
            read_account,
        )?;
        let transactions = select(
            conn,
            &COMPLEX.select_children(&Sqlite, 1, filter),
            params,
            read_transaction,
        )?;
        assemble_scrapes(heads, accounts, transactions).map_err(corrupt)
    }

    fn insert(conn: &Connection, values: &[BankScrape]) -> Result<()> {
        insert_rows(conn, &SCRAPE, scrape_rows(values)?)?;
        apply(conn, &reconcile_scrapes(values, &StoredScrapes::new()))
    }

    fn update(conn: &Connection, values: &[BankScrape]) -> Result<()> {
        let updated = update_rows(conn, &SCRAPE, scrape_rows(values)?)?;
        ensure_updated("Complex", updated, values.len())?;
        let stored = stored_accounts(conn, values)?;
        apply(conn, &reconcile_scrapes(values, &stored))
    }
}
