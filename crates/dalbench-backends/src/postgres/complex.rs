use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dalbench_core::relational::sql::{self, Postgres, ACCOUNT, COMPLEX, SCRAPE, TRANSACTION};
use dalbench_core::relational::{
    assemble_scrapes, reconcile_scrapes, AccountRow, ChildRow, GrandchildRow, Layout,
    ScrapeChanges, StoredScrapes, TransactionRow,
};
use dalbench_core::{Account, BankScrape, Currency, Transaction};
use sqlx::postgres::{PgConnection, PgRow};
use sqlx::types::Json;
use sqlx::Row;

use super::{
    corrupt, ensure_updated, insert_rows, log_changes, update_rows, PgQuery, PgShape, Selection,
};
use crate::error::{BackendError, Result};

fn bind_scrape<'q>(query: PgQuery<'q>, scrape: &'q BankScrape) -> PgQuery<'q> {
    query
        .bind(scrape.id)
        .bind(scrape.website.as_str())
        .bind(scrape.at)
        .bind(Json(&scrape.info))
        .bind(scrape.external_id.as_deref())
        .bind(scrape.ranking)
        .bind(scrape.tags.iter().cloned().collect::<Vec<String>>())
        .bind(scrape.created_at)
}

fn bind_account<'q>(query: PgQuery<'q>, row: &'q AccountRow<'_>) -> PgQuery<'q> {
    query
        .bind(row.scrape)
        .bind(row.position)
        .bind(row.account.balance)
        .bind(row.account.number.as_str())
        .bind(row.account.name.as_str())
        .bind(row.account.notes.as_str())
}

fn bind_transaction<'q>(query: PgQuery<'q>, row: &'q TransactionRow<'_>) -> PgQuery<'q> {
    query
        .bind(row.scrape)
        .bind(row.account)
        .bind(row.position)
        .bind(row.transaction.date)
        .bind(row.transaction.description.as_str())
        .bind(row.transaction.currency.as_str())
        .bind(row.transaction.amount)
}

fn read_scrape(row: &PgRow) -> Result<BankScrape> {
    let Json(info): Json<BTreeMap<String, String>> = row.try_get(3)?;
    let tags: Vec<String> = row.try_get(6)?;
    Ok(BankScrape {
        id: row.try_get(0)?,
        website: row.try_get(1)?,
        at: row.try_get(2)?,
        info,
        external_id: row.try_get(4)?,
        ranking: row.try_get(5)?,
        tags: tags.into_iter().collect(),
        created_at: row.try_get(7)?,
        accounts: Vec::new(),
    })
}

fn read_account(row: &PgRow) -> Result<ChildRow<i32, Account>> {
    Ok(ChildRow {
        parent: row.try_get(0)?,
        position: row.try_get(1)?,
        value: Account {
            balance: row.try_get(2)?,
            number: row.try_get(3)?,
            name: row.try_get(4)?,
            notes: row.try_get(5)?,
            transactions: Vec::new(),
        },
    })
}

fn read_transaction(row: &PgRow) -> Result<GrandchildRow<i32, Transaction>> {
    let currency: String = row.try_get(5)?;
    Ok(GrandchildRow {
        root: row.try_get(0)?,
        owner: row.try_get(1)?,
        position: row.try_get(2)?,
        value: Transaction {
            date: row.try_get(3)?,
            description: row.try_get(4)?,
            currency: currency.parse::<Currency>().map_err(BackendError::InvalidData)?,
            amount: row.try_get(6)?,
        },
    })
}

async fn stored_accounts(conn: &mut PgConnection, scrapes: &[BankScrape]) -> Result<StoredScrapes> {
    let statement = sql::count_children(&Postgres, &ACCOUNT, &TRANSACTION, scrapes.len());
    let ids: Vec<i32> = scrapes.iter().map(|s| s.id).collect();
    let rows = sqlx::query(&statement)
        .bind(ids)
        .fetch_all(&mut *conn)
        .await?;
    let mut stored = StoredScrapes::new();
    for row in &rows {
        let transactions: i64 = row.try_get(2)?;
        stored
            .record(row.try_get(0)?, row.try_get(1)?, transactions as usize)
            .map_err(corrupt)?;
    }
    Ok(stored)
}

async fn apply(conn: &mut PgConnection, changes: &ScrapeChanges<'_>) -> Result<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let cut_accounts = sql::truncate(&Postgres, &ACCOUNT, 1);
    let cut_account_transactions = sql::truncate(&Postgres, &TRANSACTION, 1);
    for cut in &changes.accounts.truncations {
        sqlx::query(&cut_account_transactions)
            .bind(cut.parent)
            .bind(cut.from)
            .execute(&mut *conn)
            .await?;
        sqlx::query(&cut_accounts)
            .bind(cut.parent)
            .bind(cut.from)
            .execute(&mut *conn)
            .await?;
    }

    let cut_transactions = sql::truncate(&Postgres, &TRANSACTION, 2);
    for cut in &changes.transactions.truncations {
        let (scrape, account) = cut.parent;
        sqlx::query(&cut_transactions)
            .bind(scrape)
            .bind(account)
            .bind(cut.from)
            .execute(&mut *conn)
            .await?;
    }

    update_rows(conn, &ACCOUNT, &changes.accounts.updates, bind_account).await?;
    insert_rows(conn, &ACCOUNT, &changes.accounts.inserts, bind_account).await?;
    update_rows(conn, &TRANSACTION, &changes.transactions.updates, bind_transaction).await?;
    insert_rows(conn, &TRANSACTION, &changes.transactions.inserts, bind_transaction).await?;

    log_changes(
        "Complex",
        changes.accounts.inserts.len() + changes.transactions.inserts.len(),
        changes.accounts.updates.len() + changes.transactions.updates.len(),
        changes.accounts.truncations.len() + changes.transactions.truncations.len(),
    );
    Ok(())
}

impl PgShape for BankScrape {
    const LAYOUT: Layout = COMPLEX;

    fn bind_key<'q>(query: PgQuery<'q>, key: &i32) -> PgQuery<'q> {
        query.bind(*key)
    }

    fn bind_keys<'q>(query: PgQuery<'q>, keys: &[i32]) -> PgQuery<'q> {
        query.bind(keys.to_vec())
    }

    fn bind_order<'q>(query: PgQuery<'q>, order: &DateTime<Utc>) -> PgQuery<'q> {
        query.bind(*order)
    }

    fn read_key(row: &PgRow, idx: usize) -> Result<i32> {
        Ok(row.try_get(idx)?)
    }

    async fn load(conn: &mut PgConnection, selection: Selection<'_, Self>) -> Result<Vec<BankScrape>> {
        let filter = selection.filter();
        let statement = COMPLEX.select_roots(&Postgres, filter);
        let heads = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(read_scrape)
            .collect::<Result<Vec<_>>>()?;
        if heads.is_empty() {
            return Ok(heads);
        }

        let statement = COMPLEX.select_children(&Postgres, 0, filter);
        let accounts = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(read_account)
            .collect::<Result<Vec<_>>>()?;

        let statement = COMPLEX.select_children(&Postgres, 1, filter);
        let transactions = selection
            .bind(sqlx::query(&statement))
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(read_transaction)
            .collect::<Result<Vec<_>>>()?;

        assemble_scrapes(heads, accounts, transactions).map_err(corrupt)
    }

    async fn insert(conn: &mut PgConnection, values: &[BankScrape]) -> Result<()> {
        insert_rows(conn, &SCRAPE, values, bind_scrape).await?;
        apply(conn, &reconcile_scrapes(values, &StoredScrapes::new())).await
    }

    async fn update(conn: &mut PgConnection, values: &[BankScrape]) -> Result<()> {
        let updated = update_rows(conn, &SCRAPE, values, bind_scrape).await?;
        ensure_updated("Complex", updated, values.len())?;
        let stored = stored_accounts(conn, values).await?;
        apply(conn, &reconcile_scrapes(values, &stored)).await
    }
}
