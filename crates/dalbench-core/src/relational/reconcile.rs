//! Diff-based reconciliation of owned child rows.
//!
//! Given the number of child rows already persisted per parent and the
//! incoming replacement lists, produce the minimal set of row inserts,
//! in-place updates and tail deletions. Positions below `min(P, N)` are
//! updated, positions `P..N` inserted, positions `>= N` deleted with one
//! statement per parent. Insert is reconciliation against zero rows.

use std::collections::HashMap;
use std::ops::Range;

use tracing::trace;

use crate::error::{Error, Result};
use crate::model::{Account, BankScrape, Invoice, Item, Transaction};

/// What happens to the child rows of one parent.
///
/// Bounds are exclusive: positions `0..min(P, N)` are updated, so when
/// `P == N` every row is updated and nothing is inserted or deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildPlan {
    pub update: Range<usize>,
    pub insert: Range<usize>,
    pub delete_from: Option<usize>,
}

impl ChildPlan {
    pub fn new(persisted: usize, incoming: usize) -> Self {
        let min = persisted.min(incoming);
        Self {
            update: 0..min,
            insert: min..incoming,
            delete_from: (persisted > incoming).then_some(incoming),
        }
    }

    /// Number of row statements this plan implies.
    pub fn len(&self) -> usize {
        self.update.len() + self.insert.len() + usize::from(self.delete_from.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Deletion of every child at or past `from` under `parent`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncate<K> {
    pub parent: K,
    pub from: i32,
}

/// Row-level changes for one child table.
#[derive(Debug, Clone)]
pub struct ChangeSet<R, K> {
    pub inserts: Vec<R>,
    pub updates: Vec<R>,
    pub truncations: Vec<Truncate<K>>,
}

impl<R, K> Default for ChangeSet<R, K> {
    fn default() -> Self {
        Self {
            inserts: Vec::new(),
            updates: Vec::new(),
            truncations: Vec::new(),
        }
    }
}

impl<R, K> ChangeSet<R, K> {
    pub fn is_empty(&self) -> bool {
        self.inserts.is_empty() && self.updates.is_empty() && self.truncations.is_empty()
    }
}

/// Item row of an invoice.
#[derive(Debug, Clone, Copy)]
pub struct ItemRow<'a> {
    pub invoice: &'a str,
    pub position: i32,
    pub item: &'a Item,
}

/// Account row of a scrape.
#[derive(Debug, Clone, Copy)]
pub struct AccountRow<'a> {
    pub scrape: i32,
    pub position: i32,
    pub account: &'a Account,
}

/// Transaction row of an account.
#[derive(Debug, Clone, Copy)]
pub struct TransactionRow<'a> {
    pub scrape: i32,
    pub account: i32,
    pub position: i32,
    pub transaction: &'a Transaction,
}

/// Item changes keyed by invoice number.
pub type ItemChanges<'a> = ChangeSet<ItemRow<'a>, &'a str>;

/// Compute item changes for a batch of invoices.
///
/// `persisted` maps invoice number to the stored item count; absent
/// invoices count as zero.
pub fn reconcile_invoices<'a>(
    invoices: &'a [Invoice],
    persisted: &HashMap<String, usize>,
) -> ItemChanges<'a> {
    let mut changes = ChangeSet::default();
    for invoice in invoices {
        let stored = persisted.get(&invoice.number).copied().unwrap_or(0);
        let plan = ChildPlan::new(stored, invoice.items.len());
        trace!(invoice = %invoice.number, stored, incoming = invoice.items.len(), "item plan");
        if plan.is_empty() {
            continue;
        }

        let row = |position: usize| ItemRow {
            invoice: &invoice.number,
            position: position as i32,
            item: &invoice.items[position],
        };
        changes.updates.extend(plan.update.clone().map(row));
        changes.inserts.extend(plan.insert.clone().map(row));
        if let Some(from) = plan.delete_from {
            changes.truncations.push(Truncate {
                parent: invoice.number.as_str(),
                from: from as i32,
            });
        }
    }
    changes
}

/// Stored shape of one scrape: transaction count per account position.
pub type StoredAccounts = Vec<usize>;

/// Stored shapes of many scrapes, filled from a count query.
#[derive(Debug, Default, Clone)]
pub struct StoredScrapes {
    accounts: HashMap<i32, StoredAccounts>,
}

impl StoredScrapes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one account row. Rows of a scrape must arrive by ascending
    /// position with no gaps.
    pub fn record(&mut self, scrape: i32, position: i32, transactions: usize) -> Result<()> {
        let accounts = self.accounts.entry(scrape).or_default();
        if position as usize != accounts.len() {
            return Err(Error::Corrupt(format!(
                "scrape {scrape}: account position {position} found where {} expected",
                accounts.len()
            )));
        }
        accounts.push(transactions);
        Ok(())
    }

    pub fn get(&self, scrape: i32) -> &[usize] {
        self.accounts.get(&scrape).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Account and transaction changes for a batch of scrapes.
#[derive(Debug, Default, Clone)]
pub struct ScrapeChanges<'a> {
    pub accounts: ChangeSet<AccountRow<'a>, i32>,
    pub transactions: ChangeSet<TransactionRow<'a>, (i32, i32)>,
}

impl ScrapeChanges<'_> {
    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty() && self.transactions.is_empty()
    }
}

/// Compute account and transaction changes for a batch of scrapes.
///
/// Accounts are reconciled per scrape; transactions per surviving or new
/// account. Transactions of accounts cut off by an account truncation are
/// covered by that truncation (adapters delete them first).
pub fn reconcile_scrapes<'a>(scrapes: &'a [BankScrape], stored: &StoredScrapes) -> ScrapeChanges<'a> {
    let mut changes = ScrapeChanges::default();
    for scrape in scrapes {
        let stored_accounts = stored.get(scrape.id);
        let plan = ChildPlan::new(stored_accounts.len(), scrape.accounts.len());
        trace!(scrape = scrape.id, stored = stored_accounts.len(), incoming = scrape.accounts.len(), "account plan");

        for position in plan.update.clone().chain(plan.insert.clone()) {
            let account = &scrape.accounts[position];
            let row = AccountRow {
                scrape: scrape.id,
                position: position as i32,
                account,
            };
            if plan.update.contains(&position) {
                changes.accounts.updates.push(row);
            } else {
                changes.accounts.inserts.push(row);
            }

            let stored_transactions = stored_accounts.get(position).copied().unwrap_or(0);
            let nested = ChildPlan::new(stored_transactions, account.transactions.len());
            if nested.is_empty() {
                continue;
            }
            let tran_row = |index: usize| TransactionRow {
                scrape: scrape.id,
                account: position as i32,
                position: index as i32,
                transaction: &account.transactions[index],
            };
            changes.transactions.updates.extend(nested.update.clone().map(tran_row));
            changes.transactions.inserts.extend(nested.insert.clone().map(tran_row));
            if let Some(from) = nested.delete_from {
                changes.transactions.truncations.push(Truncate {
                    parent: (scrape.id, position as i32),
                    from: from as i32,
                });
            }
        }

        if let Some(from) = plan.delete_from {
            changes.accounts.truncations.push(Truncate {
                parent: scrape.id,
                from: from as i32,
            });
        }
    }
    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::factory::Synthetic;
    use chrono::{TimeZone, Utc};

    fn clock() -> Clock {
        Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap())
    }

    #[test]
    fn test_plan_grow() {
        let plan = ChildPlan::new(2, 5);
        assert_eq!(plan.update, 0..2);
        assert_eq!(plan.insert, 2..5);
        assert_eq!(plan.delete_from, None);
        assert_eq!(plan.len(), 5);
    }

    #[test]
    fn test_plan_shrink() {
        let plan = ChildPlan::new(5, 3);
        assert_eq!(plan.update, 0..3);
        assert!(plan.insert.is_empty());
        assert_eq!(plan.delete_from, Some(3));
    }

    #[test]
    fn test_plan_equal_counts_updates_every_row_once() {
        let plan = ChildPlan::new(4, 4);
        assert_eq!(plan.update, 0..4);
        assert!(plan.insert.is_empty());
        assert_eq!(plan.delete_from, None);
        assert_eq!(plan.len(), 4);
    }

    #[test]
    fn test_plan_to_empty() {
        let plan = ChildPlan::new(3, 0);
        assert!(plan.update.is_empty());
        assert!(plan.insert.is_empty());
        assert_eq!(plan.delete_from, Some(0));
        assert!(ChildPlan::new(0, 0).is_empty());
    }

    #[test]
    fn test_invoice_five_to_three() {
        let mut invoice = Invoice::create(&clock(), 5);
        assert_eq!(invoice.items.len(), 5);
        invoice.items.truncate(3);

        let stored = HashMap::from([("5".to_string(), 5)]);
        let invoices = [invoice];
        let changes = reconcile_invoices(&invoices, &stored);
        let positions: Vec<_> = changes.updates.iter().map(|r| r.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(changes.inserts.is_empty());
        assert_eq!(
            changes.truncations,
            vec![Truncate {
                parent: "5",
                from: 3
            }]
        );
    }

    #[test]
    fn test_invoice_insert_is_reconcile_against_nothing() {
        let invoices = [Invoice::create(&clock(), 7), Invoice::create(&clock(), 10)];
        let changes = reconcile_invoices(&invoices, &HashMap::new());
        assert_eq!(changes.inserts.len(), 7);
        assert!(changes.updates.is_empty());
        assert!(changes.truncations.is_empty());
        assert!(changes.inserts.iter().all(|r| r.invoice == "7"));
    }

    #[test]
    fn test_scrape_mixed_changes() {
        let clock = clock();
        // 7 accounts with (7 + j) transactions each.
        let mut scrape = BankScrape::create(&clock, 7);
        scrape.accounts.truncate(4);
        scrape.accounts[1].transactions.truncate(2);

        let mut stored = StoredScrapes::new();
        // Stored: 6 accounts, account 0 holds 3 transactions, the rest 8.
        for position in 0..6 {
            stored
                .record(7, position, if position == 0 { 3 } else { 8 })
                .unwrap();
        }

        let scrapes = [scrape];
        let changes = reconcile_scrapes(&scrapes, &stored);

        assert_eq!(changes.accounts.updates.len(), 4);
        assert!(changes.accounts.inserts.is_empty());
        assert_eq!(
            changes.accounts.truncations,
            vec![Truncate { parent: 7, from: 4 }]
        );

        // account 0: 3 stored, 7 incoming
        let inserted_0: Vec<_> = changes
            .transactions
            .inserts
            .iter()
            .filter(|r| r.account == 0)
            .map(|r| r.position)
            .collect();
        assert_eq!(inserted_0, vec![3, 4, 5, 6]);

        // account 1: 8 stored, 2 incoming
        assert!(changes
            .transactions
            .truncations
            .contains(&Truncate { parent: (7, 1), from: 2 }));

        // accounts 2 and 3: 8 stored, 9 and 10 incoming
        let inserted_3: Vec<_> = changes
            .transactions
            .inserts
            .iter()
            .filter(|r| r.account == 3)
            .map(|r| r.position)
            .collect();
        assert_eq!(inserted_3, vec![8, 9]);
        assert!(changes.transactions.inserts.iter().all(|r| r.account < 4));
    }

    #[test]
    fn test_new_accounts_insert_all_transactions() {
        let scrape = BankScrape::create(&clock(), 3);
        let scrapes = [scrape];
        let changes = reconcile_scrapes(&scrapes, &StoredScrapes::new());
        let expected: usize = scrapes[0].accounts.iter().map(|a| a.transactions.len()).sum();
        assert_eq!(changes.accounts.inserts.len(), 3);
        assert_eq!(changes.transactions.inserts.len(), expected);
        assert!(changes.transactions.updates.is_empty());
    }

    #[test]
    fn test_stored_rejects_gaps() {
        let mut stored = StoredScrapes::new();
        stored.record(1, 0, 2).unwrap();
        assert!(matches!(stored.record(1, 2, 2), Err(Error::Corrupt(_))));
        assert_eq!(stored.get(1), &[2]);
        assert!(stored.get(99).is_empty());
    }
}
