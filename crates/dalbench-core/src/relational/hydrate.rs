//! Graph reconstruction from flat, position-ordered row streams.
//!
//! Heads are loaded first and indexed by key. Each child stream is consumed
//! once, appending every row to its parent's list; rows for one parent must
//! arrive by ascending position, which is checked rather than re-sorted.

use std::collections::HashMap;
use std::hash::Hash;

use crate::error::{Error, Result};
use crate::model::{Account, Aggregate, BankScrape, Invoice, Item, Transaction};

/// A child row as read back from storage.
#[derive(Debug, Clone)]
pub struct ChildRow<K, C> {
    pub parent: K,
    pub position: i32,
    pub value: C,
}

/// A grandchild row, addressed by root key and owner position.
#[derive(Debug, Clone)]
pub struct GrandchildRow<K, G> {
    pub root: K,
    pub owner: i32,
    pub position: i32,
    pub value: G,
}

/// Accumulates root aggregates and lets child streams attach to them.
#[derive(Debug)]
pub struct GraphBuilder<T: Aggregate> {
    roots: Vec<T>,
    index: HashMap<T::Key, usize>,
    last: Option<(T::Key, usize)>,
}

impl<T: Aggregate> Default for GraphBuilder<T> {
    fn default() -> Self {
        Self {
            roots: Vec::new(),
            index: HashMap::new(),
            last: None,
        }
    }
}

impl<T: Aggregate> GraphBuilder<T>
where
    T::Key: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            roots: Vec::with_capacity(capacity),
            index: HashMap::with_capacity(capacity),
            last: None,
        }
    }

    /// Add a root. Child lists of `root` should be empty.
    pub fn push_root(&mut self, root: T) -> Result<()> {
        let key = root.key();
        if self.index.insert(key.clone(), self.roots.len()).is_some() {
            return Err(Error::Corrupt(format!("{} {key} loaded twice", T::NAME)));
        }
        self.roots.push(root);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    /// Keys of the loaded roots, in load order.
    pub fn keys(&self) -> Vec<T::Key> {
        self.roots.iter().map(Aggregate::key).collect()
    }

    /// Resolve a parent key. Consecutive rows of the same parent skip the
    /// hash lookup.
    fn slot(&mut self, key: &T::Key) -> Result<usize> {
        if let Some((last, at)) = &self.last {
            if last == key {
                return Ok(*at);
            }
        }
        let at = *self
            .index
            .get(key)
            .ok_or_else(|| Error::Corrupt(format!("orphan row for {} {key}", T::NAME)))?;
        self.last = Some((key.clone(), at));
        Ok(at)
    }

    /// Attach one level of children.
    pub fn attach<C, I>(&mut self, rows: I, children: fn(&mut T) -> &mut Vec<C>) -> Result<()>
    where
        I: IntoIterator<Item = ChildRow<T::Key, C>>,
    {
        for row in rows {
            let at = self.slot(&row.parent)?;
            let list = children(&mut self.roots[at]);
            if row.position as usize != list.len() {
                return Err(Error::Corrupt(format!(
                    "{} {}: child position {} found where {} expected",
                    T::NAME,
                    row.parent,
                    row.position,
                    list.len()
                )));
            }
            list.push(row.value);
        }
        self.last = None;
        Ok(())
    }

    /// Attach the second level. Owners must already be attached.
    pub fn attach_nested<C, G, I>(
        &mut self,
        rows: I,
        children: fn(&mut T) -> &mut Vec<C>,
        grandchildren: fn(&mut C) -> &mut Vec<G>,
    ) -> Result<()>
    where
        I: IntoIterator<Item = GrandchildRow<T::Key, G>>,
    {
        for row in rows {
            let at = self.slot(&row.root)?;
            let owner = children(&mut self.roots[at])
                .get_mut(row.owner as usize)
                .ok_or_else(|| {
                    Error::Corrupt(format!(
                        "{} {}: row points at missing owner {}",
                        T::NAME,
                        row.root,
                        row.owner
                    ))
                })?;
            let list = grandchildren(owner);
            if row.position as usize != list.len() {
                return Err(Error::Corrupt(format!(
                    "{} {}/{}: position {} found where {} expected",
                    T::NAME,
                    row.root,
                    row.owner,
                    row.position,
                    list.len()
                )));
            }
            list.push(row.value);
        }
        self.last = None;
        Ok(())
    }

    /// Finish, keeping the order in which roots were pushed.
    pub fn finish(self) -> Vec<T> {
        self.roots
    }
}

fn invoice_items(invoice: &mut Invoice) -> &mut Vec<Item> {
    &mut invoice.items
}

fn scrape_accounts(scrape: &mut BankScrape) -> &mut Vec<Account> {
    &mut scrape.accounts
}

fn account_transactions(account: &mut Account) -> &mut Vec<Transaction> {
    &mut account.transactions
}

/// Rebuild invoices from head rows and their item stream.
pub fn assemble_invoices<I>(heads: Vec<Invoice>, items: I) -> Result<Vec<Invoice>>
where
    I: IntoIterator<Item = ChildRow<String, Item>>,
{
    let mut graph = GraphBuilder::with_capacity(heads.len());
    for head in heads {
        graph.push_root(head)?;
    }
    graph.attach(items, invoice_items)?;
    Ok(graph.finish())
}

/// Rebuild scrapes from head rows, their account stream and the
/// transaction stream.
pub fn assemble_scrapes<A, R>(heads: Vec<BankScrape>, accounts: A, transactions: R) -> Result<Vec<BankScrape>>
where
    A: IntoIterator<Item = ChildRow<i32, Account>>,
    R: IntoIterator<Item = GrandchildRow<i32, Transaction>>,
{
    let mut graph = GraphBuilder::with_capacity(heads.len());
    for head in heads {
        graph.push_root(head)?;
    }
    graph.attach(accounts, scrape_accounts)?;
    graph.attach_nested(transactions, scrape_accounts, account_transactions)?;
    Ok(graph.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::factory::{create_many, Synthetic};
    use chrono::{TimeZone, Utc};

    fn clock() -> Clock {
        Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap())
    }

    fn flatten_invoices(invoices: &[Invoice]) -> (Vec<Invoice>, Vec<ChildRow<String, Item>>) {
        let mut heads = Vec::new();
        let mut items = Vec::new();
        for invoice in invoices {
            let mut head = invoice.clone();
            for (position, item) in head.items.drain(..).enumerate() {
                items.push(ChildRow {
                    parent: invoice.number.clone(),
                    position: position as i32,
                    value: item,
                });
            }
            heads.push(head);
        }
        (heads, items)
    }

    fn flatten_scrapes(
        scrapes: &[BankScrape],
    ) -> (
        Vec<BankScrape>,
        Vec<ChildRow<i32, Account>>,
        Vec<GrandchildRow<i32, Transaction>>,
    ) {
        let mut heads = Vec::new();
        let mut accounts = Vec::new();
        let mut transactions = Vec::new();
        for scrape in scrapes {
            let mut head = scrape.clone();
            for (j, mut account) in head.accounts.drain(..).enumerate() {
                for (k, tran) in account.transactions.drain(..).enumerate() {
                    transactions.push(GrandchildRow {
                        root: scrape.id,
                        owner: j as i32,
                        position: k as i32,
                        value: tran,
                    });
                }
                accounts.push(ChildRow {
                    parent: scrape.id,
                    position: j as i32,
                    value: account,
                });
            }
            heads.push(head);
        }
        (heads, accounts, transactions)
    }

    #[test]
    fn test_invoices_round_trip_through_rows() {
        let invoices: Vec<Invoice> = create_many(&clock(), 30);
        let (heads, items) = flatten_invoices(&invoices);
        let rebuilt = assemble_invoices(heads, items).unwrap();
        assert_eq!(rebuilt, invoices);
    }

    #[test]
    fn test_scrapes_with_interleaved_parents() {
        let scrapes: Vec<BankScrape> = create_many(&clock(), 20);
        let (heads, mut accounts, mut transactions) = flatten_scrapes(&scrapes);
        // Streams ordered by (position, parent) rather than by parent.
        accounts.sort_by_key(|row| (row.position, row.parent));
        transactions.sort_by_key(|row| (row.position, row.owner, row.root));
        let rebuilt = assemble_scrapes(heads, accounts, transactions).unwrap();
        assert_eq!(rebuilt, scrapes);
    }

    #[test]
    fn test_orphan_child_is_corrupt() {
        let invoices = vec![Invoice::create(&clock(), 4)];
        let (heads, _) = flatten_invoices(&invoices);
        let orphan = ChildRow {
            parent: "404".to_string(),
            position: 0,
            value: Invoice::create(&clock(), 1).items[0].clone(),
        };
        let result = assemble_invoices(heads, vec![orphan]);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_position_gap_is_corrupt() {
        let invoices = vec![Invoice::create(&clock(), 4)];
        let (heads, mut items) = flatten_invoices(&invoices);
        items.remove(1);
        let result = assemble_invoices(heads, items);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_missing_owner_is_corrupt() {
        let scrapes = vec![BankScrape::create(&clock(), 2)];
        let (heads, _, transactions) = flatten_scrapes(&scrapes);
        let result = assemble_scrapes(heads, Vec::new(), transactions);
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_duplicate_root_is_corrupt() {
        let mut graph = GraphBuilder::new();
        graph.push_root(Invoice::create(&clock(), 1)).unwrap();
        assert!(graph.push_root(Invoice::create(&clock(), 1)).is_err());
        assert_eq!(graph.keys(), vec!["1".to_string()]);
    }
}
