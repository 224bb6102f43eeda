//! Synthetic data generation.
//!
//! Every aggregate is a pure function of its integer index and the run's
//! [`Clock`], so two backends fed the same clock see identical data.

use std::collections::{BTreeMap, BTreeSet};

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::Clock;
use crate::model::{
    Account, Aggregate, BankScrape, Currency, Invoice, Item, Post, Transaction, Window,
};

/// Deterministic construction and mutation of the `i`-th aggregate of a shape.
pub trait Synthetic: Aggregate + Sized {
    /// Build the `i`-th aggregate.
    fn create(clock: &Clock, i: i32) -> Self;

    /// Apply the deterministic benchmark mutation. Never changes the key.
    fn mutate(&mut self, clock: &Clock, i: i32);

    /// Natural key of the `i`-th aggregate.
    fn key_for(i: i32) -> Self::Key;

    /// Window used by `search_subset` and filtered queries for index `i`.
    fn subset_window(clock: &Clock, i: i32) -> Window<Self::Order>;

    /// Window used by the report for index `i`.
    fn report_window(clock: &Clock, i: i32) -> Window<Self::Order>;
}

/// Build `count` aggregates for indexes `0..count`.
pub fn create_many<T: Synthetic>(clock: &Clock, count: usize) -> Vec<T> {
    (0..count).map(|i| T::create(clock, i as i32)).collect()
}

/// Mutate every aggregate with its own index.
pub fn mutate_all<T: Synthetic>(clock: &Clock, values: &mut [T]) {
    for (i, value) in values.iter_mut().enumerate() {
        value.mutate(clock, i as i32);
    }
}

// -------------------------------------------------------------------------
// Simple
// -------------------------------------------------------------------------

/// UUID whose leading fields encode the index.
pub fn post_id(i: i32) -> Uuid {
    Uuid::from_fields(i as u32, i as u16, (i as u8) as u16, &[0u8; 8])
}

impl Synthetic for Post {
    fn create(clock: &Clock, i: i32) -> Self {
        Post {
            id: post_id(i),
            title: format!("title {i}"),
            created: clock.day(i as i64),
        }
    }

    fn mutate(&mut self, _clock: &Clock, _i: i32) {
        self.title.push('!');
    }

    fn key_for(i: i32) -> Uuid {
        post_id(i)
    }

    fn subset_window(clock: &Clock, i: i32) -> Window<Self::Order> {
        Window::new(clock.day(i as i64), clock.day(i as i64 + 10))
    }

    fn report_window(clock: &Clock, i: i32) -> Window<Self::Order> {
        Window::new(clock.day(i as i64), clock.day(i as i64 + 6))
    }
}

// -------------------------------------------------------------------------
// Standard
// -------------------------------------------------------------------------

impl Synthetic for Invoice {
    fn create(clock: &Clock, i: i32) -> Self {
        let items = (0..i % 10)
            .map(|j| Item {
                product: format!("prod {i} - {j}"),
                cost: Decimal::from(i + j * j) / Decimal::from(100),
                quantity: i / 100 + j / 2 + 1,
                tax_group: Decimal::from(5 + i % 20),
                discount: Decimal::from(if i % 3 == 0 { i % 10 + 5 } else { 0 }),
            })
            .collect();

        Invoice {
            number: i.to_string(),
            total: Decimal::from(100 + i),
            due_date: clock.day((i / 2) as i64),
            paid: (i % 3 == 0).then(|| clock.midnight(i as i64)),
            reference: (i % 7 == 0).then(|| i.to_string()),
            tax: Decimal::from(15 + i % 10),
            version: i as i64,
            canceled: i % 5 == 0,
            items,
        }
    }

    fn mutate(&mut self, clock: &Clock, i: i32) {
        self.paid = Some(clock.millis(i as i64));
        let changed = self.items.len() / 3;
        for item in self.items.iter_mut().take(changed) {
            item.product.push_str(" !");
        }
    }

    fn key_for(i: i32) -> String {
        i.to_string()
    }

    fn subset_window(_clock: &Clock, i: i32) -> Window<i64> {
        Window::new(i as i64, i as i64 + 10)
    }

    fn report_window(_clock: &Clock, i: i32) -> Window<i64> {
        Window::new(i as i64, i as i64 + 6)
    }
}

// -------------------------------------------------------------------------
// Complex
// -------------------------------------------------------------------------

fn scrape_info(i: i32) -> BTreeMap<String, String> {
    (0..(i / 3) % 10)
        .map(|j| (format!("key{j}"), format!("value {i}")))
        .collect()
}

fn scrape_tags(i: i32) -> BTreeSet<String> {
    let start = i % 20;
    (start..start + i % 6).map(|n| format!("tag{n}")).collect()
}

fn scrape_account(clock: &Clock, i: i32, j: i32) -> Account {
    let transactions = (0..(i + j) % 300)
        .map(|k| Transaction {
            date: clock.day((i + j + k) as i64),
            description: format!("transaction {i} at {k}"),
            currency: Currency::from_ordinal(k as usize),
            amount: Decimal::from(i / (j + k + 100)),
        })
        .collect();

    Account {
        balance: Decimal::from(55 + i / (j + 1) - j * j),
        number: format!("{i}-{j}"),
        name: format!("acc {i} - {j}"),
        notes: format!("some notes {:x>width$}", i, width = (j * 10) as usize),
        transactions,
    }
}

impl Synthetic for BankScrape {
    fn create(clock: &Clock, i: i32) -> Self {
        BankScrape {
            id: i,
            website: format!("https://dsl-platform.com/benchmark/{i}"),
            at: clock.now(),
            info: scrape_info(i),
            external_id: (i % 3 != 0).then(|| i.to_string()),
            ranking: i,
            tags: scrape_tags(i),
            created_at: clock.minutes(i as i64),
            accounts: (0..i % 10).map(|j| scrape_account(clock, i, j)).collect(),
        }
    }

    fn mutate(&mut self, clock: &Clock, i: i32) {
        self.at = clock.millis(i as i64);
        let changed = self.accounts.len() / 3;
        for account in self.accounts.iter_mut().take(changed) {
            account.balance += Decimal::from(10);
            let touched = account.transactions.len() / 5;
            for tran in account.transactions.iter_mut().take(touched) {
                tran.amount += Decimal::from(5);
            }
        }
    }

    fn key_for(i: i32) -> i32 {
        i
    }

    fn subset_window(clock: &Clock, i: i32) -> Window<Self::Order> {
        Window::new(clock.minutes(i as i64), clock.minutes(i as i64 + 10))
    }

    fn report_window(clock: &Clock, i: i32) -> Window<Self::Order> {
        Self::subset_window(clock, i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn clock() -> Clock {
        Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap())
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a: Vec<BankScrape> = create_many(&clock(), 25);
        let b: Vec<BankScrape> = create_many(&clock(), 25);
        assert_eq!(a, b);
    }

    #[test]
    fn test_post_values() {
        let post = Post::create(&clock(), 3);
        assert_eq!(post.id, post_id(3));
        assert_eq!(post.title, "title 3");
        assert_eq!(post.created, clock().day(3));
        assert_ne!(post_id(3), post_id(4));
        assert!(Post::subset_window(&clock(), 3).contains(&post.created));
        assert!(!Post::subset_window(&clock(), 4).contains(&post.created));
    }

    #[test]
    fn test_invoice_values() {
        let clock = clock();
        let invoice = Invoice::create(&clock, 21);
        assert_eq!(invoice.number, "21");
        assert_eq!(invoice.items.len(), 1);
        assert_eq!(invoice.paid, Some(clock.midnight(21)));
        assert_eq!(invoice.reference.as_deref(), Some("21"));
        assert!(!invoice.canceled);
        assert_eq!(invoice.items[0].cost, Decimal::new(21, 2));
        assert_eq!(invoice.items[0].discount, Decimal::from(6));

        let five = Invoice::create(&clock, 5);
        assert_eq!(five.items.len(), 5);
        assert!(five.paid.is_none());
        assert!(five.canceled);
    }

    #[test]
    fn test_invoice_mutation_touches_first_third() {
        let clock = clock();
        let mut invoice = Invoice::create(&clock, 9);
        invoice.mutate(&clock, 9);
        assert_eq!(invoice.paid, Some(clock.millis(9)));
        let changed = invoice
            .items
            .iter()
            .filter(|item| item.product.ends_with(" !"))
            .count();
        assert_eq!(changed, 3);
        assert_eq!(invoice.key(), Invoice::key_for(9));
    }

    #[test]
    fn test_scrape_values() {
        let clock = clock();
        let scrape = BankScrape::create(&clock, 14);
        assert_eq!(scrape.accounts.len(), 4);
        assert_eq!(scrape.info.len(), 4);
        assert_eq!(
            scrape.tags.iter().cloned().collect::<Vec<_>>(),
            vec!["tag14", "tag15"]
        );
        assert_eq!(scrape.external_id.as_deref(), Some("14"));
        assert_eq!(scrape.accounts[1].balance, Decimal::from(55 + 7 - 1));
        assert_eq!(scrape.accounts[1].notes, "some notes xxxxxxxx14");
        assert_eq!(scrape.accounts[2].transactions.len(), 16);
        assert_eq!(
            scrape.accounts[0].transactions[4].currency,
            Currency::USD
        );
        assert_eq!(scrape.created_at, clock.minutes(14));
    }

    #[test]
    fn test_scrape_mutation() {
        let clock = clock();
        let original = BankScrape::create(&clock, 17);
        let mut scrape = original.clone();
        scrape.mutate(&clock, 17);

        assert_eq!(scrape.accounts.len(), 7);
        for (j, (before, after)) in original.accounts.iter().zip(&scrape.accounts).enumerate() {
            if j < 2 {
                assert_eq!(after.balance, before.balance + Decimal::from(10));
                let touched = before.transactions.len() / 5;
                assert_eq!(
                    after.transactions[0].amount,
                    before.transactions[0].amount + Decimal::from(if touched > 0 { 5 } else { 0 })
                );
            } else {
                assert_eq!(after, before);
            }
        }
        assert_eq!(scrape.at, clock.millis(17));
    }
}
