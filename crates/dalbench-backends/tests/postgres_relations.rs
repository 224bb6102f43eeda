//! Integration tests for the relational mapping over PostgreSQL.
//!
//! These need a live server and are ignored by default. Run them with
//! `DATABASE_URL=postgres://... cargo test -p dalbench-backends -- --ignored`.

use std::sync::{Mutex, MutexGuard};

use chrono::{TimeZone, Utc};
use dalbench_backends::{ConnectionConfig, PostgresBackend};
use dalbench_core::factory::{create_many, Synthetic};
use dalbench_core::report::evaluate;
use dalbench_core::{
    run_benchmark, Aggregate, BankScrape, Bench, BenchConfig, Clock, Invoice, Post, ReportRequest,
    Repetitions, Timings, BLOCKS,
};
use rust_decimal::Decimal;

// Every test shares one database, so they run one at a time.
static SERVER: Mutex<()> = Mutex::new(());

struct TestContext {
    backend: PostgresBackend,
    _guard: MutexGuard<'static, ()>,
}

impl TestContext {
    /// Connect to `DATABASE_URL` with empty tables, or `None` when unset.
    fn new() -> Option<Self> {
        let url = std::env::var("DATABASE_URL").ok()?;
        let guard = SERVER.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut backend =
            PostgresBackend::connect(&ConnectionConfig::new().with_database_url(url)).unwrap();
        Bench::<Post>::clean(&mut backend).unwrap();
        Bench::<Invoice>::clean(&mut backend).unwrap();
        Bench::<BankScrape>::clean(&mut backend).unwrap();
        Some(Self {
            backend,
            _guard: guard,
        })
    }
}

fn clock() -> Clock {
    Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 15).unwrap())
}

fn by_key<T: Aggregate>(mut values: Vec<T>) -> Vec<T> {
    values.sort_by_key(|v| v.key());
    values
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_protocol_runs_for_every_shape() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let clock = clock();
    let config = BenchConfig::new(21).with_repetitions(Repetitions::uniform(4));

    let mut timings = Timings::new();
    run_benchmark::<Post, _>(&mut ctx.backend, &clock, &config, &mut timings).unwrap();
    assert_eq!(timings.names(), BLOCKS.to_vec());
    assert!(timings.is_unsupported("query_all"));

    let mut timings = Timings::new();
    run_benchmark::<Invoice, _>(&mut ctx.backend, &clock, &config, &mut timings).unwrap();
    assert_eq!(timings.names(), BLOCKS.to_vec());

    let mut timings = Timings::new();
    run_benchmark::<BankScrape, _>(&mut ctx.backend, &clock, &config, &mut timings).unwrap();
    assert_eq!(timings.names(), BLOCKS.to_vec());
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_scrape_round_trip_keeps_json_and_tags() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let scrapes: Vec<BankScrape> = create_many(&clock(), 12);
    ctx.backend.insert_all(&scrapes).unwrap();

    let stored: Vec<BankScrape> = ctx.backend.search_all().unwrap();
    assert_eq!(stored, scrapes);
    let found: Option<BankScrape> = ctx.backend.find_single(&7).unwrap();
    assert_eq!(found.as_ref(), Some(&scrapes[7]));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_shrinking_then_growing_items() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let clock = clock();
    let original = Invoice::create(&clock, 5);
    assert_eq!(original.items.len(), 5);
    ctx.backend.insert(&original).unwrap();

    let mut invoice = original.clone();
    invoice.items.truncate(3);
    invoice.items[1].product = "changed".to_string();
    ctx.backend.update(&invoice).unwrap();
    let stored: Option<Invoice> = ctx.backend.find_single(&invoice.number).unwrap();
    assert_eq!(stored.as_ref(), Some(&invoice));

    // Stale rows at positions 3 and 4 would collide with these inserts.
    invoice.items.extend(original.items[3..].iter().cloned());
    ctx.backend.update(&invoice).unwrap();
    let stored: Vec<Invoice> = ctx.backend.search_all().unwrap();
    assert_eq!(stored, vec![invoice]);
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_nested_reconciliation() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let clock = clock();
    let mut scrape = BankScrape::create(&clock, 9);
    ctx.backend.insert(&scrape).unwrap();

    scrape.accounts.truncate(4);
    scrape.accounts[0].transactions.truncate(2);
    scrape.accounts[1].balance += Decimal::ONE;
    ctx.backend.update(&scrape).unwrap();

    let stored: Option<BankScrape> = ctx.backend.find_single(&scrape.id).unwrap();
    assert_eq!(stored.as_ref(), Some(&scrape));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_key_sets_and_windows() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let clock = clock();
    let invoices: Vec<Invoice> = create_many(&clock, 20);
    ctx.backend.insert_all(&invoices).unwrap();

    let keys = vec![
        invoices[2].number.clone(),
        "missing".to_string(),
        invoices[11].number.clone(),
    ];
    let found: Vec<Invoice> = ctx.backend.find_many(&keys).unwrap();
    assert_eq!(found, by_key(vec![invoices[2].clone(), invoices[11].clone()]));

    let window = Invoice::subset_window(&clock, 4);
    let subset: Vec<Invoice> = ctx.backend.search_subset(&window).unwrap();
    let expected: Vec<Invoice> = invoices
        .iter()
        .filter(|invoice| invoice.satisfies(&window))
        .cloned()
        .collect();
    assert_eq!(subset, by_key(expected));
}

#[test]
#[ignore = "requires DATABASE_URL"]
fn test_report_matches_reference_evaluation() {
    let Some(mut ctx) = TestContext::new() else {
        return;
    };
    let clock = clock();
    let posts: Vec<Post> = create_many(&clock, 30);
    let invoices: Vec<Invoice> = create_many(&clock, 30);
    let scrapes: Vec<BankScrape> = create_many(&clock, 30);
    ctx.backend.insert_all(&posts).unwrap();
    ctx.backend.insert_all(&invoices).unwrap();
    ctx.backend.insert_all(&scrapes).unwrap();

    let posts = by_key(posts);
    let invoices = by_key(invoices);
    for i in [0, 4, 11, 25] {
        let request = ReportRequest::for_index(&clock, i);
        assert_eq!(ctx.backend.report(&request).unwrap(), evaluate(&posts, &request));

        let request = ReportRequest::for_index(&clock, i);
        assert_eq!(ctx.backend.report(&request).unwrap(), evaluate(&invoices, &request));

        let request = ReportRequest::for_index(&clock, i);
        assert_eq!(ctx.backend.report(&request).unwrap(), evaluate(&scrapes, &request));
    }
}
