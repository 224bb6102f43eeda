//! Integration tests for the in-process document store.

use chrono::{TimeZone, Utc};
use dalbench_backends::MemoryBackend;
use dalbench_core::factory::{create_many, mutate_all, Synthetic};
use dalbench_core::{Bench, Clock, Invoice, Post, Window};

fn clock() -> Clock {
    Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 30, 15).unwrap())
}

#[test]
fn test_documents_round_trip_whole_graph() {
    let clock = clock();
    let mut invoices: Vec<Invoice> = create_many(&clock, 15);
    let mut store = MemoryBackend::new();
    store.insert_all(&invoices).unwrap();

    mutate_all(&clock, &mut invoices);
    invoices[4].items.truncate(1);
    store.update_all(&invoices).unwrap();

    let found = store.find_single(&"4".to_string()).unwrap();
    assert_eq!(found.as_ref(), Some(&invoices[4]));
    assert_eq!(store.len(), 15);
}

#[test]
fn test_search_all_is_ordered_by_key() {
    let clock = clock();
    let invoices: Vec<Invoice> = create_many(&clock, 12);
    let mut store = MemoryBackend::new();
    store.insert_all(&invoices).unwrap();

    let numbers: Vec<String> = store
        .search_all()
        .unwrap()
        .into_iter()
        .map(|i| i.number)
        .collect();
    let mut expected: Vec<String> = invoices.iter().map(|i| i.number.clone()).collect();
    expected.sort();
    assert_eq!(numbers, expected);
}

#[test]
fn test_query_filters_compose() {
    let clock = clock();
    let posts: Vec<Post> = create_many(&clock, 30);
    let mut store = MemoryBackend::new();
    store.insert_all(&posts).unwrap();

    assert_eq!(store.query().unwrap().count().unwrap(), 30);

    let narrowed = store
        .query()
        .unwrap()
        .filter(Post::subset_window(&clock, 5))
        .filter(Post::subset_window(&clock, 10))
        .to_vec()
        .unwrap();
    assert_eq!(narrowed, posts[10..=15].to_vec());

    let disjoint = store
        .query()
        .unwrap()
        .filter(Window::new(clock.day(0), clock.day(3)))
        .filter(Window::new(clock.day(20), clock.day(25)))
        .count()
        .unwrap();
    assert_eq!(disjoint, 0);
}

#[test]
fn test_query_matches_search_subset() {
    let clock = clock();
    let posts: Vec<Post> = create_many(&clock, 20);
    let mut store = MemoryBackend::new();
    store.insert_all(&posts).unwrap();

    let window = Post::subset_window(&clock, 3);
    let searched = store.search_subset(&window).unwrap();
    let queried = store.query().unwrap().filter(window).to_vec().unwrap();
    assert_eq!(searched, queried);
}

#[test]
fn test_clean_empties_the_store() {
    let clock = clock();
    let mut store = MemoryBackend::<Post>::new();
    store.insert_all(&create_many(&clock, 4)).unwrap();
    store.clean().unwrap();
    store.clean().unwrap();
    assert!(store.is_empty());
    assert!(store.search_all().unwrap().is_empty());
}
