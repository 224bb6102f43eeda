//! The six-way report read.

use std::collections::HashMap;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::factory::Synthetic;
use crate::model::{Aggregate, Window};

/// Offsets of the keys looked up by `find_many`, relative to the report index.
pub const FIND_MANY_OFFSETS: [i32; 4] = [0, 2, 5, 7];

/// Limit of the ascending slice.
pub const TOP_FIVE: usize = 5;

/// Limit of the descending slice.
pub const LAST_TEN: usize = 10;

/// Parameters of one report, derived from an index.
#[derive(Debug, Clone)]
pub struct ReportRequest<T: Aggregate> {
    pub find_one: T::Key,
    pub find_many: Vec<T::Key>,
    pub window: Window<T::Order>,
}

impl<T: Synthetic> ReportRequest<T> {
    /// Build the request for index `i`.
    pub fn for_index(clock: &Clock, i: i32) -> Self {
        Self {
            find_one: T::key_for(i),
            find_many: FIND_MANY_OFFSETS.iter().map(|o| T::key_for(i + o)).collect(),
            window: T::report_window(clock, i),
        }
    }
}

/// Results of the six report reads, each fully hydrated.
#[derive(Debug, Clone, PartialEq)]
pub struct Report<T> {
    /// Point lookup of the request key.
    pub find_one: Option<T>,
    /// Set lookup of the four request keys, ordered by key.
    pub find_many: Vec<T>,
    /// Earliest aggregate at or after the window start.
    pub find_first: Option<T>,
    /// Latest aggregate at or before the window end.
    pub find_last: Option<T>,
    /// First five inside the window, ascending.
    pub top_five: Vec<T>,
    /// Last ten inside the window, descending.
    pub last_ten: Vec<T>,
}

impl<T> Report<T> {
    /// Check that every slot produced at least one aggregate.
    pub fn is_complete(&self) -> bool {
        self.find_one.is_some()
            && self.find_first.is_some()
            && self.find_last.is_some()
            && !self.find_many.is_empty()
            && !self.top_five.is_empty()
            && !self.last_ten.is_empty()
    }
}

/// Report slot, in the order the relational adapters tag their key rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum Slot {
    FindOne = 0,
    FindMany = 1,
    FindFirst = 2,
    FindLast = 3,
    TopFive = 4,
    LastTen = 5,
}

impl Slot {
    pub const ALL: [Slot; 6] = [
        Slot::FindOne,
        Slot::FindMany,
        Slot::FindFirst,
        Slot::FindLast,
        Slot::TopFive,
        Slot::LastTen,
    ];

    pub fn from_tag(tag: i64) -> Result<Self> {
        Slot::ALL
            .into_iter()
            .find(|slot| *slot as i64 == tag)
            .ok_or_else(|| Error::Corrupt(format!("unknown report slot {tag}")))
    }
}

/// Keys selected for each slot, before hydration.
///
/// Relational adapters resolve all slots in one statement, hydrate the union
/// of keys with one batched graph load and then call [`ReportKeys::resolve`].
#[derive(Debug, Clone)]
pub struct ReportKeys<K> {
    slots: [Vec<K>; 6],
}

impl<K> Default for ReportKeys<K> {
    fn default() -> Self {
        Self {
            slots: Default::default(),
        }
    }
}

impl<K: Clone + Eq + std::hash::Hash + std::fmt::Display> ReportKeys<K> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a key to a slot. Keys must arrive in slot order.
    pub fn push(&mut self, slot: Slot, key: K) {
        self.slots[slot as usize].push(key);
    }

    /// Keys recorded for a slot.
    pub fn slot(&self, slot: Slot) -> &[K] {
        &self.slots[slot as usize]
    }

    /// Distinct keys across all slots, in first-seen order.
    pub fn distinct(&self) -> Vec<K> {
        let mut seen = std::collections::HashSet::new();
        self.slots
            .iter()
            .flatten()
            .filter(|key| seen.insert((*key).clone()))
            .cloned()
            .collect()
    }

    /// Distribute hydrated aggregates into the slots.
    pub fn resolve<T>(self, hydrated: Vec<T>) -> Result<Report<T>>
    where
        T: Aggregate<Key = K>,
    {
        let by_key: HashMap<K, T> = hydrated.into_iter().map(|v| (v.key(), v)).collect();
        let pick = |keys: &[K]| -> Result<Vec<T>> {
            keys.iter()
                .map(|key| {
                    by_key.get(key).cloned().ok_or_else(|| {
                        Error::Corrupt(format!("report key {key} vanished during hydration"))
                    })
                })
                .collect()
        };
        let first = |keys: &[K]| -> Result<Option<T>> { Ok(pick(keys)?.into_iter().next()) };

        Ok(Report {
            find_one: first(self.slot(Slot::FindOne))?,
            find_many: pick(self.slot(Slot::FindMany))?,
            find_first: first(self.slot(Slot::FindFirst))?,
            find_last: first(self.slot(Slot::FindLast))?,
            top_five: pick(self.slot(Slot::TopFive))?,
            last_ten: pick(self.slot(Slot::LastTen))?,
        })
    }
}

/// Evaluate a report against an in-memory, key-ordered collection.
///
/// Used by adapters without a query language; also the reference semantics
/// the relational adapters must match.
pub fn evaluate<T: Aggregate>(sorted: &[T], request: &ReportRequest<T>) -> Report<T> {
    let window = &request.window;
    let find_one = sorted.iter().find(|v| v.key() == request.find_one).cloned();
    let find_many = sorted
        .iter()
        .filter(|v| request.find_many.contains(&v.key()))
        .cloned()
        .collect();

    let mut ascending: Vec<&T> = sorted.iter().collect();
    ascending.sort_by(|a, b| {
        a.order()
            .partial_cmp(&b.order())
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let find_first = ascending
        .iter()
        .find(|v| v.order() >= window.from)
        .map(|v| (*v).clone());
    let find_last = ascending
        .iter()
        .rev()
        .find(|v| v.order() <= window.until)
        .map(|v| (*v).clone());
    let top_five = ascending
        .iter()
        .filter(|v| v.satisfies(window))
        .take(TOP_FIVE)
        .map(|v| (*v).clone())
        .collect();
    let last_ten = ascending
        .iter()
        .rev()
        .filter(|v| v.satisfies(window))
        .take(LAST_TEN)
        .map(|v| (*v).clone())
        .collect();

    Report {
        find_one,
        find_many,
        find_first,
        find_last,
        top_five,
        last_ten,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::create_many;
    use crate::model::Invoice;
    use chrono::{TimeZone, Utc};

    fn clock() -> Clock {
        Clock::fixed(Utc.with_ymd_and_hms(2024, 5, 10, 8, 0, 0).unwrap())
    }

    #[test]
    fn test_request_for_index() {
        let request = ReportRequest::<Invoice>::for_index(&clock(), 3);
        assert_eq!(request.find_one, "3");
        assert_eq!(request.find_many, vec!["3", "5", "8", "10"]);
        assert_eq!(request.window, Window::new(3, 9));
    }

    #[test]
    fn test_evaluate_single_aggregate() {
        let all: Vec<Invoice> = create_many(&clock(), 5);
        let only = vec![all[4].clone()];
        let report = evaluate(&only, &ReportRequest::for_index(&clock(), 4));
        assert!(report.is_complete());
        assert_eq!(report.find_many.len(), 1);
        assert_eq!(report.top_five.len(), 1);
        assert_eq!(report.last_ten.len(), 1);
        assert_eq!(report.find_one.as_ref(), Some(&only[0]));
    }

    #[test]
    fn test_evaluate_limits_and_direction() {
        let mut all: Vec<Invoice> = create_many(&clock(), 40);
        all.sort_by_key(|i| i.number.clone());
        let report = evaluate(&all, &ReportRequest::for_index(&clock(), 10));

        let versions = |v: &[Invoice]| v.iter().map(|i| i.version).collect::<Vec<_>>();
        assert_eq!(versions(&report.top_five), vec![10, 11, 12, 13, 14]);
        assert_eq!(versions(&report.last_ten), vec![16, 15, 14, 13, 12, 11, 10]);
        assert_eq!(report.find_first.unwrap().version, 10);
        assert_eq!(report.find_last.unwrap().version, 16);
        assert_eq!(report.find_many.len(), 4);
    }

    #[test]
    fn test_keys_resolve() {
        let all: Vec<Invoice> = create_many(&clock(), 6);
        let mut keys = ReportKeys::new();
        keys.push(Slot::FindOne, "2".to_string());
        keys.push(Slot::FindMany, "2".to_string());
        keys.push(Slot::FindMany, "4".to_string());
        keys.push(Slot::LastTen, "5".to_string());
        keys.push(Slot::LastTen, "4".to_string());
        assert_eq!(keys.distinct(), vec!["2", "4", "5"]);

        let report = keys.resolve(all.clone()).unwrap();
        assert_eq!(report.find_one, Some(all[2].clone()));
        assert_eq!(report.find_many, vec![all[2].clone(), all[4].clone()]);
        assert_eq!(report.last_ten, vec![all[5].clone(), all[4].clone()]);
        assert!(report.find_first.is_none());
        assert!(report.top_five.is_empty());
    }

    #[test]
    fn test_keys_resolve_detects_missing() {
        let mut keys = ReportKeys::new();
        keys.push(Slot::TopFive, "99".to_string());
        let result = keys.resolve(Vec::<Invoice>::new());
        assert!(matches!(result, Err(Error::Corrupt(_))));
    }

    #[test]
    fn test_slot_tags() {
        for slot in Slot::ALL {
            assert_eq!(Slot::from_tag(slot as i64).unwrap(), slot);
        }
        assert!(Slot::from_tag(9).is_err());
    }
}
