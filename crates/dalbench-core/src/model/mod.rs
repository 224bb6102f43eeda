//! Domain model shapes.
//!
//! Three fixed aggregate shapes of increasing structural complexity:
//!
//! - [`simple::Post`]: a flat entity
//! - [`standard::Invoice`]: parent with an ordered list of items
//! - [`complex::BankScrape`]: parent with ordered accounts, each with ordered
//!   transactions, plus a free-form map and a tag set
//!
//! Child positions are not stored on the structs; the index in the owning
//! `Vec` is the position, contiguous from zero.

pub mod complex;
pub mod simple;
pub mod standard;

use std::fmt;
use std::hash::Hash;

pub use complex::{Account, BankScrape, Currency, Transaction};
pub use simple::Post;
pub use standard::{Invoice, Item};

/// An aggregate root addressable by a natural key.
pub trait Aggregate: Clone + PartialEq + fmt::Debug {
    /// Natural key ("URI") used for lookups.
    type Key: Clone + Ord + Hash + fmt::Debug + fmt::Display;

    /// Field that range subsets and reports are ordered by.
    type Order: Clone + PartialOrd + fmt::Debug;

    /// Shape name used in logs.
    const NAME: &'static str;

    /// The natural key of this aggregate.
    fn key(&self) -> Self::Key;

    /// The value of the ordering field.
    fn order(&self) -> Self::Order;

    /// Check whether the aggregate falls inside an inclusive window.
    fn satisfies(&self, window: &Window<Self::Order>) -> bool {
        window.contains(&self.order())
    }
}

/// Inclusive range over an ordering field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Window<V> {
    pub from: V,
    pub until: V,
}

impl<V: PartialOrd> Window<V> {
    /// Create a window covering `from..=until`.
    pub fn new(from: V, until: V) -> Self {
        Self { from, until }
    }

    /// Check whether a value lies inside both bounds.
    pub fn contains(&self, value: &V) -> bool {
        *value >= self.from && *value <= self.until
    }

    /// Narrow this window by another; the result may be empty.
    pub fn intersect(self, other: Self) -> Self {
        let from = if other.from > self.from {
            other.from
        } else {
            self.from
        };
        let until = if other.until < self.until {
            other.until
        } else {
            self.until
        };
        Self { from, until }
    }

    /// Check whether no value can satisfy the window.
    pub fn is_empty(&self) -> bool {
        self.from > self.until
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_inclusive() {
        let w = Window::new(5, 15);
        assert!(w.contains(&5));
        assert!(w.contains(&15));
        assert!(!w.contains(&4));
        assert!(!w.contains(&16));
    }

    #[test]
    fn test_window_intersect() {
        let w = Window::new(0, 10).intersect(Window::new(5, 20));
        assert_eq!(w, Window::new(5, 10));
        assert!(!w.is_empty());

        let disjoint = Window::new(0, 3).intersect(Window::new(5, 8));
        assert!(disjoint.is_empty());
        assert!(!disjoint.contains(&4));
    }
}
