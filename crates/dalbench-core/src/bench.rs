//! The capability every persistence adapter implements.

use crate::error::Result;
use crate::model::{Aggregate, Window};
use crate::report::{Report, ReportRequest};

/// Data-access operations exercised by the benchmark protocol.
///
/// All operations are synchronous and single-threaded. Writes are atomic:
/// a failing `insert_all`/`update_all` leaves no partial state behind.
pub trait Bench<T: Aggregate> {
    /// Delete every stored aggregate of this shape. Idempotent.
    fn clean(&mut self) -> Result<()>;

    /// Refresh planner statistics. Advisory; callers log failures and go on.
    fn analyze(&mut self) -> Result<()>;

    /// Every aggregate, fully hydrated, ordered by key.
    fn search_all(&mut self) -> Result<Vec<T>>;

    /// Aggregates whose ordering field lies inside the window, ordered by key.
    fn search_subset(&mut self, window: &Window<T::Order>) -> Result<Vec<T>>;

    /// Composable query surface, if the adapter offers one.
    fn query(&mut self) -> Option<Query<'_, T>> {
        None
    }

    /// Point lookup. A missing key is `Ok(None)`, not an error.
    fn find_single(&mut self, key: &T::Key) -> Result<Option<T>>;

    /// Set lookup, ordered by key. Missing keys are skipped.
    fn find_many(&mut self, keys: &[T::Key]) -> Result<Vec<T>>;

    /// Insert aggregates in one transaction.
    fn insert_all(&mut self, values: &[T]) -> Result<()>;

    /// Replace aggregates (matched by key) in one transaction.
    fn update_all(&mut self, values: &[T]) -> Result<()>;

    /// Insert a single aggregate.
    fn insert(&mut self, value: &T) -> Result<()> {
        self.insert_all(std::slice::from_ref(value))
    }

    /// Replace a single aggregate.
    fn update(&mut self, value: &T) -> Result<()> {
        self.update_all(std::slice::from_ref(value))
    }

    /// Run the six report reads.
    fn report(&mut self, request: &ReportRequest<T>) -> Result<Report<T>>;
}

/// Executes composed queries on behalf of [`Query`].
pub trait QuerySource<T: Aggregate> {
    /// Fetch aggregates matching the optional window, ordered by key.
    fn fetch(&mut self, window: Option<&Window<T::Order>>) -> Result<Vec<T>>;
}

/// A lazily composed query. Nothing runs until [`Query::to_vec`].
pub struct Query<'a, T: Aggregate> {
    source: &'a mut dyn QuerySource<T>,
    window: Option<Window<T::Order>>,
}

impl<'a, T: Aggregate> Query<'a, T> {
    /// Start an unfiltered query over a source.
    pub fn new(source: &'a mut dyn QuerySource<T>) -> Self {
        Self {
            source,
            window: None,
        }
    }

    /// Restrict to a window; successive filters intersect.
    pub fn filter(mut self, window: Window<T::Order>) -> Self {
        self.window = Some(match self.window.take() {
            Some(current) => current.intersect(window),
            None => window,
        });
        self
    }

    /// The composed window, if any.
    pub fn window(&self) -> Option<&Window<T::Order>> {
        self.window.as_ref()
    }

    /// Execute and collect.
    pub fn to_vec(self) -> Result<Vec<T>> {
        match &self.window {
            Some(window) if window.is_empty() => Ok(Vec::new()),
            window => self.source.fetch(window.as_ref()),
        }
    }

    /// Execute and count.
    pub fn count(self) -> Result<usize> {
        self.to_vec().map(|values| values.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Post;
    use chrono::NaiveDate;
    use uuid::Uuid;

    struct Posts {
        rows: Vec<Post>,
        fetches: usize,
    }

    impl QuerySource<Post> for Posts {
        fn fetch(&mut self, window: Option<&Window<NaiveDate>>) -> Result<Vec<Post>> {
            self.fetches += 1;
            Ok(self
                .rows
                .iter()
                .filter(|p| window.map_or(true, |w| p.satisfies(w)))
                .cloned()
                .collect())
        }
    }

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn posts() -> Posts {
        let rows = (1..=9)
            .map(|d| Post {
                id: Uuid::from_u128(d as u128),
                title: format!("title {d}"),
                created: date(d),
            })
            .collect();
        Posts { rows, fetches: 0 }
    }

    #[test]
    fn test_query_is_lazy() {
        let mut source = posts();
        let query = Query::new(&mut source).filter(Window::new(date(2), date(4)));
        assert!(query.window().is_some());
        drop(query);
        assert_eq!(source.fetches, 0);
    }

    #[test]
    fn test_filters_compose() {
        let mut source = posts();
        let found = Query::new(&mut source)
            .filter(Window::new(date(2), date(6)))
            .filter(Window::new(date(5), date(9)))
            .to_vec()
            .unwrap();
        let days: Vec<_> = found.iter().map(|p| p.created).collect();
        assert_eq!(days, vec![date(5), date(6)]);
    }

    #[test]
    fn test_empty_window_skips_source() {
        let mut source = posts();
        let count = Query::new(&mut source)
            .filter(Window::new(date(1), date(2)))
            .filter(Window::new(date(5), date(6)))
            .count()
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(source.fetches, 0);
    }
}
