//! Benchmark run configuration.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default number of correctness iterations.
pub const DEFAULT_ITERATIONS: usize = 10;

/// Bounds for the correctness iteration count.
pub const MIN_ITERATIONS: usize = 10;
pub const MAX_ITERATIONS: usize = 50;

/// Default number of natural keys recorded for lookups.
pub const DEFAULT_LOOKUP_POOL: usize = 10;

/// Repetition counts of the timed blocks that loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Repetitions {
    pub search_all: usize,
    pub search_subset: usize,
    pub query_all: usize,
    pub query_filter: usize,
    pub find_many: usize,
    pub find_one: usize,
    pub report: usize,
}

impl Default for Repetitions {
    fn default() -> Self {
        Self {
            search_all: 100,
            search_subset: 3000,
            query_all: 100,
            query_filter: 1000,
            find_many: 2000,
            find_one: 5000,
            report: 1000,
        }
    }
}

impl Repetitions {
    /// Run every looped block `n` times. Handy for tests.
    pub fn uniform(n: usize) -> Self {
        Self {
            search_all: n,
            search_subset: n,
            query_all: n,
            query_filter: n,
            find_many: n,
            find_one: n,
            report: n,
        }
    }
}

/// Configuration of one benchmark run.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    /// Number of aggregates in the throughput pass.
    pub data: usize,

    /// Correctness iterations before timing starts.
    pub iterations: usize,

    /// Repetitions of the looped timed blocks.
    pub repetitions: Repetitions,

    /// Maximum number of keys cycled through by the lookup blocks.
    pub lookup_pool: usize,

    /// Per-operation deadline handed to the adapters.
    pub deadline: Option<Duration>,
}

impl BenchConfig {
    /// Create a configuration for `data` aggregates.
    pub fn new(data: usize) -> Self {
        Self {
            data,
            iterations: DEFAULT_ITERATIONS,
            repetitions: Repetitions::default(),
            lookup_pool: DEFAULT_LOOKUP_POOL,
            deadline: None,
        }
    }

    /// Set the correctness iteration count, clamped to the supported range.
    pub fn with_iterations(mut self, iterations: usize) -> Self {
        self.iterations = iterations.clamp(MIN_ITERATIONS, MAX_ITERATIONS);
        self
    }

    /// Replace the repetition counts.
    pub fn with_repetitions(mut self, repetitions: Repetitions) -> Self {
        self.repetitions = repetitions;
        self
    }

    /// Set the lookup pool size.
    pub fn with_lookup_pool(mut self, size: usize) -> Self {
        self.lookup_pool = size;
        self
    }

    /// Set the per-operation deadline.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Indexes `data/3 ..` whose keys feed the lookup blocks.
    ///
    /// Bounded by the pool size and by the half of the data set that the
    /// lookup blocks run against.
    pub fn lookup_indexes(&self) -> std::ops::Range<usize> {
        let half = self.data / 2;
        let start = (self.data / 3).min(half.saturating_sub(1));
        let end = half.min(start + self.lookup_pool);
        start..end.max(start)
    }

    /// Check that the throughput pass can run at all.
    pub fn validate(&self) -> Result<()> {
        if self.data < 2 {
            return Err(Error::Config(format!(
                "data size must be at least 2, got {}",
                self.data
            )));
        }
        if self.lookup_indexes().is_empty() {
            return Err(Error::Config("lookup pool must not be empty".into()));
        }
        Ok(())
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self::new(1000)
    }
}
