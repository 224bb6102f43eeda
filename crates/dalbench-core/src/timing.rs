//! Timed block output.
//!
//! Each timed block produces one `name = milliseconds` line. Blocks an adapter
//! cannot run still produce a line with the `-1` sentinel so the output
//! always has the same lines in the same order.

use std::io::Write;
use std::time::{Duration, Instant};

use crate::error::Result;

/// Value written for blocks the adapter does not support.
pub const UNSUPPORTED: i64 = -1;

/// Destination of timing results.
pub trait TimingSink {
    /// Record the duration of a block.
    fn record(&mut self, name: &str, elapsed: Duration) -> Result<()>;

    /// Record that a block was skipped as unsupported.
    fn unsupported(&mut self, name: &str) -> Result<()>;
}

/// Writes `name = value` lines, flushing after each so a crash keeps the
/// lines already produced.
pub struct LineSink<W: Write> {
    out: W,
}

impl<W: Write> LineSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn line(&mut self, name: &str, value: i64) -> Result<()> {
        writeln!(self.out, "{name} = {value}")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> TimingSink for LineSink<W> {
    fn record(&mut self, name: &str, elapsed: Duration) -> Result<()> {
        self.line(name, elapsed.as_millis() as i64)
    }

    fn unsupported(&mut self, name: &str) -> Result<()> {
        self.line(name, UNSUPPORTED)
    }
}

/// Collects results in memory.
#[derive(Debug, Default, Clone)]
pub struct Timings {
    entries: Vec<(String, Option<Duration>)>,
}

impl Timings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block names in the order they were recorded.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Duration of a block; `None` when absent or unsupported.
    pub fn get(&self, name: &str) -> Option<Duration> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .and_then(|(_, elapsed)| *elapsed)
    }

    /// Check whether a block was recorded as unsupported.
    pub fn is_unsupported(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|(n, elapsed)| n == name && elapsed.is_none())
    }
}

impl TimingSink for Timings {
    fn record(&mut self, name: &str, elapsed: Duration) -> Result<()> {
        self.entries.push((name.to_string(), Some(elapsed)));
        Ok(())
    }

    fn unsupported(&mut self, name: &str) -> Result<()> {
        self.entries.push((name.to_string(), None));
        Ok(())
    }
}

/// Run `block` and report its wall-clock duration to `sink`.
pub fn timed<S, F>(sink: &mut S, name: &str, block: F) -> Result<()>
where
    S: TimingSink + ?Sized,
    F: FnOnce() -> Result<()>,
{
    let start = Instant::now();
    block()?;
    let elapsed = start.elapsed();
    tracing::debug!(block = name, elapsed_ms = elapsed.as_millis() as u64, "timed block finished");
    sink.record(name, elapsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;

    #[test]
    fn test_line_format() {
        let mut sink = LineSink::new(Vec::new());
        sink.record("bulk_insert", Duration::from_millis(1234)).unwrap();
        sink.unsupported("query_all").unwrap();
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(out, "bulk_insert = 1234\nquery_all = -1\n");
    }

    #[test]
    fn test_timed_propagates_failure_without_recording() {
        let mut timings = Timings::new();
        let result = timed(&mut timings, "find_one", || Err(Error::assertion("missing")));
        assert!(result.is_err());
        assert!(timings.names().is_empty());

        timed(&mut timings, "find_one", || Ok(())).unwrap();
        assert_eq!(timings.names(), vec!["find_one"]);
        assert!(timings.get("find_one").is_some());
        assert!(!timings.is_unsupported("find_one"));
    }
}
