//! The two-phase benchmark protocol.
//!
//! Phase 1 verifies an adapter against single aggregates; any mismatch
//! aborts the run before timing starts. Phase 2 times bulk and looped
//! operations over the full data set and writes one line per block.

use tracing::{debug, info, warn};

use crate::bench::Bench;
use crate::clock::Clock;
use crate::config::BenchConfig;
use crate::error::{Error, Result};
use crate::factory::{create_many, mutate_all, Synthetic};
use crate::model::Aggregate;
use crate::report::ReportRequest;
use crate::timing::{timed, TimingSink};

/// Names of the timed blocks, in output order.
pub const BLOCKS: [&str; 11] = [
    "bulk_insert",
    "bulk_update",
    "loop_insert_half",
    "loop_update_half",
    "search_all",
    "search_subset",
    "query_all",
    "query_filter",
    "find_many",
    "find_one",
    "report",
];

/// Run both phases against one adapter.
pub fn run_benchmark<T, B>(
    bench: &mut B,
    clock: &Clock,
    config: &BenchConfig,
    sink: &mut dyn TimingSink,
) -> Result<()>
where
    T: Synthetic,
    B: Bench<T> + ?Sized,
{
    config.validate()?;
    verify(bench, clock, config.iterations)?;
    measure(bench, clock, config, sink)
}

fn ensure(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(Error::Assertion(message()))
    }
}

fn analyze<T: Aggregate, B: Bench<T> + ?Sized>(bench: &mut B) {
    if let Err(err) = bench.analyze() {
        warn!(shape = T::NAME, error = %err, "statistics refresh failed");
    }
}

fn ensure_single<T: Aggregate>(found: &[T], expected: &T, what: &str) -> Result<()> {
    ensure(found.len() == 1, || {
        format!("{what}: expected 1 {}, found {}", T::NAME, found.len())
    })?;
    ensure(found[0] == *expected, || {
        format!("{what}: {} {} differs from the stored value", T::NAME, expected.key())
    })
}

fn ensure_equal<T: Aggregate>(found: Option<&T>, expected: &T, what: &str) -> Result<()> {
    match found {
        Some(found) if found == expected => Ok(()),
        Some(_) => Err(Error::Assertion(format!(
            "{what}: {} {} differs from the stored value",
            T::NAME,
            expected.key()
        ))),
        None => Err(Error::Assertion(format!(
            "{what}: {} {} not found",
            T::NAME,
            expected.key()
        ))),
    }
}

// -------------------------------------------------------------------------
// Phase 1
// -------------------------------------------------------------------------

/// Correctness pass over `iterations` single-aggregate rounds.
pub fn verify<T, B>(bench: &mut B, clock: &Clock, iterations: usize) -> Result<()>
where
    T: Synthetic,
    B: Bench<T> + ?Sized,
{
    info!(shape = T::NAME, iterations, "verifying adapter");
    for i in 0..iterations as i32 {
        bench.clean()?;
        let value = T::create(clock, i);
        bench.insert(&value)?;
        analyze::<T, B>(bench);

        let all = bench.search_all()?;
        ensure_single(&all, &value, "search all")?;

        let window = T::subset_window(clock, i);
        let subset = bench.search_subset(&window)?;
        ensure(subset.len() == 1, || {
            format!("search subset {i}: expected 1, found {}", subset.len())
        })?;

        let mut current = value;
        current.mutate(clock, i);
        bench.update_all(std::slice::from_ref(&current))?;
        current.mutate(clock, i);
        bench.update(&current)?;

        let queried = match bench.query() {
            Some(query) => Some(query.to_vec()?),
            None => None,
        };
        if let Some(found) = queried {
            ensure_single(&found, &current, "query")?;
            let filtered = match bench.query() {
                Some(query) => query.filter(window).to_vec()?,
                None => return Err(Error::assertion("query surface disappeared")),
            };
            ensure_single(&filtered, &current, "filtered query")?;
        }

        let key = current.key();
        ensure_equal(bench.find_single(&key)?.as_ref(), &current, "find single")?;
        let many = bench.find_many(std::slice::from_ref(&key))?;
        ensure_single(&many, &current, "find many")?;

        match bench.report(&ReportRequest::for_index(clock, i)) {
            Ok(report) => {
                ensure_single(&report.find_many, &current, "report find many")?;
                ensure_single(&report.top_five, &current, "report top five")?;
                ensure_single(&report.last_ten, &current, "report last ten")?;
                ensure_equal(report.find_one.as_ref(), &current, "report find one")?;
                ensure_equal(report.find_first.as_ref(), &current, "report find first")?;
                ensure_equal(report.find_last.as_ref(), &current, "report find last")?;
            }
            Err(err) if err.is_unsupported() => {
                debug!(shape = T::NAME, "report not supported, skipping check");
            }
            Err(err) => return Err(err),
        }

        debug!(shape = T::NAME, iteration = i, "verified");
    }
    info!(shape = T::NAME, "adapter verified");
    Ok(())
}

// -------------------------------------------------------------------------
// Phase 2
// -------------------------------------------------------------------------

/// Throughput pass over `config.data` aggregates.
pub fn measure<T, B>(
    bench: &mut B,
    clock: &Clock,
    config: &BenchConfig,
    sink: &mut dyn TimingSink,
) -> Result<()>
where
    T: Synthetic,
    B: Bench<T> + ?Sized,
{
    let data = config.data;
    let half = data / 2;
    let reps = config.repetitions;
    // Index cycling over the inserted half. Odd sizes would otherwise reach
    // index `half`, which the looped insert never writes.
    let cycle = |i: usize| ((i % data) / 2).min(half.saturating_sub(1)) as i32;

    info!(shape = T::NAME, data, "measuring throughput");
    bench.clean()?;
    let mut items: Vec<T> = create_many(clock, data);

    timed(sink, "bulk_insert", || bench.insert_all(&items))?;
    let lookup: Vec<T::Key> = items[config.lookup_indexes()]
        .iter()
        .map(Aggregate::key)
        .collect();
    mutate_all(clock, &mut items);
    analyze::<T, B>(bench);
    timed(sink, "bulk_update", || bench.update_all(&items))?;

    bench.clean()?;
    timed(sink, "loop_insert_half", || {
        items[..half].iter().try_for_each(|item| bench.insert(item))
    })?;
    mutate_all(clock, &mut items);
    analyze::<T, B>(bench);
    timed(sink, "loop_update_half", || {
        items[..half].iter().try_for_each(|item| bench.update(item))
    })?;
    analyze::<T, B>(bench);

    timed(sink, "search_all", || {
        for _ in 0..reps.search_all {
            let found = bench.search_all()?.len();
            ensure(found == half, || format!("search all: expected {half}, found {found}"))?;
        }
        Ok(())
    })?;

    timed(sink, "search_subset", || {
        for i in 0..reps.search_subset {
            let window = T::subset_window(clock, cycle(i));
            let found = bench.search_subset(&window)?.len();
            ensure(found > 0, || format!("search subset {}: no results", cycle(i)))?;
        }
        Ok(())
    })?;

    if bench.query().is_none() {
        sink.unsupported("query_all")?;
        sink.unsupported("query_filter")?;
    } else {
        timed(sink, "query_all", || {
            for _ in 0..reps.query_all {
                let found = bench
                    .query()
                    .ok_or_else(|| Error::assertion("query surface disappeared"))?
                    .count()?;
                ensure(found == half, || format!("query: expected {half}, found {found}"))?;
            }
            Ok(())
        })?;
        timed(sink, "query_filter", || {
            for i in 0..reps.query_filter {
                let window = T::subset_window(clock, cycle(i));
                let found = bench
                    .query()
                    .ok_or_else(|| Error::assertion("query surface disappeared"))?
                    .filter(window)
                    .count()?;
                ensure(found > 0, || format!("filtered query {}: no results", cycle(i)))?;
            }
            Ok(())
        })?;
    }

    timed(sink, "find_many", || {
        for _ in 0..reps.find_many {
            let found = bench.find_many(&lookup)?.len();
            ensure(found > 0, || "find many: no results".to_string())?;
        }
        Ok(())
    })?;

    timed(sink, "find_one", || {
        for i in 0..reps.find_one {
            let key = &lookup[i % lookup.len()];
            ensure(bench.find_single(key)?.is_some(), || {
                format!("find one: {} {key} not found", T::NAME)
            })?;
        }
        Ok(())
    })?;

    match bench.report(&ReportRequest::for_index(clock, 0)) {
        Err(err) if err.is_unsupported() => sink.unsupported("report")?,
        Err(err) => return Err(err),
        Ok(_) => timed(sink, "report", || {
            for i in 0..reps.report {
                let report = bench.report(&ReportRequest::for_index(clock, cycle(i)))?;
                ensure(report.is_complete(), || format!("report {}: empty slot", cycle(i)))?;
            }
            Ok(())
        })?,
    }

    info!(shape = T::NAME, "throughput pass finished");
    Ok(())
}
