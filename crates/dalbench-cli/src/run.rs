//! Dispatch of a (target, shape) pair onto an adapter.

use std::io;

use dalbench_backends::{MemoryBackend, SqliteBackend};
use dalbench_core::{
    run_benchmark, BankScrape, Bench, BenchConfig, Clock, Error, Invoice, LineSink, Post, Result,
    TimingSink,
};
use tracing::info;

use crate::args::{Args, Invocation, Shape, Target};

/// Run one benchmark, writing timings to stdout.
pub fn run(args: &Args, invocation: Invocation) -> Result<()> {
    let Invocation {
        target,
        shape,
        data,
    } = invocation;
    if !target.supports(shape) {
        return Err(Error::unsupported(format!("{shape} on {target}")));
    }

    let config = args.bench_config(data);
    let clock = Clock::system();
    let mut sink = LineSink::new(io::stdout().lock());
    info!(%target, %shape, data, iterations = config.iterations, "starting benchmark");

    match target {
        Target::Memory => objects(shape, &clock, &config, &mut sink),
        Target::Sqlite => {
            let mut backend = SqliteBackend::open(&args.connection_config(&config))?;
            relations(&mut backend, shape, &clock, &config, &mut sink)
        }
        Target::Postgres => postgres(args, shape, &clock, &config, &mut sink),
    }
}

#[cfg(feature = "postgres")]
fn postgres(
    args: &Args,
    shape: Shape,
    clock: &Clock,
    config: &BenchConfig,
    sink: &mut dyn TimingSink,
) -> Result<()> {
    let mut backend = dalbench_backends::PostgresBackend::connect(&args.connection_config(config))?;
    relations(&mut backend, shape, clock, config, sink)
}

#[cfg(not(feature = "postgres"))]
fn postgres(
    _args: &Args,
    shape: Shape,
    _clock: &Clock,
    _config: &BenchConfig,
    _sink: &mut dyn TimingSink,
) -> Result<()> {
    Err(Error::unsupported(format!(
        "{shape} on Postgres: built without the postgres feature"
    )))
}

/// Shapes stored as normalized tables.
fn relations<B>(
    backend: &mut B,
    shape: Shape,
    clock: &Clock,
    config: &BenchConfig,
    sink: &mut dyn TimingSink,
) -> Result<()>
where
    B: Bench<Post> + Bench<Invoice> + Bench<BankScrape>,
{
    match shape {
        Shape::Simple => run_benchmark::<Post, B>(backend, clock, config, sink),
        Shape::StandardRelations => run_benchmark::<Invoice, B>(backend, clock, config, sink),
        Shape::ComplexRelations => run_benchmark::<BankScrape, B>(backend, clock, config, sink),
        Shape::StandardObjects | Shape::ComplexObjects => Err(Error::unsupported(shape.to_string())),
    }
}

/// Shapes stored as whole documents.
fn objects(
    shape: Shape,
    clock: &Clock,
    config: &BenchConfig,
    sink: &mut dyn TimingSink,
) -> Result<()> {
    match shape {
        Shape::Simple => {
            run_benchmark::<Post, _>(&mut MemoryBackend::new(), clock, config, sink)
        }
        Shape::StandardObjects => {
            run_benchmark::<Invoice, _>(&mut MemoryBackend::new(), clock, config, sink)
        }
        Shape::ComplexObjects => {
            run_benchmark::<BankScrape, _>(&mut MemoryBackend::new(), clock, config, sink)
        }
        Shape::StandardRelations | Shape::ComplexRelations => {
            Err(Error::unsupported(shape.to_string()))
        }
    }
}
