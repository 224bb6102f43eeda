//! Command-line arguments.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use dalbench_backends::ConnectionConfig;
use dalbench_core::BenchConfig;

/// Data-access benchmark driver.
///
/// Prints one `block = milliseconds` line per timed block on stdout.
#[derive(Parser, Debug)]
#[command(name = "dalbench")]
#[command(version, about = "Data-access benchmark driver")]
pub struct Args {
    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    /// SQLite database file (in-memory when omitted)
    #[arg(long)]
    pub sqlite_path: Option<PathBuf>,

    /// Correctness iterations before timing (clamped to 10..=50)
    #[arg(long)]
    pub iterations: Option<usize>,

    /// Per-statement deadline in milliseconds
    #[arg(long)]
    pub deadline_ms: Option<u64>,

    /// TARGET SHAPE DATA
    #[arg(num_args = 0.., allow_negative_numbers = true)]
    pub positional: Vec<String>,
}

/// Persistence adapter to benchmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Target {
    #[value(name = "Postgres")]
    Postgres,
    #[value(name = "Sqlite")]
    Sqlite,
    #[value(name = "Memory")]
    Memory,
}

/// Domain shape and storage strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shape {
    #[value(name = "Simple")]
    Simple,
    #[value(name = "Standard_Objects")]
    StandardObjects,
    #[value(name = "Standard_Relations")]
    StandardRelations,
    #[value(name = "Complex_Objects")]
    ComplexObjects,
    #[value(name = "Complex_Relations")]
    ComplexRelations,
}

impl Target {
    /// Check whether the adapter implements a shape.
    pub fn supports(self, shape: Shape) -> bool {
        match self {
            Target::Postgres | Target::Sqlite => matches!(
                shape,
                Shape::Simple | Shape::StandardRelations | Shape::ComplexRelations
            ),
            Target::Memory => matches!(
                shape,
                Shape::Simple | Shape::StandardObjects | Shape::ComplexObjects
            ),
        }
    }
}

fn value_name<E: ValueEnum>(value: &E) -> String {
    value
        .to_possible_value()
        .map(|v| v.get_name().to_string())
        .unwrap_or_default()
}

fn names<E: ValueEnum>() -> String {
    E::value_variants()
        .iter()
        .map(value_name)
        .collect::<Vec<_>>()
        .join(" | ")
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&value_name(self))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&value_name(self))
    }
}

/// A validated benchmark request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Invocation {
    pub target: Target,
    pub shape: Shape,
    pub data: usize,
}

/// Rejected positional arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Wrong number of positional arguments.
    Usage,
    UnknownTarget(String),
    UnknownShape(String),
    InvalidData(String),
}

impl UsageError {
    /// Process exit code reported for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            UsageError::Usage => 42,
            UsageError::UnknownTarget(_) => 5,
            UsageError::UnknownShape(_) => 6,
            UsageError::InvalidData(_) => 7,
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageError::Usage => write!(
                f,
                "Expected usage: dalbench ({}) ({}) data",
                names::<Target>(),
                names::<Shape>()
            ),
            UsageError::UnknownTarget(found) => write!(
                f,
                "Unknown target found: {found}. Supported targets: {}",
                names::<Target>()
            ),
            UsageError::UnknownShape(found) => write!(
                f,
                "Unknown type found: {found}. Supported type: {}",
                names::<Shape>()
            ),
            UsageError::InvalidData(found) => write!(f, "Invalid data parameter: {found}"),
        }
    }
}

impl Args {
    /// Validate the positional arguments, in order.
    pub fn invocation(&self) -> Result<Invocation, UsageError> {
        let [target, shape, data] = self.positional.as_slice() else {
            return Err(UsageError::Usage);
        };
        let target = Target::from_str(target, false)
            .map_err(|_| UsageError::UnknownTarget(target.clone()))?;
        let shape =
            Shape::from_str(shape, false).map_err(|_| UsageError::UnknownShape(shape.clone()))?;
        let size = data
            .parse::<usize>()
            .map_err(|_| UsageError::InvalidData(data.clone()))?;
        BenchConfig::new(size)
            .validate()
            .map_err(|_| UsageError::InvalidData(data.clone()))?;
        Ok(Invocation {
            target,
            shape,
            data: size,
        })
    }

    fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// Benchmark configuration for `data` aggregates.
    pub fn bench_config(&self, data: usize) -> BenchConfig {
        let mut config = BenchConfig::new(data);
        if let Some(iterations) = self.iterations {
            config = config.with_iterations(iterations);
        }
        if let Some(deadline) = self.deadline() {
            config = config.with_deadline(deadline);
        }
        config
    }

    /// Connection settings for the relational adapters. The statement
    /// timeout follows the run's per-operation deadline.
    pub fn connection_config(&self, bench: &BenchConfig) -> ConnectionConfig {
        let mut config = ConnectionConfig::new();
        if let Some(url) = &self.database_url {
            config = config.with_database_url(url.clone());
        }
        if let Some(path) = &self.sqlite_path {
            config = config.with_sqlite_path(path.clone());
        }
        if let Some(deadline) = bench.deadline {
            config = config.with_statement_timeout(deadline);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("dalbench").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_valid_invocation() {
        let invocation = parse(&["Sqlite", "Complex_Relations", "300"])
            .invocation()
            .unwrap();
        assert_eq!(
            invocation,
            Invocation {
                target: Target::Sqlite,
                shape: Shape::ComplexRelations,
                data: 300,
            }
        );
    }

    #[test]
    fn test_exit_codes() {
        let code = |args: &[&str]| parse(args).invocation().unwrap_err().exit_code();
        assert_eq!(code(&[]), 42);
        assert_eq!(code(&["Sqlite", "Simple"]), 42);
        assert_eq!(code(&["Sqlite", "Simple", "10", "extra"]), 42);
        assert_eq!(code(&["Oracle", "Simple", "10"]), 5);
        assert_eq!(code(&["Sqlite", "Huge", "10"]), 6);
        assert_eq!(code(&["Sqlite", "simple", "10"]), 6);
        assert_eq!(code(&["Sqlite", "Simple", "ten"]), 7);
        assert_eq!(code(&["Sqlite", "Simple", "-5"]), 7);
        assert_eq!(code(&["Sqlite", "Simple", "1"]), 7);
    }

    #[test]
    fn test_target_is_checked_before_shape() {
        let err = parse(&["Nope", "Nope", "x"]).invocation().unwrap_err();
        assert_eq!(err, UsageError::UnknownTarget("Nope".to_string()));
    }

    #[test]
    fn test_usage_lists_names() {
        let usage = UsageError::Usage.to_string();
        assert!(usage.contains("Postgres | Sqlite | Memory"));
        assert!(usage.contains("Standard_Objects"));
        assert_eq!(Shape::ComplexObjects.to_string(), "Complex_Objects");
    }

    #[test]
    fn test_support_matrix() {
        assert!(Target::Sqlite.supports(Shape::StandardRelations));
        assert!(!Target::Sqlite.supports(Shape::StandardObjects));
        assert!(!Target::Postgres.supports(Shape::ComplexObjects));
        assert!(Target::Memory.supports(Shape::ComplexObjects));
        assert!(!Target::Memory.supports(Shape::ComplexRelations));
        assert!(Target::Memory.supports(Shape::Simple));
    }

    #[test]
    fn test_flags_flow_into_configs() {
        let args = parse(&[
            "--iterations",
            "99",
            "--deadline-ms",
            "1500",
            "--sqlite-path",
            "/tmp/bench.db",
            "Sqlite",
            "Simple",
            "100",
        ]);
        let bench = args.bench_config(100);
        assert_eq!(bench.iterations, 50);
        assert_eq!(bench.deadline, Some(Duration::from_millis(1500)));

        let connection = args.connection_config(&bench);
        assert_eq!(connection.sqlite_path, Some(PathBuf::from("/tmp/bench.db")));
        assert_eq!(connection.statement_timeout, Some(Duration::from_millis(1500)));
    }
}
