//! dalbench command-line driver.
//!
//! `dalbench TARGET SHAPE DATA` runs the two-phase benchmark and prints one
//! `block = milliseconds` line per timed block. Logs go to stderr.

mod args;
mod run;

use std::error::Error as _;
use std::process::ExitCode;

use args::Args;
use clap::Parser;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "dalbench=info,dalbench_core=info,dalbench_backends=info";

/// Exit status of an unsupported target/shape pair.
const EXIT_UNSUPPORTED: i32 = -1;

/// Exit status of any other failure.
const EXIT_ERROR: i32 = -2;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let invocation = match args.invocation() {
        Ok(invocation) => invocation,
        Err(err) => {
            println!("{err}");
            std::process::exit(err.exit_code());
        }
    };

    match run::run(&args, invocation) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) if err.is_unsupported() => {
            println!("bench_supported = {EXIT_UNSUPPORTED}");
            eprintln!("{err}");
            std::process::exit(EXIT_UNSUPPORTED);
        }
        Err(err) => {
            println!("error");
            println!("{err}");
            let mut source = err.source();
            while let Some(cause) = source {
                println!("  caused by: {cause}");
                source = cause.source();
            }
            std::process::exit(EXIT_ERROR);
        }
    }
}
