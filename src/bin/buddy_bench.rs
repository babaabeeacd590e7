//! Benchmark harness entry point
//!
//! Resolves configuration (CLI > TOML file > defaults), then hands the
//! run to the workload driver. Exit code 0 on success, 1 on invalid
//! configuration, invalid test type, or a failed run.

use std::process;

use clap::Parser;

use buddy_pool::bench;
use buddy_pool::config::{Cli, Config, Settings};

fn main() {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::load_or_default(&cli.config);
    let settings = match Settings::resolve(&cli, &config) {
        Ok(settings) => settings,
        Err(message) => {
            eprintln!("Configuration error: {}", message);
            process::exit(1);
        }
    };

    if let Err(err) = bench::run(&settings) {
        eprintln!("Error: {:#}", err);
        process::exit(1);
    }
}
