//! workshop - run a pool of forked workers against a job queue
//!
//! ## Commands
//!
//! - `workshop run` - Run the worker pool until interrupted
//! - `workshop clear` - Delete every queued job
//! - `workshop completions` - Generate shell completions
//!
//! ## Quick Start
//!
//! ```bash
//! # Run until Ctrl-C; a second Ctrl-C within 5 seconds kills running jobs
//! workshop run --config workshop.yml
//!
//! # One tick, then wait for the started jobs and exit
//! workshop run --config workshop.yml --once
//! ```

use std::process::ExitCode;

fn main() -> ExitCode {
    match workshop_cli::run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            if std::env::var("WORKSHOP_VERBOSE").is_ok() {
                eprintln!("{e:?}");
            }
            ExitCode::FAILURE
        }
    }
}
