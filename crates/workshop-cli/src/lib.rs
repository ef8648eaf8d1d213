//! # Workshop CLI
//!
//! Command-line interface for running a Workshop worker pool.
//!
//! ## Usage
//!
//! ```bash
//! # Run the pool until SIGINT/SIGTERM
//! workshop run --config workshop.yml
//!
//! # Clear the job queue
//! workshop clear --config workshop.yml
//!
//! # Generate shell completions
//! workshop completions --shell bash
//! ```

#![warn(missing_docs)]
#![warn(unused)]

pub mod commands;
pub mod config;
pub mod jobs;
pub mod logging;

pub use commands::run;
pub use config::WorkshopConfig;

/// CLI result type
pub type CliResult<T = ()> = Result<T, anyhow::Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_result_err_keeps_context() {
        use anyhow::Context;

        let result: CliResult<()> = Err(anyhow::anyhow!("root cause")).context("loading config");
        let err = result.unwrap_err();
        assert_eq!(format!("{err:#}"), "loading config: root cause");
    }
}
