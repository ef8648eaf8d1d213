//! CLI commands for Workshop.

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;
use tracing::{Dispatch, dispatcher, info};

use workshop_worker::ShutdownSignals;

use crate::config::{BackendKind, WorkshopConfig};
use crate::jobs;
use crate::logging::init_logging;

/// Process-based job runner
#[derive(Parser, Debug)]
#[command(name = "workshop")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the worker pool until SIGINT or SIGTERM
    #[command(name = "run")]
    Run(RunArgs),

    /// Delete every job in the queue. With the memory backend nothing
    /// outlives a run, so there is nothing to delete.
    #[command(name = "clear")]
    Clear(ClearArgs),

    /// Generate shell completions
    #[command(name = "completions")]
    Completions(CompletionsArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Run a single tick, wait for its jobs, then exit
    #[arg(long, default_value = "false")]
    once: bool,
}

#[derive(Args, Debug)]
struct ClearArgs {
    /// Configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Also delete every schedule entry
    #[arg(long, default_value = "false")]
    schedule: bool,
}

#[derive(Args, Debug)]
struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(short, long, value_enum)]
    shell: Shell,
}

/// Parses the process arguments and runs the chosen command
///
/// # Errors
///
/// Returns whatever the command failed with.
pub fn run() -> Result<()> {
    let args = Cli::parse();

    match args.command {
        Commands::Run(run_args) => run_workshop(&run_args),
        Commands::Clear(clear_args) => clear_queue(&clear_args),
        Commands::Completions(completions_args) => {
            generate_completions(&completions_args, &mut std::io::stdout())
        }
    }
}

fn run_workshop(args: &RunArgs) -> Result<()> {
    let config = WorkshopConfig::load(&args.config)?;
    let logger = init_logging(&config.log_level, config.log_format);
    let registry = jobs::registry()?;

    let signals = ShutdownSignals::install().context("failed to install signal handlers")?;
    let mut workshop = config
        .build_workshop(&registry, logger.clone())?
        .with_shutdown_signals(signals);

    dispatcher::with_default(&logger, || {
        info!(
            config = %args.config.display(),
            employees = workshop.boss().employees().len(),
            "starting workshop"
        );
    });
    workshop.run(!args.once).context("workshop stopped with an error")?;
    Ok(())
}

fn clear_queue(args: &ClearArgs) -> Result<()> {
    let config = WorkshopConfig::load(&args.config)?;
    println!("{}", clear_summary(config.pipeline.backend));
    let logger = init_logging(&config.log_level, config.log_format);
    let registry = jobs::registry()?;

    config
        .pipeline(registry.clone())
        .clear()
        .context("failed to clear the queue")?;

    if args.schedule {
        match config.scheduler(registry) {
            Some(mut scheduler) => scheduler.clear().context("failed to clear the schedule")?,
            None => anyhow::bail!("no scheduler section in {}", args.config.display()),
        }
    }

    log_cleared(&logger, args.schedule);
    Ok(())
}

fn clear_summary(backend: BackendKind) -> &'static str {
    if backend.is_persistent() {
        "Queue cleared"
    } else {
        "Nothing to clear: the memory backend keeps no jobs between runs"
    }
}

fn log_cleared(logger: &Dispatch, schedule: bool) {
    dispatcher::with_default(logger, || info!(schedule, "cleared"));
}

fn generate_completions(args: &CompletionsArgs, out: &mut impl std::io::Write) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(args.shell, &mut cmd, "workshop", out);
    Ok(())
}
