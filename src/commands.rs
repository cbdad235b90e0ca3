//! Command implementations for statediff CLI

use crate::cli::{build_compare_config, Commands, OutputFormat, SourceArgs};
use crate::diff::DiffSummary;
use crate::duckdb_source::DuckDbSource;
use crate::error::{Result, StatediffError};
use crate::output::{JsonFormatter, PrettyPrinter};
use crate::progress::ProgressReporter;
use crate::session::ComparisonSession;
use crate::source::RowSource;
use std::io::BufRead;
use std::process::Command;
use std::sync::Arc;

/// Execute a command
pub fn execute_command(command: Commands) -> Result<()> {
    match command {
        Commands::Tables { source } => tables_command(&source),
        Commands::Run {
            source,
            tables,
            mode,
            batch_size,
            duplicate_keys,
            schema_drift,
            format,
            command,
        } => {
            let config = build_compare_config(tables.as_deref(), &mode, batch_size, &duplicate_keys, &schema_drift)
                .map_err(StatediffError::invalid_input)?;
            let format = OutputFormat::parse(&format).map_err(StatediffError::invalid_input)?;
            config.validate()?;
            let session = ComparisonSession::with_config(open_source(&source)?, config);
            run_command(&session, &command, format)
        }
    }
}

fn open_source(source: &SourceArgs) -> Result<Arc<dyn RowSource>> {
    Ok(Arc::new(DuckDbSource::open(&source.to_config())?))
}

/// List the tables of a source
fn tables_command(source: &SourceArgs) -> Result<()> {
    let tables = open_source(source)?.list_tables()?;
    PrettyPrinter::print_table_list(&tables);
    Ok(())
}

/// Fetch, wait for a change, fetch again and print the differences
fn run_command(session: &ComparisonSession, command: &[String], format: OutputFormat) -> Result<()> {
    let mut reporter = ProgressReporter::new("Fetching initial state...");
    let initial = session.fetch_initial(Some(reporter.callback()))?.wait()?.into_result()?;
    reporter.finish("Initial state captured");
    drop(reporter);

    if format == OutputFormat::Pretty {
        PrettyPrinter::print_snapshot_info("Initial", &initial);
    }

    if command.is_empty() {
        wait_for_enter()?;
    } else {
        run_change_command(command)?;
    }

    let mut reporter = ProgressReporter::new("Fetching current state...");
    let differences = session
        .fetch_current_and_compare(Some(reporter.callback()))?
        .wait()?
        .into_result()?;
    reporter.finish("Comparison complete");
    drop(reporter);

    let current = session
        .current_snapshot()
        .ok_or_else(|| StatediffError::Generic(anyhow::anyhow!("comparison finished without a current snapshot")))?;

    match format {
        OutputFormat::Pretty => {
            PrettyPrinter::print_snapshot_info("Current", &current);
            PrettyPrinter::print_differences(&differences);
            PrettyPrinter::print_summary(&DiffSummary::from_differences(&differences));
        }
        OutputFormat::Json => {
            println!("{}", JsonFormatter::format_comparison(&initial, &current, &differences)?);
        }
    }

    Ok(())
}

fn wait_for_enter() -> Result<()> {
    eprintln!("⏳ Make your changes, then press Enter to compare...");
    let mut line = String::new();
    std::io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

/// Run the command that is expected to change the data
fn run_change_command(command: &[String]) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| StatediffError::invalid_input("Empty command"))?;

    log::info!("Running: {}", command.join(" "));
    let status = Command::new(program)
        .args(args)
        .status()
        .map_err(|e| StatediffError::invalid_input(format!("Failed to run '{}': {}", program, e)))?;

    if !status.success() {
        log::warn!("'{}' exited with {}; comparing anyway", program, status);
    }
    Ok(())
}
