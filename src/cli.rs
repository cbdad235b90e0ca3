//! Command-line interface for statediff

use crate::config::{CompareConfig, DuplicateKeyPolicy, FetchMode, SchemaDriftPolicy, SourceConfig, TableSelection};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "statediff")]
#[command(about = "Snapshot database tables before and after a change and report every changed cell")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Cli {
    /// Global log level for this invocation; per-module `RUST_LOG` directives still apply
    pub fn log_level(&self) -> log::LevelFilter {
        if self.verbose {
            log::LevelFilter::Debug
        } else {
            log::LevelFilter::Info
        }
    }
}

/// Where the rows come from
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// DuckDB database file (in-memory when omitted)
    #[arg(long)]
    pub database: Option<PathBuf>,

    /// ATTACH statement for an external database; {VAR} placeholders are
    /// read from the environment or a .env file
    #[arg(long)]
    pub attach: Option<String>,
}

impl SourceArgs {
    pub fn to_config(&self) -> SourceConfig {
        SourceConfig {
            database: self.database.clone(),
            attach: self.attach.clone(),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// List the tables of a data source
    Tables {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Fetch the initial state, wait for a change, fetch again and compare
    Run {
        #[command(flatten)]
        source: SourceArgs,

        /// Comma-separated tables to compare (defaults to all)
        #[arg(long)]
        tables: Option<String>,

        /// Fetch mode: "batched" or "full"
        #[arg(long, default_value = "batched")]
        mode: String,

        /// Rows per page in batched mode (must be > 0)
        #[arg(long, default_value = "1000", value_parser = validate_batch_size)]
        batch_size: usize,

        /// Duplicate row keys: "overwrite" or "reject"
        #[arg(long, default_value = "overwrite")]
        duplicate_keys: String,

        /// Rows whose length changed between fetches: "truncate" or "reject"
        #[arg(long, default_value = "truncate")]
        schema_drift: String,

        /// Output format: "pretty", "json"
        #[arg(long, default_value = "pretty")]
        format: String,

        /// Command that changes the data; waits for Enter when omitted
        #[arg(last = true)]
        command: Vec<String>,
    },
}

/// Parse output format string
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFormat {
    Pretty,
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Result<Self, String> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(format!("Invalid output format: {}. Use 'pretty' or 'json'", s)),
        }
    }
}

/// Split a `--tables a,b` list; blank entries are dropped
pub fn parse_table_list(s: Option<&str>) -> TableSelection {
    let tables: Vec<String> = s
        .unwrap_or_default()
        .split(',')
        .map(|t| t.trim())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    TableSelection::from(Some(tables))
}

/// Build a comparison config from `run` flags
pub fn build_compare_config(
    tables: Option<&str>,
    mode: &str,
    batch_size: usize,
    duplicate_keys: &str,
    schema_drift: &str,
) -> Result<CompareConfig, String> {
    Ok(CompareConfig {
        batch_size,
        mode: FetchMode::parse(mode)?,
        tables: parse_table_list(tables),
        duplicate_keys: DuplicateKeyPolicy::parse(duplicate_keys)?,
        schema_drift: SchemaDriftPolicy::parse(schema_drift)?,
    })
}

/// Validate that batch size is greater than 0
fn validate_batch_size(s: &str) -> Result<usize, String> {
    let batch_size: usize = s
        .parse()
        .map_err(|_| format!("Invalid batch size: '{}'. Must be a positive integer.", s))?;

    if batch_size == 0 {
        return Err("Batch size must be greater than 0".to_string());
    }

    Ok(batch_size)
}
