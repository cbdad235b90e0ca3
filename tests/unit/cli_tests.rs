//! Unit tests for CLI argument parsing and validation

use clap::Parser;
use statediff::cli::{build_compare_config, Cli, Commands, OutputFormat};
use statediff::{DuplicateKeyPolicy, FetchMode, SchemaDriftPolicy, TableSelection};
use std::path::PathBuf;

#[test]
fn test_cli_tables_command() {
    let cli = Cli::try_parse_from(["statediff", "tables", "--database", "shop.duckdb"]).unwrap();
    match cli.command {
        Commands::Tables { source } => {
            assert_eq!(source.database, Some(PathBuf::from("shop.duckdb")));
            assert!(source.attach.is_none());
        }
        _ => panic!("Expected Tables command"),
    }
}

#[test]
fn test_cli_run_defaults() {
    let cli = Cli::try_parse_from(["statediff", "run"]).unwrap();
    assert!(!cli.verbose);
    match cli.command {
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
            assert!(source.database.is_none());
            assert!(tables.is_none());
            assert_eq!(mode, "batched");
            assert_eq!(batch_size, 1000);
            assert_eq!(duplicate_keys, "overwrite");
            assert_eq!(schema_drift, "truncate");
            assert_eq!(format, "pretty");
            assert!(command.is_empty());
        }
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn test_cli_run_with_options_and_command() {
    let cli = Cli::try_parse_from([
        "statediff",
        "--verbose",
        "run",
        "--tables",
        "users,orders",
        "--mode",
        "full",
        "--batch-size",
        "250",
        "--format",
        "json",
        "--",
        "sh",
        "-c",
        "echo done",
    ])
    .unwrap();
    assert!(cli.verbose);
    match cli.command {
        Commands::Run {
            tables,
            mode,
            batch_size,
            format,
            command,
            ..
        } => {
            assert_eq!(tables.as_deref(), Some("users,orders"));
            assert_eq!(mode, "full");
            assert_eq!(batch_size, 250);
            assert_eq!(format, "json");
            assert_eq!(command, vec!["sh", "-c", "echo done"]);
        }
        _ => panic!("Expected Run command"),
    }
}

#[test]
fn test_cli_rejects_zero_batch_size() {
    assert!(Cli::try_parse_from(["statediff", "run", "--batch-size", "0"]).is_err());
    assert!(Cli::try_parse_from(["statediff", "run", "--batch-size", "many"]).is_err());
}

#[test]
fn test_build_compare_config() {
    let config = build_compare_config(Some("users"), "full", 10, "reject", "reject").unwrap();
    assert_eq!(config.mode, FetchMode::Full);
    assert_eq!(config.batch_size, 10);
    assert_eq!(config.tables, TableSelection::Only(vec!["users".to_string()]));
    assert_eq!(config.duplicate_keys, DuplicateKeyPolicy::Reject);
    assert_eq!(config.schema_drift, SchemaDriftPolicy::Reject);

    assert!(build_compare_config(None, "sometimes", 10, "overwrite", "truncate").is_err());
    assert!(build_compare_config(None, "batched", 10, "keep", "truncate").is_err());
    assert!(build_compare_config(None, "batched", 10, "overwrite", "pad").is_err());
}

#[test]
fn test_output_format_parse() {
    assert_eq!(OutputFormat::parse("Json"), Ok(OutputFormat::Json));
    assert!(OutputFormat::parse("csv").is_err());
}
