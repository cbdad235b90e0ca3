//! Output formatting utilities

use crate::diff::{ChangeKind, DiffSummary, Difference};
use crate::error::Result;
use crate::snapshot::Snapshot;

/// Pretty printer for statediff output
pub struct PrettyPrinter;

impl PrettyPrinter {
    /// Print table list
    pub fn print_table_list(tables: &[String]) {
        if tables.is_empty() {
            println!("No tables found.");
            return;
        }

        println!("📋 Tables:");
        for (i, table) in tables.iter().enumerate() {
            let prefix = if i == tables.len() - 1 { "└─" } else { "├─" };
            println!("{} {}", prefix, table);
        }
    }

    /// Print what a fetch captured
    pub fn print_snapshot_info(label: &str, snapshot: &Snapshot) {
        println!("📸 {} snapshot {}", label, snapshot.id);
        println!("├─ Captured: {}", snapshot.captured_at.format("%Y-%m-%d %H:%M:%S UTC"));
        println!("├─ Mode: {:?}", snapshot.mode);
        let count = snapshot.table_count();
        if count == 0 {
            println!("└─ Tables: none");
            return;
        }
        println!("└─ Tables: {}", count);
        for (i, (name, table)) in snapshot.tables().enumerate() {
            let prefix = if i == count - 1 { "   └─" } else { "   ├─" };
            println!("{} {}: {} rows, {} columns", prefix, name, table.row_count(), table.columns.len());
        }
    }

    /// Print every difference, grouped under its table
    pub fn print_differences(differences: &[Difference]) {
        if differences.is_empty() {
            println!("✅ No differences found");
            return;
        }

        let mut current_table: Option<&str> = None;
        for diff in differences {
            if current_table != Some(diff.table.as_str()) {
                println!("\n🔍 {}", diff.table);
                current_table = Some(diff.table.as_str());
            }
            println!("  {}", format_difference(diff));
        }
    }

    /// Print change counts per table
    pub fn print_summary(summary: &DiffSummary) {
        if !summary.has_changes() {
            return;
        }

        println!("\n📊 Summary: {} cells in {} rows", summary.total_cells(), summary.total_rows());
        let count = summary.tables.len();
        for (i, (table, counts)) in summary.tables.iter().enumerate() {
            let prefix = if i == count - 1 { "└─" } else { "├─" };
            println!(
                "{} {}: {} rows (+{} ~{} -{} cells)",
                prefix, table, counts.rows_changed, counts.added_cells, counts.modified_cells, counts.deleted_cells
            );
        }
    }
}

/// One-line rendering of a difference
pub fn format_difference(diff: &Difference) -> String {
    let symbol = match diff.change_kind {
        ChangeKind::Added => "+",
        ChangeKind::Modified => "~",
        ChangeKind::Deleted => "-",
    };
    match diff.change_kind {
        ChangeKind::Added => format!(
            "{} [{}] {} ({}): {:?}",
            symbol, diff.row_key, diff.column_name, diff.column_index, diff.new_value
        ),
        ChangeKind::Modified => format!(
            "{} [{}] {} ({}): {:?} → {:?}",
            symbol, diff.row_key, diff.column_name, diff.column_index, diff.old_value, diff.new_value
        ),
        ChangeKind::Deleted => format!(
            "{} [{}] {} ({}): {:?}",
            symbol, diff.row_key, diff.column_name, diff.column_index, diff.old_value
        ),
    }
}

/// JSON formatter for machine-readable output
pub struct JsonFormatter;

impl JsonFormatter {
    /// Differences plus their summary and the ids of both snapshots
    pub fn format_comparison(initial: &Snapshot, current: &Snapshot, differences: &[Difference]) -> Result<String> {
        let json = serde_json::json!({
            "initial": {
                "id": initial.id,
                "captured_at": initial.captured_at,
                "rows": initial.row_count(),
            },
            "current": {
                "id": current.id,
                "captured_at": current.captured_at,
                "rows": current.row_count(),
            },
            "summary": DiffSummary::from_differences(differences),
            "differences": differences,
        });
        Ok(serde_json::to_string_pretty(&json)?)
    }
}
