//! Output formatting for the foliopipe CLI.
//!
//! Listing commands build plain row structs and render them either as a
//! text table (default) or pretty JSON (`--json`) through one code path.

use serde::Serialize;
use tabled::{Table, Tabled};

/// How a command renders its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Table,
    Json,
}

impl OutputMode {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputMode::Json
        } else {
            OutputMode::Table
        }
    }
}

/// Render rows in the chosen mode; `empty` is shown when a table has no rows.
pub fn print_items<T: Tabled + Serialize>(
    items: &[T],
    mode: OutputMode,
    empty: &str,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Table if items.is_empty() => println!("({empty})"),
        OutputMode::Table => println!("{}", Table::new(items)),
        OutputMode::Json => println!("{}", serde_json::to_string_pretty(items)?),
    }
    Ok(())
}

/// Render one value as pretty JSON, whatever the mode.
pub fn print_item<T: Serialize>(item: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(item)?);
    Ok(())
}

/// Two-decimal money formatting for table cells.
pub fn money(value: f64) -> String {
    format!("{value:.2}")
}

/// Money formatting with `-` for values the API did not send.
pub fn opt_money(value: Option<f64>) -> String {
    value.map(money).unwrap_or_else(|| "-".to_string())
}
