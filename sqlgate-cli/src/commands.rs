//! Command execution and result formatting.

use crate::Commands;
use colored::Colorize;
use sqlgate_client::Client;
use sqlgate_protocol::{ChangeSet, QueryData, Row, SqlValue, TableData};

/// Executes a one-shot command and returns the formatted output.
pub async fn execute(
    client: &mut Client,
    cmd: Commands,
) -> Result<String, Box<dyn std::error::Error>> {
    match cmd {
        Commands::Repl => unreachable!(),

        Commands::Query { sql } => {
            let data = client.query(&sql).await?;
            Ok(format_query(&data))
        }

        Commands::Single { sql } => match client.query_single(&sql).await? {
            Some(row) => Ok(format_row(&row)),
            None => Ok("No rows".yellow().to_string()),
        },

        Commands::Value { sql } => {
            let value = client.query_value(&sql).await?;
            Ok(render_value(&value))
        }

        Commands::Exec { sql } => {
            let affected = client.execute(&sql).await?;
            Ok(format!("{} row(s) affected", affected))
        }

        Commands::Table { sql } => {
            let data = client.table(&sql).await?;
            Ok(format_table(&data))
        }

        Commands::Postback { changes } => {
            let change = parse_change_arg(&changes)?;
            let result = client.postback(&change).await?;

            let mut output = format!(
                "{} ({} inserted, {} deleted, {} updated)",
                "Postback applied".green(),
                change.inserted.len(),
                change.deleted.len(),
                change.updated_new.len()
            );
            if let Some(idcolumn) = &result.idcolumn {
                if !result.identities.is_empty() {
                    output.push_str(&format!(
                        "\n  New {} values: {:?}",
                        idcolumn.cyan(),
                        result.identities
                    ));
                }
            }
            Ok(output)
        }
    }
}

/// Parses a change-set argument (either inline JSON or @file.json).
fn parse_change_arg(arg: &str) -> Result<ChangeSet, Box<dyn std::error::Error>> {
    if let Some(path) = arg.strip_prefix('@') {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    } else {
        Ok(serde_json::from_str(arg)?)
    }
}

/// Renders one value for display.
pub fn render_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "NULL".to_string(),
        SqlValue::Bool(b) => b.to_string(),
        SqlValue::Int(i) => i.to_string(),
        SqlValue::Float(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Bytes(b) => format!("<{} bytes>", b.len()),
    }
}

/// Formats a single row as `column: value` lines.
pub fn format_row(row: &Row) -> String {
    row.iter()
        .map(|(column, value)| format!("{}: {}", column.cyan(), render_value(value)))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Formats query results as an aligned text table.
pub fn format_query(data: &QueryData) -> String {
    if data.rows.is_empty() {
        return "No rows".yellow().to_string();
    }
    let names: Vec<&str> = data.columns.keys().map(String::as_str).collect();
    format_rows(&names, &data.rows)
}

/// Formats table results: source table, column schema, then rows.
pub fn format_table(data: &TableData) -> String {
    let mut output = String::new();

    match &data.tablename {
        Some(name) => {
            output.push_str(&format!("{}\n", format!("Table {}", name.cyan()).bold()));
        }
        None => {
            output.push_str(&format!("{}\n", "No single source table".bold()));
        }
    }

    for meta in &data.columns {
        let mut flags = Vec::new();
        if meta.is_identity {
            flags.push("identity");
        }
        if meta.is_key {
            flags.push("key");
        }
        if !meta.nullable {
            flags.push("not null");
        }
        if meta.read_only {
            flags.push("read-only");
        }
        let flags = if flags.is_empty() {
            String::new()
        } else {
            format!(" [{}]", flags.join(", "))
        };
        output.push_str(&format!(
            "  {} {}{}\n",
            meta.name.cyan(),
            meta.logical_type.yellow(),
            flags
        ));
    }

    if !data.rows.is_empty() {
        let names: Vec<&str> = data.columns.iter().map(|m| m.name.as_str()).collect();
        output.push('\n');
        output.push_str(&format_rows(&names, &data.rows));
    }
    output
}

/// Renders rows under a header, with columns padded to a shared width.
fn format_rows(names: &[&str], rows: &[Row]) -> String {
    let rendered: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            names
                .iter()
                .map(|name| render_value(row.get(name).unwrap_or(&SqlValue::Null)))
                .collect()
        })
        .collect();

    let mut widths: Vec<usize> = names.iter().map(|name| name.len()).collect();
    for row in &rendered {
        for (i, cell) in row.iter().enumerate() {
            widths[i] = widths[i].max(cell.len());
        }
    }

    let mut output = String::new();
    let header = names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{:<width$}", name, width = widths[i]))
        .collect::<Vec<_>>()
        .join(" | ");
    output.push_str(&header.bold().to_string());
    output.push('\n');
    output.push_str(
        &widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-"),
    );
    output.push('\n');

    for row in &rendered {
        let line = row
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:<width$}", cell, width = widths[i]))
            .collect::<Vec<_>>()
            .join(" | ");
        output.push_str(line.trim_end());
        output.push('\n');
    }

    output.push_str(&format!("{} row(s)", rows.len()).dimmed().to_string());
    output
}
