//! Output formatting utilities

use clap::ValueEnum;
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum OutputFormat {
    /// Table format (default)
    #[default]
    Table,
    /// JSON format
    Json,
}

/// Print a table from a list of items
pub fn print_table<T: Tabled + Serialize>(items: &[T], format: OutputFormat) {
    match format {
        OutputFormat::Table => {
            if items.is_empty() {
                println!("{}", "No items found".yellow());
                return;
            }
            let table = Table::new(items).with(Style::rounded()).to_string();
            println!("{}", table);
        }
        OutputFormat::Json => print_json(&items),
    }
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) {
    if let Ok(json) = serde_json::to_string_pretty(value) {
        println!("{}", json);
    }
}

pub fn print_success(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

pub fn print_warning(message: &str) {
    println!("{} {}", "⚠".yellow().bold(), message);
}

pub fn print_info(message: &str) {
    println!("{} {}", "ℹ".blue().bold(), message);
}

/// Format bytes as human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2}Mi", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2}Ki", bytes as f64 / KB as f64)
    } else {
        format!("{}B", bytes)
    }
}

pub fn format_metric(value: f64) -> String {
    format!("{:.4}", value)
}

/// Render a prediction: a number, a label, or `label: p` pairs by decreasing probability
pub fn format_prediction(prediction: &Value) -> String {
    match prediction {
        Value::Object(proba) if proba.is_empty() => "(no classes seen yet)".dimmed().to_string(),
        Value::Object(proba) => {
            let mut pairs: Vec<(&String, f64)> = proba
                .iter()
                .map(|(label, p)| (label, p.as_f64().unwrap_or(0.0)))
                .collect();
            pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
            pairs
                .iter()
                .map(|(label, p)| format!("{}: {:.3}", label, p))
                .collect::<Vec<_>>()
                .join(", ")
        }
        Value::String(label) => label.clone(),
        other => other.to_string(),
    }
}

/// Parse a command-line argument as JSON, falling back to a plain string
pub fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
