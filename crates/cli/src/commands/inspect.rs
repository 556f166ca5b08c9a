//! Read-only inspection commands

use anyhow::Result;
use colored::Colorize;
use serde::Serialize;
use tabled::Tabled;

use crate::client::{ApiClient, EndpointReport, InitStatus, MetricValues, StatsReport};
use crate::output::{format_metric, print_json, print_table, OutputFormat};

#[derive(Tabled, Serialize)]
struct MetricRow {
    #[tabled(rename = "Metric")]
    name: String,
    #[tabled(rename = "Value")]
    value: String,
}

#[derive(Tabled, Serialize)]
struct StatsRow {
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Calls")]
    n_calls: u64,
    #[tabled(rename = "Mean")]
    mean: String,
    #[tabled(rename = "EWM")]
    ewm: String,
}

impl StatsRow {
    fn new(endpoint: &str, report: &EndpointReport) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            n_calls: report.n_calls,
            mean: report.mean_duration_human.clone(),
            ewm: report.ewm_duration_human.clone(),
        }
    }
}

pub async fn status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status: InitStatus = client.get("api/init").await?;

    match format {
        OutputFormat::Json => print_json(&status),
        OutputFormat::Table => {
            println!("{}", "Chantilly".bold());
            println!("{}", "=".repeat(40));
            println!("Flavor:     {}", status.flavor.cyan());
            println!("Storage:    {}", status.storage);
            println!("Version:    {}", status.version);
        }
    }
    Ok(())
}

pub async fn metrics(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let values: MetricValues = client.get("api/metrics").await?;

    match format {
        OutputFormat::Json => print_json(&values),
        OutputFormat::Table => {
            let rows: Vec<MetricRow> = values
                .0
                .iter()
                .map(|(name, value)| MetricRow {
                    name: name.clone(),
                    value: format_metric(*value),
                })
                .collect();
            print_table(&rows, format);
        }
    }
    Ok(())
}

pub async fn stats(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let report: StatsReport = client.get("api/stats").await?;

    match format {
        OutputFormat::Json => print_json(&report),
        OutputFormat::Table => {
            let rows = vec![
                StatsRow::new("predict", &report.predict),
                StatsRow::new("learn", &report.learn),
            ];
            print_table(&rows, format);
        }
    }
    Ok(())
}
