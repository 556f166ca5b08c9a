//! Predict and learn commands

use anyhow::Result;
use colored::Colorize;
use serde_json::Value;

use crate::client::{ApiClient, LearnRequest, PredictRequest, PredictResponse};
use crate::output::{format_prediction, parse_value, print_json, print_success, OutputFormat};

pub async fn predict(
    client: &ApiClient,
    features: &str,
    id: Option<String>,
    model: Option<String>,
    format: OutputFormat,
) -> Result<()> {
    let request = PredictRequest {
        features: parse_value(features),
        id: id.clone(),
        model,
    };
    let response: PredictResponse = client.post("api/predict", &request).await?;

    match format {
        OutputFormat::Json => print_json(&response),
        OutputFormat::Table => {
            println!("Model:       {}", response.model.cyan());
            println!("Prediction:  {}", format_prediction(&response.prediction).bold());
            if let Some(id) = id {
                println!("{}", format!("Remembered as '{}'", id).dimmed());
            }
        }
    }
    Ok(())
}

pub async fn learn(
    client: &ApiClient,
    ground_truth: &str,
    features: Option<&str>,
    id: Option<String>,
    model: Option<String>,
) -> Result<()> {
    let request = LearnRequest {
        features: features.map(parse_value),
        id,
        ground_truth: parse_value(ground_truth),
        model,
    };
    let _: Value = client.post("api/learn", &request).await?;
    print_success("Model updated");
    Ok(())
}
