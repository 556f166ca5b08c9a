//! Flavor and model management commands

use anyhow::{Context, Result};
use colored::Colorize;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use tabled::Tabled;

use crate::client::{ApiClient, InitRequest, ModelList};
use crate::output::{
    format_bytes, print_info, print_json, print_success, print_table, print_warning, OutputFormat,
};

#[derive(Tabled, Serialize)]
struct ModelRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Default")]
    default: String,
}

/// Set the flavor, wiping every model and statistic on the server
pub async fn init(client: &ApiClient, flavor: &str) -> Result<()> {
    let _: Value = client
        .post(
            "api/init",
            &InitRequest {
                flavor: flavor.to_string(),
            },
        )
        .await?;
    print_success(&format!("Flavor set to {}", flavor.cyan()));
    Ok(())
}

pub async fn add_model(client: &ApiClient, path: &Path, name: Option<&str>) -> Result<()> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read model file {}", path.display()))?;
    let size = bytes.len() as u64;

    let name = client.upload_model(name, bytes).await?;
    print_success(&format!(
        "Model {} added ({}) and set as default",
        name.cyan(),
        format_bytes(size)
    ));
    Ok(())
}

pub async fn delete_model(client: &ApiClient, name: &str) -> Result<()> {
    if client.delete_model(name).await? {
        print_success(&format!("Model {} deleted", name.cyan()));
    } else {
        print_warning(&format!("No model named '{}'", name));
    }
    Ok(())
}

/// Download a model to `output`, or print it when no path is given
pub async fn get_model(client: &ApiClient, name: Option<&str>, output: Option<&Path>) -> Result<()> {
    let model = client.download_model(name).await?;
    if !model.verified {
        print_warning("Server sent no checksum; the download was not verified");
    }

    match output {
        Some(path) => {
            std::fs::write(path, &model.bytes)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            print_success(&format!(
                "Saved {} to {}",
                format_bytes(model.bytes.len() as u64),
                path.display()
            ));
            print_info(&format!("sha256 {}", model.checksum.dimmed()));
        }
        None => println!("{}", String::from_utf8_lossy(&model.bytes)),
    }
    Ok(())
}

pub async fn list_models(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let list: ModelList = client.get("api/models").await?;

    match format {
        OutputFormat::Json => print_json(&list),
        OutputFormat::Table => {
            let rows: Vec<ModelRow> = list
                .models
                .iter()
                .map(|name| ModelRow {
                    name: name.clone(),
                    default: if list.default.as_deref() == Some(name.as_str()) {
                        "*".green().to_string()
                    } else {
                        String::new()
                    },
                })
                .collect();
            print_table(&rows, format);

            if let Some(default) = &list.default {
                if !list.models.contains(default) {
                    print_warning(&format!("Default model '{}' no longer exists", default));
                }
            }
        }
    }
    Ok(())
}
