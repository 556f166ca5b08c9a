//! Chantilly CLI
//!
//! A command-line client for setting up a chantilly server, managing its
//! models, and sending predictions and ground truths.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{inspect, learning, models};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Chantilly CLI
#[derive(Parser)]
#[command(name = "chantilly")]
#[command(author, version, about = "CLI for the chantilly online model server", long_about = None)]
pub struct Cli {
    /// API endpoint URL (can also be set via CHANTILLY_API_URL env var)
    #[arg(long, env = "CHANTILLY_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short)]
    pub format: Option<output::OutputFormat>,

    /// Enable verbose output
    #[arg(long, short)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Set the flavor (regression, binary, multiclass); wipes all server state
    Init {
        flavor: String,
    },

    /// Show the flavor, storage backend, and server version
    Status,

    /// Upload a model document and make it the default
    AddModel {
        /// Path to the serialized model
        path: PathBuf,

        /// Name to store the model under (generated if omitted)
        #[arg(long, short)]
        name: Option<String>,
    },

    /// Delete a model by name
    DeleteModel {
        name: String,
    },

    /// Download a model (the default one if no name is given)
    GetModel {
        name: Option<String>,

        /// Write the model to this file instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// List stored models
    Models,

    /// Show the running metrics
    Metrics,

    /// Show predict/learn latency statistics
    Stats,

    /// Ask for a prediction
    Predict {
        /// Features as JSON, or free text
        features: String,

        /// Remember the prediction under this ID for a later `learn`
        #[arg(long)]
        id: Option<String>,

        /// Model to use instead of the default
        #[arg(long, short)]
        model: Option<String>,
    },

    /// Send a ground truth so the model can learn
    Learn {
        /// Ground truth as JSON (e.g. 3.5, true, "cat")
        #[arg(allow_hyphen_values = true)]
        ground_truth: String,

        /// Features as JSON, or free text; may be omitted when --id is given
        #[arg(long)]
        features: Option<String>,

        /// ID of an earlier prediction
        #[arg(long)]
        id: Option<String>,

        /// Model to update instead of the default
        #[arg(long, short)]
        model: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let format = config.format(cli.format)?;
    let client = client::ApiClient::new(&config.api_url(cli.api_url))?;

    match cli.command {
        Commands::Init { flavor } => models::init(&client, &flavor).await?,
        Commands::Status => inspect::status(&client, format).await?,
        Commands::AddModel { path, name } => {
            models::add_model(&client, &path, name.as_deref()).await?
        }
        Commands::DeleteModel { name } => models::delete_model(&client, &name).await?,
        Commands::GetModel { name, output } => {
            models::get_model(&client, name.as_deref(), output.as_deref()).await?
        }
        Commands::Models => models::list_models(&client, format).await?,
        Commands::Metrics => inspect::metrics(&client, format).await?,
        Commands::Stats => inspect::stats(&client, format).await?,
        Commands::Predict { features, id, model } => {
            learning::predict(&client, &features, id, model, format).await?
        }
        Commands::Learn {
            ground_truth,
            features,
            id,
            model,
        } => learning::learn(&client, &ground_truth, features.as_deref(), id, model).await?,
    }

    Ok(())
}
