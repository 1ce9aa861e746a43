use anyhow::Context;
use clap::Subcommand;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

use crate::cli::{utils::output_success, OutputFormat};
use crate::database::models::{Document, Tour};
use crate::handlers::factory;

#[derive(Subcommand)]
pub enum DataCommands {
    #[command(about = "Insert tours from a JSON file")]
    Import {
        #[arg(long, default_value = "dev-data/data/tours.json", help = "JSON array of tours")]
        file: PathBuf,
    },

    #[command(about = "Delete all tours (their reviews go with them)")]
    Delete,
}

pub async fn handle(cmd: DataCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    let pool = super::connect().await?;

    match cmd {
        DataCommands::Import { file } => {
            let tours = read_tours(&file)?;
            for (index, tour) in tours.iter().enumerate() {
                factory::create::<Tour>(&pool, tour).await.with_context(|| {
                    let name = tour.get("name").and_then(Value::as_str).unwrap_or("unnamed");
                    format!("tour #{} ({}) was rejected", index + 1, name)
                })?;
            }
            output_success(
                &output_format,
                "Data successfully loaded",
                Some(json!({ "imported": tours.len() })),
            )
        }
        DataCommands::Delete => {
            let deleted = sqlx::query("DELETE FROM tours").execute(&pool).await?.rows_affected();
            output_success(
                &output_format,
                "Data successfully deleted",
                Some(json!({ "deleted": deleted })),
            )
        }
    }
}

/// Parse a JSON array of tour documents
pub fn read_tours(path: &Path) -> anyhow::Result<Vec<Document>> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    parse_tours(&raw).with_context(|| format!("{} is not a JSON array of tours", path.display()))
}

fn parse_tours(raw: &str) -> anyhow::Result<Vec<Document>> {
    Ok(serde_json::from_str::<Vec<Document>>(raw)?)
}
