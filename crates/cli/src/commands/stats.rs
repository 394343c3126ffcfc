//! Stats command handler.

use clap::Args;
use coursemate_core::{config::AppConfig, AppResult};
use coursemate_rag::Catalog;

/// Show catalog statistics
#[derive(Args, Debug)]
pub struct StatsCommand {
    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl StatsCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing stats command");

        let path = config.catalog_path();
        let stats = Catalog::open(&path)?.stats()?;
        let db_size_bytes = std::fs::metadata(&path).map(|m| m.len()).unwrap_or(0);

        if self.json {
            let output = serde_json::json!({
                "catalog": path,
                "courses": stats.courses,
                "reviews": stats.reviews,
                "dbSizeBytes": db_size_bytes,
                "embedding": {
                    "provider": config.embedding.provider,
                    "model": config.embedding.model,
                    "dimensions": config.embedding.dimensions,
                },
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!("Catalog: {}", path.display());
            println!("  Courses: {}", stats.courses);
            println!("  Reviews: {}", stats.reviews);
            println!("  DB size: {} bytes", db_size_bytes);
            println!(
                "  Embeddings: {}/{} ({} dims)",
                config.embedding.provider, config.embedding.model, config.embedding.dimensions
            );
        }

        Ok(())
    }
}
