//! Ingest command handler.
//!
//! Loads JSONL course records and reviews into the workspace catalog.

use clap::Args;
use coursemate_core::{config::AppConfig, AppError, AppResult};
use coursemate_rag::{create_provider, ingest_courses, ingest_reviews, Catalog, IngestReport};
use std::path::PathBuf;

/// Load course records and reviews into the catalog
#[derive(Args, Debug)]
pub struct IngestCommand {
    /// JSONL file of course records
    #[arg(long)]
    pub courses: Option<PathBuf>,

    /// JSONL file of reviews
    #[arg(long)]
    pub reviews: Option<PathBuf>,

    /// Clear the catalog before loading
    #[arg(long)]
    pub reset: bool,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl IngestCommand {
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ingest command");

        if self.courses.is_none() && self.reviews.is_none() && !self.reset {
            return Err(AppError::Config(
                "Nothing to do: pass --courses, --reviews or --reset".to_string(),
            ));
        }

        let catalog = Catalog::open(&config.catalog_path())?;

        if self.reset {
            tracing::info!("Resetting catalog");
            catalog.reset()?;
        }

        let courses = match &self.courses {
            Some(path) => ingest_courses(&catalog, path)?,
            None => IngestReport::default(),
        };

        let reviews = match &self.reviews {
            Some(path) => {
                let embedder = create_provider(&config.embedding)?;
                ingest_reviews(
                    &catalog,
                    embedder.as_ref(),
                    &config.embedding.passage_prefix,
                    &config.resilience.retry_policy(),
                    path,
                )
                .await?
            }
            None => IngestReport::default(),
        };

        if self.json {
            let output = serde_json::json!({
                "reset": self.reset,
                "courses": courses,
                "reviews": reviews,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        } else {
            println!(
                "Courses: {} written, {} skipped",
                courses.written, courses.skipped
            );
            println!(
                "Reviews: {} written, {} skipped",
                reviews.written, reviews.skipped
            );
        }

        Ok(())
    }
}
