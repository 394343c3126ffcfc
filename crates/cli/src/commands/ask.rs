//! Ask command handler.
//!
//! Runs one question through the pipeline and prints the answer with the
//! reviews it was grounded on.

use clap::Args;
use coursemate_core::{config::AppConfig, AppError, AppResult};
use coursemate_rag::{HistoryTurn, PipelineContext, QueryPipeline, QueryResponse};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Ask a question about courses or professors
#[derive(Args, Debug)]
pub struct AskCommand {
    /// The question to ask
    pub query: String,

    /// JSON file with earlier turns: [{"user": "...", "assistant": "..."}]
    #[arg(long)]
    pub history: Option<PathBuf>,

    /// Number of review passages to retrieve
    #[arg(short = 'k', long)]
    pub top_k: Option<usize>,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

impl AskCommand {
    /// Execute the ask command.
    pub async fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing ask command");
        tracing::debug!("Ask command options: {:?}", self);

        let mut config = config.clone();
        if let Some(top_k) = self.top_k {
            config.retrieval.top_k = top_k;
        }

        let history = match &self.history {
            Some(path) => load_history(path)?,
            None => Vec::new(),
        };

        let ctx = PipelineContext::from_config(&config)?;
        let pipeline = QueryPipeline::new(Arc::new(ctx));
        let response = pipeline.answer(&self.query, &history).await?;

        tracing::debug!(
            "Answered with {} structured candidate(s), {} passage(s)",
            response.debug.structured_candidates,
            response.debug.passage_hits
        );

        if self.json {
            println!("{}", serde_json::to_string_pretty(&response)?);
        } else {
            print_response(&response);
        }

        Ok(())
    }
}

fn load_history(path: &Path) -> AppResult<Vec<HistoryTurn>> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
        AppError::Config(format!("Failed to read history file {:?}: {}", path, e))
    })?;
    Ok(serde_json::from_str(&contents)?)
}

fn print_response(response: &QueryResponse) {
    println!("{}", response.answer);

    if response.top_reviews.is_empty() {
        return;
    }

    println!();
    println!("Top reviews:");
    for review in &response.top_reviews {
        println!(
            "- {} ({}) ★{:.1}",
            review.course_name, review.professor, review.rating
        );
        println!("  {}", review.text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_history_accepts_partial_turns() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[{{"user": "알고리즘 어때요?", "assistant": "과제가 많아요."}}, {{"user": "자료구조는요?"}}]"#
        )
        .unwrap();

        let history = load_history(file.path()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].assistant.as_deref(), Some("과제가 많아요."));
        assert!(history[1].assistant.is_none());
    }

    #[test]
    fn test_load_history_rejects_missing_file() {
        let err = load_history(Path::new("/nonexistent/history.json")).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
    }
}
