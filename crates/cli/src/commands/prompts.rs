//! Prompts command handler.

use clap::Args;
use coursemate_core::{config::AppConfig, AppResult};
use coursemate_prompt::list_prompts;

/// List prompt definitions and where they come from
#[derive(Args, Debug)]
pub struct PromptsCommand {}

impl PromptsCommand {
    pub fn execute(&self, config: &AppConfig) -> AppResult<()> {
        tracing::info!("Executing prompts command");

        for (id, source) in list_prompts(&config.workspace)? {
            println!("{:<24} {}", id, source);
        }

        Ok(())
    }
}
