//! Pending-update summarization: digest types, the generator contract, the
//! OpenRouter generator, and the runner that commits digests.

pub mod openrouter;
pub mod runner;
pub mod types;

use std::sync::Arc;

use crate::config::SummarizerConfig;

pub use runner::{BatchReport, UpdateRunner};
pub use types::{GeneratorError, SkipReason, SummarizerResult, UpdateDigest, UpdateSummarizer};

/// Build the configured generator, or `None` when summarization is disabled
/// or the provider is unknown.
pub fn create_summarizer(config: &SummarizerConfig) -> Option<Arc<dyn UpdateSummarizer>> {
    if !config.enabled {
        return None;
    }
    match config.provider.as_str() {
        "openrouter" => match openrouter::OpenRouterSummarizer::from_config(config) {
            Ok(s) => Some(Arc::new(s)),
            Err(e) => {
                tracing::error!(error = %e, "failed to build summarizer");
                None
            }
        },
        other => {
            tracing::warn!(provider = other, "unknown summarizer provider");
            None
        }
    }
}
