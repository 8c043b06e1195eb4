//! Token counting strategies for the chunker.
//!
//! Chunk budgets are expressed in tokens, so the chunker needs a counter
//! that tracks how the embedding model tokenizes. cl100k is the accurate
//! one; the heuristic avoids the BPE cost when fidelity does not matter.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;

use crate::error::ConfigError;
use crate::models::TokenizerMode;

/// Counts tokens the way the configured strategy defines them.
pub trait TokenCounter: Send + Sync {
    /// Number of tokens in `text`. Empty text is 0 tokens.
    fn count(&self, text: &str) -> usize;

    /// Identity of the counting scheme, used in cache keys and logs.
    fn model_name(&self) -> &str;
}

/// ceil(bytes / 4), the usual English-prose approximation.
pub struct HeuristicCounter;

impl TokenCounter for HeuristicCounter {
    fn count(&self, text: &str) -> usize {
        text.len().div_ceil(4)
    }

    fn model_name(&self) -> &str {
        "approx-chars-div-4"
    }
}

/// cl100k BPE counts, matching GPT-4-era embedding models.
pub struct Cl100kCounter {
    bpe: CoreBPE,
}

impl Cl100kCounter {
    pub fn new() -> Result<Self, ConfigError> {
        let bpe = tiktoken_rs::cl100k_base().map_err(|e| {
            ConfigError::ValidationError(format!("failed to load cl100k vocabulary: {}", e))
        })?;
        Ok(Self { bpe })
    }
}

impl TokenCounter for Cl100kCounter {
    fn count(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }
        self.bpe.encode_with_special_tokens(text).len()
    }

    fn model_name(&self) -> &str {
        "cl100k_base"
    }
}

/// Build the counter selected in the config.
pub fn build_token_counter(mode: TokenizerMode) -> Result<Arc<dyn TokenCounter>, ConfigError> {
    match mode {
        TokenizerMode::Approximate => Ok(Arc::new(HeuristicCounter)),
        TokenizerMode::Cl100k => Ok(Arc::new(Cl100kCounter::new()?)),
    }
}
