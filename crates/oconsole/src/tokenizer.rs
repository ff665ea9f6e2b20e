//! Token counting using tiktoken
//!
//! Used for the history budget and the per-step token display. Counts are
//! approximate for non-OpenAI models; cl100k is close enough for budgeting.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tiktoken_rs::{cl100k_base, CoreBPE};

use crate::history::TokenCounter;

/// Fallback estimate when the BPE tables are unavailable
const FALLBACK_CHARS_PER_TOKEN: usize = 4;

/// Shared cl100k encoder (lazy initialized)
static CL100K: Lazy<Mutex<Option<CoreBPE>>> = Lazy::new(|| Mutex::new(cl100k_base().ok()));

/// Encoding used to count tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    /// OpenAI cl100k_base, also used as an approximation for local models
    Cl100kBase,
    /// Characters divided by four
    CharEstimate,
}

impl Encoding {
    /// Pick an encoding for a model name
    pub fn for_model(model: &str) -> Self {
        let model = model.to_lowercase();
        let known = [
            "gpt", "o1", "o3", "claude", "llama", "mistral", "mixtral", "qwen", "deepseek",
            "phi", "gemma",
        ];

        if known.iter().any(|k| model.contains(k)) {
            Self::Cl100kBase
        } else {
            Self::CharEstimate
        }
    }
}

/// Token counter for conversation text
#[derive(Debug, Clone, Copy)]
pub struct Tokenizer {
    encoding: Encoding,
}

impl Tokenizer {
    /// Tokenizer suited to the given model
    pub fn for_model(model: &str) -> Self {
        Self {
            encoding: Encoding::for_model(model),
        }
    }

    pub fn with_encoding(encoding: Encoding) -> Self {
        Self { encoding }
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn count_tokens(&self, text: &str) -> usize {
        if text.is_empty() {
            return 0;
        }

        match self.encoding {
            Encoding::Cl100kBase => {
                let guard = CL100K.lock();
                match *guard {
                    Some(ref bpe) => bpe.encode_with_special_tokens(text).len(),
                    None => estimate(text),
                }
            }
            Encoding::CharEstimate => estimate(text),
        }
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::with_encoding(Encoding::Cl100kBase)
    }
}

impl TokenCounter for Tokenizer {
    fn count(&self, text: &str) -> usize {
        self.count_tokens(text)
    }
}

/// Rounds up so that any non-empty text costs at least one token
fn estimate(text: &str) -> usize {
    text.chars().count().div_ceil(FALLBACK_CHARS_PER_TOKEN)
}
