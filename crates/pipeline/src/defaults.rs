//! In-process implementations of the pipeline's host boundaries, good enough
//! to run without an external tokenizer or search backend.

use async_trait::async_trait;
use loreweave_protocol::{
    CodecError, EphemeralConfig, EphemeralWindow, KeyMatch, MatchSet, SearchFailure, SearchService, TokenCodec,
};
use std::sync::Mutex;
use unicode_segmentation::UnicodeSegmentation;

/// Interning word tokenizer: every word-bound segment (words, whitespace
/// runs, punctuation) is one token. Token counts approximate a real
/// subword tokenizer closely enough for budgeting.
#[derive(Default)]
pub struct WordCodec {
    vocab: Mutex<Vec<String>>,
}

impl WordCodec {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenCodec for WordCodec {
    async fn encode(&self, text: &str) -> Result<Vec<u32>, CodecError> {
        let mut vocab = self
            .vocab
            .lock()
            .map_err(|_| CodecError::Unavailable("tokenizer vocabulary poisoned".into()))?;
        Ok(text
            .split_word_bounds()
            .map(|segment| {
                if let Some(pos) = vocab.iter().position(|v| v == segment) {
                    pos as u32
                } else {
                    vocab.push(segment.to_string());
                    (vocab.len() - 1) as u32
                }
            })
            .collect())
    }

    async fn decode(&self, tokens: &[u32]) -> Result<String, CodecError> {
        let vocab = self
            .vocab
            .lock()
            .map_err(|_| CodecError::Unavailable("tokenizer vocabulary poisoned".into()))?;
        tokens
            .iter()
            .map(|&token| {
                vocab
                    .get(token as usize)
                    .cloned()
                    .ok_or_else(|| CodecError::Unrecognized(format!("token {token} not in vocabulary")))
            })
            .collect()
    }
}

/// Case-insensitive substring matcher over every configured key. Match
/// indices address the lowercased haystack, which coincides with the
/// original for text whose lowercase mapping preserves lengths.
pub struct KeywordSearcher;

impl SearchService for KeywordSearcher {
    fn search(&self, text: &str, keys: &[String]) -> Result<MatchSet, SearchFailure> {
        let haystack = text.to_lowercase();
        let mut set = MatchSet::default();
        for key in keys {
            let needle = key.to_lowercase();
            if needle.trim().is_empty() {
                return Err(SearchFailure::MalformedEntry("blank activation key".into()));
            }
            let mut start = 0;
            while let Some(pos) = haystack[start..].find(&needle) {
                set.insert(
                    key.clone(),
                    KeyMatch {
                        index: start + pos,
                        span: needle.len(),
                    },
                );
                start += pos + needle.len();
            }
        }
        Ok(set)
    }
}

/// Step-window policy: open for `duration` steps from `starting_step`,
/// recurring every `repeat_every` steps when set.
pub struct StepWindow;

impl EphemeralWindow for StepWindow {
    fn check_activation(&self, config: &EphemeralConfig, current_step: u32) -> bool {
        if current_step < config.starting_step {
            return false;
        }
        let elapsed = current_step - config.starting_step;
        match config.repeat_every {
            Some(period) if period > 0 => elapsed % period < config.duration,
            _ => elapsed < config.duration,
        }
    }
}
