//! Translator (spec §4.6): two interchangeable providers behind one trait,
//! plus an advisory persistent cache.

pub mod cache;
pub mod free;
pub mod llm;

use async_trait::async_trait;

use crate::config::{ConfigSnapshot, Provider};
use crate::error::Result;
use crate::subtitle::Cue;

pub use cache::TranslationCache;
pub use free::FreeTranslator;
pub use llm::LlmTranslator;

/// `translate_batch(cues) -> cues'` preserving `{index, timestamp}` exactly
/// and appending the translation after the original, separated by a newline
/// (spec §4.6 "Interface").
#[async_trait]
pub trait Translator: Send + Sync {
    async fn translate_batch(&self, cues: &[Cue], target_lang: &str) -> Result<Vec<Cue>>;

    fn name(&self) -> &'static str;
}

/// Select a provider per spec §4.6 "Provider selection".
pub fn create_translator(config: &ConfigSnapshot) -> Box<dyn Translator> {
    match config.provider {
        Provider::Llm => Box::new(LlmTranslator::new(config)),
        Provider::Free => Box::new(FreeTranslator::new(config)),
    }
}

/// Split `cues` into consecutive batches, each respecting both
/// `max_chars_per_batch` and `max_entries_per_batch` (spec §4.6, Provider A).
pub(crate) fn batch_cues_by_budget<'a>(
    cues: &'a [Cue],
    max_chars_per_batch: usize,
    max_entries_per_batch: usize,
) -> Vec<Vec<&'a Cue>> {
    let mut batches = Vec::new();
    let mut current: Vec<&Cue> = Vec::new();
    let mut current_chars = 0usize;

    for cue in cues {
        let would_overflow_chars = current_chars + cue.text.len() > max_chars_per_batch;
        let would_overflow_entries = current.len() + 1 > max_entries_per_batch;

        if !current.is_empty() && (would_overflow_chars || would_overflow_entries) {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }

        current_chars += cue.text.len();
        current.push(cue);
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cue(index: usize, text: &str) -> Cue {
        Cue { index, start: Duration::from_secs(index as u64), end: Duration::from_secs(index as u64 + 1), text: text.to_string() }
    }

    #[test]
    fn single_batch_when_everything_fits() {
        let cues = vec![cue(1, "a"), cue(2, "b")];
        let batches = batch_cues_by_budget(&cues, 3600, 10);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
    }

    #[test]
    fn splits_on_entry_budget() {
        let cues: Vec<Cue> = (0..5).map(|i| cue(i, "x")).collect();
        let batches = batch_cues_by_budget(&cues, 3600, 2);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn splits_on_char_budget() {
        let cues = vec![cue(1, &"x".repeat(50)), cue(2, &"y".repeat(60))];
        let batches = batch_cues_by_budget(&cues, 80, 10);
        assert_eq!(batches.len(), 2);
    }

    #[test]
    fn create_translator_selects_by_provider() {
        let mut config = ConfigSnapshot::default();
        config.provider = Provider::Free;
        assert_eq!(create_translator(&config).name(), "free");

        config.provider = Provider::Llm;
        assert_eq!(create_translator(&config).name(), "llm");
    }
}
