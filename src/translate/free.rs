use reqwest::Client;

use crate::config::ConfigSnapshot;
use crate::error::Result;
use crate::subtitle::Cue;

use super::Translator;

const SEPARATOR: &str = "\n---SUBTITLE_SEPARATOR---\n";
const CHAR_BUDGET: usize = 4500;
const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 3000];

/// Provider B ("Free"): a smaller, separator-batched backend with arithmetic
/// backoff (spec §4.6). No API key required, so it doubles as the
/// `enable_free_fallback` path when the LLM provider is unavailable.
pub struct FreeTranslator {
    client: Client,
    base_url: String,
}

impl FreeTranslator {
    pub fn new(config: &ConfigSnapshot) -> Self {
        Self { client: Client::new(), base_url: config.base_url.clone() }
    }

    fn greedy_batches<'a>(cues: &'a [Cue]) -> Vec<Vec<&'a Cue>> {
        let mut batches = Vec::new();
        let mut current: Vec<&Cue> = Vec::new();
        let mut current_len = 0usize;

        for cue in cues {
            let added_len = cue.text.len() + SEPARATOR.len();
            if !current.is_empty() && current_len + added_len > CHAR_BUDGET {
                batches.push(std::mem::take(&mut current));
                current_len = 0;
            }
            current_len += added_len;
            current.push(cue);
        }
        if !current.is_empty() {
            batches.push(current);
        }
        batches
    }

    async fn translate_payload(&self, payload: &str) -> Result<String> {
        let mut last_err = None;
        for (attempt, delay_ms) in RETRY_DELAYS_MS.iter().enumerate() {
            match self
                .client
                .post(format!("{}/translate", self.base_url.trim_end_matches('/')))
                .body(payload.to_string())
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    return Ok(resp.text().await.unwrap_or_default());
                }
                Ok(resp) => {
                    last_err = Some(format!("http {}", resp.status()));
                }
                Err(err) => {
                    last_err = Some(err.to_string());
                }
            }
            tracing::warn!(attempt, "free provider call failed, retrying");
            tokio::time::sleep(std::time::Duration::from_millis(*delay_ms)).await;
        }
        Err(crate::error::BisubError::TranslationBatchFailed(
            last_err.unwrap_or_else(|| "free provider unavailable".to_string()),
        ))
    }
}

#[async_trait::async_trait]
impl Translator for FreeTranslator {
    async fn translate_batch(&self, cues: &[Cue], target_lang: &str) -> Result<Vec<Cue>> {
        let _ = target_lang;
        if cues.is_empty() {
            return Ok(vec![]);
        }

        let mut out = Vec::with_capacity(cues.len());
        for batch in Self::greedy_batches(cues) {
            let payload = batch.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(SEPARATOR);

            let parts: Vec<String> = match self.translate_payload(&payload).await {
                Ok(response) => response.split(SEPARATOR).map(|s| s.to_string()).collect(),
                Err(err) => {
                    tracing::warn!(error = %err, "batch translation failed, falling back to originals");
                    vec![]
                }
            };

            for (i, cue) in batch.iter().enumerate() {
                let mut cue = (*cue).clone();
                match parts.get(i).map(|s| s.trim()).filter(|s| !s.is_empty()) {
                    Some(t) => cue.text = format!("{}\n{}", cue.text, t),
                    None => {} // missing/empty part falls back to the original text
                }
                out.push(cue);
            }
        }
        Ok(out)
    }

    fn name(&self) -> &'static str {
        "free"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn cue(index: usize, text: &str) -> Cue {
        Cue { index, start: Duration::from_secs(index as u64), end: Duration::from_secs(index as u64 + 1), text: text.to_string() }
    }

    #[test]
    fn greedy_batches_stay_under_budget() {
        let cues: Vec<Cue> = (0..50).map(|i| cue(i, &"x".repeat(200))).collect();
        let batches = FreeTranslator::greedy_batches(&cues);
        for batch in &batches {
            let total: usize = batch.iter().map(|c| c.text.len() + SEPARATOR.len()).sum();
            assert!(total <= CHAR_BUDGET + 200 + SEPARATOR.len()); // allows the single oversized-first-item case
        }
        let total_cues: usize = batches.iter().map(|b| b.len()).sum();
        assert_eq!(total_cues, 50);
    }

    #[test]
    fn single_oversized_cue_still_forms_its_own_batch() {
        let cues = vec![cue(0, &"x".repeat(10_000))];
        let batches = FreeTranslator::greedy_batches(&cues);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 1);
    }
}
