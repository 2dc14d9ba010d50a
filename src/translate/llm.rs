use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::config::ConfigSnapshot;
use crate::error::{BisubError, Result};
use crate::subtitle::Cue;

use super::{batch_cues_by_budget, Translator};

const BATCH_SEPARATOR: &str = "\n%%\n";

const DEFAULT_SYSTEM_PROMPT: &str = "You are a professional subtitle translator. \
Translate the given subtitle text faithfully, preserving tone and register. \
Return only the translation, with no commentary or extra formatting.";

/// Provider A ("LLM"): an OpenAI-chat-completions-shaped HTTP backend (spec
/// §4.6). Grounded on the original's `_process_single_batch` wire contract
/// (system/user messages, `temperature: 0`, `%%`-then-line-split fallback
/// chain) and the teacher's `GeminiTranslator` for the batch/prompt-building
/// idiom in Rust.
pub struct LlmTranslator {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    max_chars_per_batch: usize,
    max_entries_per_batch: usize,
    max_retries: u32,
    retry_base_delay_ms: u64,
    retry_max_delay_ms: u64,
}

impl LlmTranslator {
    pub fn new(config: &ConfigSnapshot) -> Self {
        let client = Client::builder()
            .pool_max_idle_per_host(20)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            system_prompt: config
                .custom_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            max_chars_per_batch: config.max_chars_per_batch,
            max_entries_per_batch: config.max_entries_per_batch,
            max_retries: config.max_retries,
            retry_base_delay_ms: config.retry_base_delay_ms,
            retry_max_delay_ms: config.retry_max_delay_ms,
        }
    }

    fn build_user_payload(cues: &[&Cue]) -> String {
        if cues.len() == 1 {
            cues[0].text.clone()
        } else {
            cues.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join(BATCH_SEPARATOR)
        }
    }

    /// Fallback chain: `"\n%%\n"`, then `"%%"`, then line-splitting (spec §4.6).
    fn parse_response(content: &str, count: usize) -> Vec<String> {
        if count == 1 {
            return vec![content.trim().to_string()];
        }

        let mut parts: Vec<String> = if content.contains(BATCH_SEPARATOR) {
            content.split(BATCH_SEPARATOR).map(|s| s.trim().to_string()).collect()
        } else if content.contains("%%") {
            content.split("%%").map(|s| s.trim().to_string()).collect()
        } else {
            content.lines().filter(|l| !l.trim().is_empty()).map(|l| l.trim().to_string()).collect()
        };

        parts.truncate(count);
        parts
    }

    async fn post_chat(&self, payload: &str) -> Result<(String, bool)> {
        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": self.system_prompt},
                {"role": "user", "content": payload},
            ],
            "temperature": 0,
            "max_tokens": 8000,
        });

        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));

        const TRANSPORT_RETRIES: u32 = 3;
        let mut rate_limit_attempt: u32 = 0;

        loop {
            let mut last_err = None;
            let response = 'retry: {
                for attempt in 0..=TRANSPORT_RETRIES {
                    match self
                        .client
                        .post(&url)
                        .bearer_auth(&self.api_key)
                        .json(&body)
                        .send()
                        .await
                    {
                        Ok(resp) => break 'retry resp,
                        Err(err) if err.is_connect() || err.is_timeout() => {
                            warn!(attempt, error = %err, "transport error, retrying");
                            last_err = Some(err);
                            continue;
                        }
                        Err(err) => return Err(BisubError::from(err)),
                    }
                }
                return Err(BisubError::TranslationBatchFailed(
                    last_err.map(|e| e.to_string()).unwrap_or_else(|| "connection failed".to_string()),
                ));
            };

            // Status is checked before any attempt to parse the body as JSON
            // (teacher idiom, `translate/gemini.rs`'s `GeminiTranslator::translate_batch`).
            let status = response.status();
            let text = response.text().await?;

            if status.as_u16() == 429 {
                if rate_limit_attempt >= self.max_retries {
                    return Err(BisubError::RateLimited);
                }
                let delay_ms = self
                    .retry_base_delay_ms
                    .saturating_mul(2u64.saturating_pow(rate_limit_attempt))
                    .min(self.retry_max_delay_ms);
                warn!(attempt = rate_limit_attempt, delay_ms, "rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                rate_limit_attempt += 1;
                continue;
            }

            if !status.is_success() {
                return Err(BisubError::TranslationBatchFailed(format!("{status}: {text}")));
            }

            let parsed: ChatCompletionResponse = serde_json::from_str(&text)?;
            let choice = parsed
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| BisubError::TranslationBatchFailed("empty choices".to_string()))?;

            let is_filtered = choice.finish_reason.as_deref() == Some("content_filter");
            return Ok((choice.message.content, is_filtered));
        }
    }
}

#[async_trait::async_trait]
impl Translator for LlmTranslator {
    async fn translate_batch(&self, cues: &[Cue], target_lang: &str) -> Result<Vec<Cue>> {
        let _ = target_lang; // the system prompt carries language intent (spec §4.6)
        if cues.is_empty() {
            return Ok(vec![]);
        }

        let batches = batch_cues_by_budget(cues, self.max_chars_per_batch, self.max_entries_per_batch);
        let mut out = Vec::with_capacity(cues.len());

        for batch in batches {
            let payload = Self::build_user_payload(&batch);

            match self.post_chat(&payload).await {
                Ok((content, true)) => {
                    // Content-filtered: not retried, originals pass through untranslated.
                    for cue in batch {
                        out.push(cue.clone());
                    }
                    warn!("batch content-filtered, using originals");
                    let _ = content;
                }
                Ok((content, false)) => {
                    // Pad parts to `batch.len()` with originals before appending: a
                    // missing or empty translated part falls back to the cue's own
                    // text rather than being left untranslated (spec §4.6, §8.4).
                    let mut translations = Self::parse_response(&content, batch.len());
                    translations.resize(batch.len(), String::new());
                    for (i, cue) in batch.iter().enumerate() {
                        let mut cue = (*cue).clone();
                        let original = cue.text.clone();
                        let translated = translations[i].trim();
                        let translated = if translated.is_empty() { original.as_str() } else { translated };
                        cue.text = format!("{}\n{}", original, translated);
                        out.push(cue);
                    }
                }
                Err(BisubError::RateLimited) => {
                    // Retries already exhausted inside `post_chat`; recovery is
                    // the same as any other batch failure (spec §7).
                    warn!("rate limit retries exhausted, falling back to originals");
                    for cue in batch {
                        out.push(cue.clone());
                    }
                }
                Err(err) => {
                    // Per-batch failure: every cue in the batch falls back to its
                    // original text; other batches are unaffected (spec §4.6).
                    warn!(error = %err, "batch translation failed, falling back to originals");
                    for cue in batch {
                        out.push(cue.clone());
                    }
                }
            }
        }

        Ok(out)
    }

    fn name(&self) -> &'static str {
        "llm"
    }
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Serialize)]
struct ChatMessage {
    content: String,
}
