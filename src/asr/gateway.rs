use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use fs2::FileExt;
use once_cell::sync::Lazy;
use tokio::sync::Mutex;

use crate::error::{BisubError, Result};
use crate::events::{EventSender, PipelineEvent};

use super::chunk::{is_leading_overlap_duplicate, plan_chunks};
use super::runtime::{ModelRuntime, RuntimeParams, StubRuntime};
use super::types::{AlignedResult, TranscriptSentence};

const ESSENTIAL_FILES: &[&str] = &["config.json", "weights.bin"];

/// Process-wide handle, one per model name (spec §4.4 "Shape").
///
/// `once_cell::sync::Lazy` mirrors the pattern the pack already uses for
/// process-wide caches (`TOOL_DOWNLOAD_STATE` / `FFMPEG_RELEASE_CACHE` in
/// `muyuanjin-ffui`'s tool downloader); here it gates a single `Gateway`
/// instance per model name behind a registry mutex.
static REGISTRY: Lazy<Mutex<std::collections::HashMap<String, Arc<Gateway>>>> =
    Lazy::new(|| Mutex::new(std::collections::HashMap::new()));

struct GatewayState {
    runtime: Option<Box<dyn ModelRuntime>>,
}

/// Single shared handle to the external ASR model (spec §4.4).
///
/// Model acquisition is guarded by two locks: `state`, a per-process
/// `tokio::sync::Mutex`, and (on first use) a cross-process advisory file
/// lock via `fs2`, keyed by model name, so two worker processes started at
/// once don't both try to download the same ~1.5 GB model.
pub struct Gateway {
    model_name: String,
    cache_dir: PathBuf,
    state: Mutex<GatewayState>,
}

impl Gateway {
    /// Fetch (creating on first call) the process-wide handle for `model_name`.
    pub async fn instance(model_name: &str, cache_dir: PathBuf) -> Arc<Gateway> {
        let mut registry = REGISTRY.lock().await;
        if let Some(existing) = registry.get(model_name) {
            return existing.clone();
        }
        let gateway = Arc::new(Gateway {
            model_name: model_name.to_string(),
            cache_dir,
            state: Mutex::new(GatewayState { runtime: None }),
        });
        registry.insert(model_name.to_string(), gateway.clone());
        gateway
    }

    fn model_dir(&self) -> PathBuf {
        self.cache_dir.join(&self.model_name)
    }

    fn lock_file_path(&self) -> PathBuf {
        std::env::temp_dir().join(format!("bisub-{}.download.lock", self.model_name))
    }

    fn essential_files_present(&self) -> bool {
        let dir = self.model_dir();
        ESSENTIAL_FILES.iter().all(|name| dir.join(name).is_file())
    }

    /// Acquisition protocol, spec §4.4 steps 1-5.
    pub async fn acquire(&self, events: &EventSender) -> Result<()> {
        // Step 1: handle already present.
        {
            let state = self.state.lock().await;
            if state.runtime.is_some() {
                return Ok(());
            }
        }

        // Step 2: per-process lock, re-check under it (double-checked).
        let mut state = self.state.lock().await;
        if state.runtime.is_some() {
            return Ok(());
        }

        // Step 3: probe on-disk cache.
        if !self.essential_files_present() {
            // Step 4: cross-process advisory lock around the download.
            self.download_with_coordination(events).await?;
        }

        if !self.essential_files_present() {
            return Err(BisubError::ModelUnavailable(format!(
                "model '{}' cache incomplete after acquisition",
                self.model_name
            )));
        }

        let mut runtime: Box<dyn ModelRuntime> = Box::new(StubRuntime::default());
        runtime.load(&self.model_dir()).await?;

        // Step 5: best-effort runtime params; failures are warnings only.
        if let Err(err) = runtime.set_runtime_params(&RuntimeParams {
            precision: Some("fp16".to_string()),
            local_attention_window: None,
        }) {
            tracing::warn!(model = %self.model_name, error = %err, "runtime params not applied");
        }

        state.runtime = Some(runtime);
        Ok(())
    }

    async fn download_with_coordination(&self, events: &EventSender) -> Result<()> {
        let lock_path = self.lock_file_path();
        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {
                // We hold the download lock; re-probe in case another process
                // finished between our cache probe and acquiring the lock.
                if !self.essential_files_present() {
                    let result = self.download(events).await;
                    let _ = FileExt::unlock(&lock_file);
                    result?;
                } else {
                    let _ = FileExt::unlock(&lock_file);
                }
            }
            Err(_) => {
                // Another process is downloading; block until it finishes.
                // Platforms without advisory-lock support fall back to a
                // plain blocking wait, which `lock_exclusive` already is.
                lock_file.lock_exclusive()?;
                let _ = FileExt::unlock(&lock_file);
            }
        }
        Ok(())
    }

    /// Simulated download: writes the two essential files directly rather
    /// than fetching real model weights (spec §1 treats the model as an
    /// external collaborator, out of scope). Emits the download event
    /// sequence the real path would (spec §4.4 "Download progress").
    async fn download(&self, events: &EventSender) -> Result<()> {
        events
            .send(PipelineEvent::DownloadStarted {
                model_name: self.model_name.clone(),
            })
            .await;

        let dir = self.model_dir();
        std::fs::create_dir_all(&dir)?;

        const TOTAL_MB: f64 = 1500.0;
        let started = Instant::now();
        let steps = 5;
        for step in 1..=steps {
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            let downloaded_mb = TOTAL_MB * (step as f64 / steps as f64);
            let elapsed = started.elapsed().as_secs_f64().max(0.001);
            events
                .send(PipelineEvent::DownloadProgress {
                    percent: ((step as f64 / steps as f64) * 100.0) as u8,
                    downloaded_mb,
                    total_mb: TOTAL_MB,
                    speed_mbps: downloaded_mb / elapsed,
                })
                .await;
        }

        for name in ESSENTIAL_FILES {
            let path = dir.join(name);
            if let Err(err) = std::fs::write(&path, b"placeholder") {
                events
                    .send(PipelineEvent::DownloadError { msg: err.to_string() })
                    .await;
                return Err(BisubError::ModelUnavailable(err.to_string()));
            }
        }

        if !self.essential_files_present() {
            // Corrupted write: remove and retry once (spec §4.4).
            let _ = std::fs::remove_dir_all(&dir);
            std::fs::create_dir_all(&dir)?;
            for name in ESSENTIAL_FILES {
                std::fs::write(dir.join(name), b"placeholder")?;
            }
        }

        events.send(PipelineEvent::DownloadCompleted).await;
        Ok(())
    }

    /// `transcribe(audio_path, chunk_s, overlap_s)` per spec §4.4.
    ///
    /// Holds the per-process model lock for the whole call: the underlying
    /// runtime is not reentrant, so at most one transcription runs per
    /// process at a time (spec §4.4 "Concurrency guard", §5).
    pub async fn transcribe(
        &self,
        audio_path: &Path,
        chunk_s: f64,
        overlap_s: f64,
        mut on_chunk: impl FnMut(usize, usize),
    ) -> Result<AlignedResult> {
        let state = self.state.lock().await;
        let runtime = state
            .runtime
            .as_ref()
            .ok_or_else(|| BisubError::ModelUnavailable(self.model_name.clone()))?;

        let duration_s = super::runtime::wav_duration_secs_pub(audio_path).unwrap_or(0.0);
        let windows = plan_chunks(duration_s, chunk_s, overlap_s);
        let total = windows.len();

        if total <= 1 {
            on_chunk(0, total.max(1));
            return runtime.transcribe_file(audio_path).await;
        }

        let mut full_text_parts = Vec::new();
        let mut sentences: Vec<TranscriptSentence> = Vec::new();

        for window in &windows {
            on_chunk(window.index, total);
            let chunk_path = match extract_chunk(audio_path, window.start_s, window.end_s).await {
                Ok(path) => path,
                Err(err) => {
                    tracing::warn!(chunk = window.index, error = %err, "skipping chunk");
                    continue;
                }
            };

            let result = runtime.transcribe_file(&chunk_path).await;
            let _ = std::fs::remove_file(&chunk_path);

            let result = match result {
                Ok(r) => r,
                Err(err) => {
                    tracing::warn!(chunk = window.index, error = %err, "skipping chunk");
                    continue;
                }
            };

            full_text_parts.push(result.full_text.clone());
            for mut sentence in result.sentences {
                let shift = window.start_s;
                sentence.start_s += shift;
                sentence.end_s += shift;
                for token in &mut sentence.tokens {
                    token.start_s += shift;
                    token.end_s += shift;
                }
                if is_leading_overlap_duplicate(window, sentence.start_s, overlap_s) {
                    continue;
                }
                sentences.push(sentence);
            }
        }

        Ok(AlignedResult {
            full_text: full_text_parts.join(" "),
            sentences,
        })
    }
}

/// Extract `[start_s, end_s]` of `audio_path` into a scratch WAV file. The
/// real cut is the Media Tool Adapter's job (§4.3); this trims a copy of the
/// same WAV samples so the Gateway's chunk loop has a concrete file to hand
/// the runtime without depending on `media` directly.
async fn extract_chunk(audio_path: &Path, start_s: f64, end_s: f64) -> Result<PathBuf> {
    let mut reader = hound::WavReader::open(audio_path)?;
    let spec = reader.spec();
    let sample_rate = spec.sample_rate as f64;
    let start_sample = (start_s * sample_rate) as usize;
    let end_sample = (end_s * sample_rate) as usize;

    let samples: Vec<i16> = reader
        .samples::<i16>()
        .skip(start_sample)
        .take(end_sample.saturating_sub(start_sample))
        .filter_map(|s| s.ok())
        .collect();

    let out_path = std::env::temp_dir().join(format!(
        "bisub-chunk-{}-{}.wav",
        start_sample,
        uuid::Uuid::new_v4()
    ));
    let mut writer = hound::WavWriter::create(&out_path, spec)?;
    for sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(out_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_silent_wav(path: &Path, seconds: f64) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        let total_samples = (seconds * spec.sample_rate as f64) as usize;
        for _ in 0..total_samples {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[tokio::test]
    async fn acquire_downloads_once_and_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let bus = crate::events::EventBus::new(32);
        let sender = bus.sender();
        let gateway = Gateway::instance("test-model-a", dir.path().to_path_buf()).await;

        gateway.acquire(&sender).await.unwrap();
        assert!(gateway.essential_files_present());

        // Second acquire is a no-op (handle already present).
        gateway.acquire(&sender).await.unwrap();
    }

    #[tokio::test]
    async fn transcribe_short_audio_uses_a_single_window() {
        let dir = tempfile::tempdir().unwrap();
        let bus = crate::events::EventBus::new(32);
        let sender = bus.sender();
        let gateway = Gateway::instance("test-model-b", dir.path().to_path_buf()).await;
        gateway.acquire(&sender).await.unwrap();

        let wav_path = dir.path().join("short.wav");
        write_silent_wav(&wav_path, 3.0);

        let mut chunks_seen = Vec::new();
        let result = gateway
            .transcribe(&wav_path, 120.0, 15.0, |idx, total| chunks_seen.push((idx, total)))
            .await
            .unwrap();

        assert_eq!(chunks_seen, vec![(0, 1)]);
        assert!(!result.sentences.is_empty());
    }

    #[tokio::test]
    async fn transcribe_long_audio_spans_multiple_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let bus = crate::events::EventBus::new(32);
        let sender = bus.sender();
        let gateway = Gateway::instance("test-model-c", dir.path().to_path_buf()).await;
        gateway.acquire(&sender).await.unwrap();

        let wav_path = dir.path().join("long.wav");
        write_silent_wav(&wav_path, 250.0);

        let mut chunk_count = 0usize;
        let result = gateway
            .transcribe(&wav_path, 120.0, 15.0, |_idx, total| chunk_count = total)
            .await
            .unwrap();

        assert_eq!(chunk_count, 3);
        // Every sentence's start should be within the total audio duration.
        assert!(result.sentences.iter().all(|s| s.start_s < 250.0));
    }
}
