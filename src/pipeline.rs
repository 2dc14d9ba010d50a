use std::time::{Duration, Instant};

use tokio::sync::watch;

use crate::asr::{AlignedResult, Gateway};
use crate::error::Result;
use crate::events::{EventSender, JobOutcome, PipelineEvent};
use crate::job::FileJob;
use crate::media;
use crate::subtitle::{self, Cue};
use crate::translate::{self, TranslationCache};

/// Audio artifacts at or below this size are treated as silence (spec §4.2
/// "Skip conditions").
const SILENT_AUDIO_BYTES: u64 = 1024;

const MODEL_NAME: &str = "bisub-asr-default";

/// Drive one `FileJob` through Extract → Transcribe → Translate → Burn
/// (spec §4.2). Returns the terminal outcome and an optional detail string
/// (set for `Skipped`); a worker-level `Err` corresponds to `Failed`.
pub async fn run(job: &FileJob, events: &EventSender) -> Result<(JobOutcome, Option<String>)> {
    let job_id = job.job_id.clone();
    let base_name = job.base_name();
    let config = &job.config_snapshot;
    let paths = job.cache_paths();
    std::fs::create_dir_all(&job.cache_dir)?;

    let (stop_ticker, ticker_handle) = start_ticker(job_id.clone(), base_name.clone(), events.clone());

    let result = run_inner(job, &job_id, &base_name, config, &paths, events).await;

    let _ = stop_ticker.send(true);
    let _ = ticker_handle.await;

    result
}

async fn run_inner(
    job: &FileJob,
    job_id: &str,
    base_name: &str,
    config: &crate::config::ConfigSnapshot,
    paths: &crate::job::CachePaths,
    events: &EventSender,
) -> Result<(JobOutcome, Option<String>)> {
    status(events, job_id, base_name, "extracting audio").await;
    media::extract_audio(&job.input_path, &paths.audio_wav).await?;
    progress(events, job_id, base_name, 10).await;

    let audio_len = std::fs::metadata(&paths.audio_wav).map(|m| m.len()).unwrap_or(0);
    let is_silent = audio_len <= SILENT_AUDIO_BYTES;

    status(events, job_id, base_name, "loading speech model").await;
    progress(events, job_id, base_name, 12).await;
    let gateway = Gateway::instance(MODEL_NAME, config.cache_dir.join("models")).await;
    gateway.acquire(events).await?;
    progress(events, job_id, base_name, 20).await;

    status(events, job_id, base_name, "transcribing").await;
    let aligned = if is_silent {
        AlignedResult::empty()
    } else {
        let job_id_owned = job_id.to_string();
        let base_name_owned = base_name.to_string();
        let events_clone = events.clone();
        gateway
            .transcribe(&paths.audio_wav, 120.0, 15.0, move |idx, total| {
                let pct = 20 + chunk_progress(idx, total, 50);
                let events_clone = events_clone.clone();
                let job_id_owned = job_id_owned.clone();
                let base_name_owned = base_name_owned.clone();
                tokio::spawn(async move {
                    events_clone
                        .send(PipelineEvent::Progress { job_id: job_id_owned, base_name: base_name_owned, percent: pct })
                        .await;
                });
            })
            .await?
    };
    progress(events, job_id, base_name, 70).await;

    let mono_cues = subtitle::convert_aligned_result(&aligned);
    std::fs::write(&paths.output_srt, subtitle::srt::emit(&mono_cues))?;

    status(events, job_id, base_name, "translating").await;
    let bilingual_cues = if is_silent || config.skip_translation || mono_cues.is_empty() {
        mono_cues.clone()
    } else {
        translate_cues(&mono_cues, config, events, job_id, base_name).await
    };
    progress(events, job_id, base_name, 80).await;

    let has_content = bilingual_cues.iter().any(|c| !c.text.trim().is_empty());
    if !has_content {
        progress(events, job_id, base_name, 100).await;
        return Ok((JobOutcome::Skipped, Some("bilingual subtitles empty".to_string())));
    }

    std::fs::write(&paths.bilingual_srt, subtitle::srt::emit(&bilingual_cues))?;

    if config.skip_burn {
        progress(events, job_id, base_name, 100).await;
        return Ok((JobOutcome::Completed, None));
    }

    status(events, job_id, base_name, "burning subtitles").await;
    let timestamp = job.job_id.get(..8).unwrap_or("00000000").to_string();
    let output_path = crate::job::CachePaths::subtitled_output_path(&job.input_path, &timestamp);

    let job_id_owned = job_id.to_string();
    let base_name_owned = base_name.to_string();
    let events_clone = events.clone();
    media::burn_subtitles(&job.input_path, &paths.bilingual_srt, &output_path, move |pct| {
        let events_clone = events_clone.clone();
        let job_id_owned = job_id_owned.clone();
        let base_name_owned = base_name_owned.clone();
        tokio::spawn(async move {
            events_clone
                .send(PipelineEvent::Progress { job_id: job_id_owned, base_name: base_name_owned, percent: pct })
                .await;
        });
    })
    .await?;

    progress(events, job_id, base_name, 100).await;
    Ok((JobOutcome::Completed, None))
}

fn chunk_progress(idx: usize, total: usize, range: u8) -> u8 {
    if total == 0 {
        return range;
    }
    (((idx + 1) as f64 / total as f64) * range as f64) as u8
}

/// Apply the translation cache (spec §4.6 "Caching"): cache hits skip the
/// provider call; misses go through the provider and are written back.
///
/// Cache misses are translated batch-by-batch (spec §6 batch budgets), with
/// a `Progress` event emitted after each batch, scaled into `[72, 80]`
/// proportional to batches completed (spec §4.2).
async fn translate_cues(
    cues: &[Cue],
    config: &crate::config::ConfigSnapshot,
    events: &EventSender,
    job_id: &str,
    base_name: &str,
) -> Vec<Cue> {
    let translator = translate::create_translator(config);
    let mut cache = TranslationCache::load(&config.cache_dir);
    let provider_tag = translator.name();

    let mut out: Vec<Option<Cue>> = vec![None; cues.len()];
    let mut to_translate = Vec::new();
    let mut to_translate_indices = Vec::new();

    for (i, cue) in cues.iter().enumerate() {
        let key = TranslationCache::key(provider_tag, &cue.text);
        if let Some(cached) = cache.get(&key) {
            let mut cue = cue.clone();
            cue.text = format!("{}\n{}", cue.text, cached);
            out[i] = Some(cue);
        } else {
            to_translate.push(cue.clone());
            to_translate_indices.push(i);
        }
    }

    if !to_translate.is_empty() {
        let batches = translate::batch_cues_by_budget(
            &to_translate,
            config.max_chars_per_batch,
            config.max_entries_per_batch,
        );
        let total_batches = batches.len().max(1);
        let mut index_cursor = 0usize;

        for (batch_no, batch) in batches.into_iter().enumerate() {
            let batch_owned: Vec<Cue> = batch.into_iter().cloned().collect();
            let batch_indices = &to_translate_indices[index_cursor..index_cursor + batch_owned.len()];
            index_cursor += batch_owned.len();

            match translator.translate_batch(&batch_owned, &config.target_language).await {
                Ok(translated) => {
                    let now = std::time::SystemTime::now()
                        .duration_since(std::time::UNIX_EPOCH)
                        .map(|d| d.as_secs())
                        .unwrap_or(0);

                    for (slot, (original, translated)) in
                        batch_indices.iter().zip(batch_owned.iter().zip(translated.iter()))
                    {
                        if let Some(translation) = translated.text.strip_prefix(&format!("{}\n", original.text)) {
                            let key = TranslationCache::key(provider_tag, &original.text);
                            cache.put(key, translation.to_string(), now);
                        }
                        out[*slot] = Some(translated.clone());
                    }
                }
                Err(_) => {
                    for (slot, original) in batch_indices.iter().zip(batch_owned.iter()) {
                        out[*slot] = Some(original.clone());
                    }
                }
            }

            let pct = 72 + (((batch_no + 1) as f64 / total_batches as f64) * 8.0) as u8;
            progress(events, job_id, base_name, pct.min(80)).await;
        }
    }

    let _ = cache.save();

    out.into_iter().map(|c| c.expect("every index filled")).collect()
}

async fn status(events: &EventSender, job_id: &str, base_name: &str, text: &str) {
    events
        .send(PipelineEvent::Status {
            job_id: job_id.to_string(),
            base_name: base_name.to_string(),
            text: text.to_string(),
        })
        .await;
}

async fn progress(events: &EventSender, job_id: &str, base_name: &str, percent: u8) {
    events
        .send(PipelineEvent::Progress {
            job_id: job_id.to_string(),
            base_name: base_name.to_string(),
            percent,
        })
        .await;
}

/// Emits `TimerTick` once per wall-clock second, started on stage 1 entry
/// and stopped on any terminal outcome (spec §4.2 "Timer").
fn start_ticker(
    job_id: String,
    base_name: String,
    events: EventSender,
) -> (watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        let start = Instant::now();
        loop {
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(1)) => {
                    let elapsed = start.elapsed();
                    let mm_ss = format!("{:02}:{:02}", elapsed.as_secs() / 60, elapsed.as_secs() % 60);
                    events
                        .send(PipelineEvent::TimerTick {
                            job_id: job_id.clone(),
                            base_name: base_name.clone(),
                            elapsed_mm_ss: mm_ss,
                        })
                        .await;
                }
                _ = rx.changed() => {
                    if *rx.borrow() {
                        break;
                    }
                }
            }
        }
    });
    (tx, handle)
}
