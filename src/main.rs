use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use bisub::config::{ConfigSnapshot, Provider};
use bisub::events::{JobOutcome, PipelineEvent};
use bisub::{FileJob, Scheduler};
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "bisub")]
#[command(version, about = "Bilingual video subtitling processing engine")]
#[command(
    long_about = "Batch-process video files into burned-in bilingual subtitles: extract audio, transcribe, translate, and burn the result back into the source video."
)]
struct Cli {
    /// Input video file(s)
    inputs: Vec<PathBuf>,

    /// Directory for cache artifacts and intermediate SRT files
    #[arg(short, long)]
    cache_dir: Option<PathBuf>,

    /// Translation provider: llm, free
    #[arg(short, long, default_value = "llm")]
    provider: String,

    /// Source language code
    #[arg(long, default_value = "en")]
    source_language: String,

    /// Target language code
    #[arg(long, default_value = "zh")]
    target_language: String,

    /// Override the concurrency cap
    #[arg(short = 'n', long)]
    concurrency: Option<usize>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Suppress progress bars
    #[arg(short, long)]
    quiet: bool,

    /// Validate inputs and configuration without processing
    #[arg(long)]
    dry_run: bool,
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if cli.inputs.is_empty() {
        anyhow::bail!("no input files given");
    }
    for input in &cli.inputs {
        if !input.exists() {
            anyhow::bail!("input file not found: {}", input.display());
        }
    }

    let provider: Provider = cli.provider.parse().map_err(|e: String| anyhow::anyhow!(e))?;

    let mut config = ConfigSnapshot::load().context("failed to load configuration")?;
    config.provider = provider;
    config.source_language = cli.source_language.clone();
    config.target_language = cli.target_language.clone();
    if let Some(dir) = cli.cache_dir.clone() {
        config.cache_dir = dir;
    }
    if let Some(n) = cli.concurrency {
        config.max_processes = n;
    }
    config.validate().context("configuration validation failed")?;

    if !cli.quiet {
        info!(inputs = cli.inputs.len(), provider = ?config.provider, "starting batch");
    }

    if cli.dry_run {
        println!("Dry run validation successful:");
        println!("  Inputs:      {}", cli.inputs.len());
        println!("  Provider:    {:?}", config.provider);
        println!("  Languages:   {} -> {}", config.source_language, config.target_language);
        println!("  Cache dir:   {}", config.cache_dir.display());
        println!("  Concurrency: {}", config.effective_concurrency(cli.inputs.len()));
        return Ok(());
    }

    let cancelled = Arc::new(AtomicBool::new(false));
    let cancelled_clone = cancelled.clone();
    ctrlc::set_handler(move || {
        if cancelled_clone.load(Ordering::Relaxed) {
            std::process::exit(1);
        }
        eprintln!("\nReceived Ctrl+C, cancelling... (press again to force quit)");
        cancelled_clone.store(true, Ordering::Relaxed);
    })
    .ok();

    let mut scheduler = Scheduler::new(config.clone(), cli.inputs.len(), 1024);
    let multi_progress = if cli.quiet { None } else { Some(MultiProgress::new()) };
    let mut bars: HashMap<String, ProgressBar> = HashMap::new();

    let mut job_inputs: HashMap<String, PathBuf> = HashMap::new();
    for input in &cli.inputs {
        let job = FileJob::new(input.clone(), config.cache_dir.clone(), config.clone());
        job_inputs.insert(job.job_id.clone(), input.clone());
        scheduler.submit(job);
    }

    let mut completed = 0usize;
    let mut failed = 0usize;
    let mut skipped = 0usize;
    let start = Instant::now();

    loop {
        if cancelled.load(Ordering::Relaxed) {
            scheduler.stop_all().await;
        }

        for event in scheduler.poll_events() {
            match event {
                PipelineEvent::Status { job_id, base_name, text } => {
                    if let Some(mp) = &multi_progress {
                        let bar = bar_for(&mut bars, mp, &job_id, &base_name);
                        bar.set_message(text);
                    }
                }
                PipelineEvent::Progress { job_id, base_name, percent } => {
                    if let Some(mp) = &multi_progress {
                        let bar = bar_for(&mut bars, mp, &job_id, &base_name);
                        bar.set_position(percent as u64);
                    }
                }
                PipelineEvent::TimerTick { .. } => {}
                PipelineEvent::DownloadStarted { model_name } => {
                    info!(model = %model_name, "downloading ASR model");
                }
                PipelineEvent::DownloadProgress { percent, .. } => {
                    if percent % 20 == 0 {
                        info!(percent, "model download progress");
                    }
                }
                PipelineEvent::DownloadCompleted => info!("model download complete"),
                PipelineEvent::DownloadError { msg } => tracing::error!(%msg, "model download failed"),
                PipelineEvent::JobFinished { job_id, outcome, detail, .. } => {
                    match outcome {
                        JobOutcome::Completed => completed += 1,
                        JobOutcome::Failed => failed += 1,
                        JobOutcome::Skipped => skipped += 1,
                    }
                    if let Some(bar) = bars.get(&job_id) {
                        let label = job_inputs.get(&job_id).map(|p| p.display().to_string()).unwrap_or(job_id.clone());
                        match outcome {
                            JobOutcome::Completed => bar.finish_with_message(format!("{label}: done")),
                            JobOutcome::Skipped => bar.finish_with_message(format!(
                                "{label}: skipped ({})",
                                detail.unwrap_or_default()
                            )),
                            JobOutcome::Failed => bar.finish_with_message(format!(
                                "{label}: failed ({})",
                                detail.unwrap_or_default()
                            )),
                        }
                    }
                }
            }
        }

        if scheduler.all_complete() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    scheduler.cleanup();

    if !cli.quiet {
        println!();
        println!("Batch complete in {:.1}s", start.elapsed().as_secs_f64());
        println!("  Completed: {completed}");
        println!("  Failed:    {failed}");
        println!("  Skipped:   {skipped}");
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn bar_for(bars: &mut HashMap<String, ProgressBar>, mp: &MultiProgress, job_id: &str, base_name: &str) -> ProgressBar {
    bars.entry(job_id.to_string())
        .or_insert_with(|| {
            let bar = mp.add(ProgressBar::new(100));
            bar.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            bar.set_message(base_name.to_string());
            bar
        })
        .clone()
}
