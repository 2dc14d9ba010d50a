use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::config::ConfigSnapshot;
use crate::events::{EventBus, EventSender, JobOutcome, PipelineEvent};
use crate::job::FileJob;
use crate::pipeline;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Bounded-concurrency FIFO dispatcher over `FileJob`s (spec §4.1, §5).
///
/// Generalizes the teacher's chunk-level `TranscriptionOrchestrator`
/// (`Semaphore` + `FuturesUnordered`, `examples/nayakayp-autosub/src/transcribe/orchestrator.rs`)
/// to job-level concurrency: each admitted job runs the full Pipeline
/// Worker (Extract→Transcribe→Translate→Burn) as its own task instead of
/// one chunk transcription call.
pub struct Scheduler {
    pending: VecDeque<FileJob>,
    config: ConfigSnapshot,
    semaphore: Arc<Semaphore>,
    active: Arc<AtomicUsize>,
    handles: Vec<JoinHandle<()>>,
    event_bus: EventBus,
    sender: EventSender,
}

impl Scheduler {
    pub fn new(config: ConfigSnapshot, task_count_hint: usize, event_capacity: usize) -> Self {
        let n = config.effective_concurrency(task_count_hint);
        let event_bus = EventBus::new(event_capacity);
        let sender = event_bus.sender();

        Self {
            pending: VecDeque::new(),
            config,
            semaphore: Arc::new(Semaphore::new(n)),
            active: Arc::new(AtomicUsize::new(0)),
            handles: Vec::new(),
            event_bus,
            sender,
        }
    }

    /// FIFO admission: push to `pending`, then immediately admit as many
    /// queued jobs as there are free slots (spec §4.1 "Contract").
    pub fn submit(&mut self, job: FileJob) -> String {
        let job_id = job.job_id.clone();
        self.pending.push_back(job);
        self.drain_admissions();
        job_id
    }

    fn drain_admissions(&mut self) {
        while let Ok(permit) = self.semaphore.clone().try_acquire_owned() {
            let Some(job) = self.pending.pop_front() else {
                drop(permit);
                break;
            };

            let sender = self.sender.clone();
            let active = self.active.clone();
            active.fetch_add(1, Ordering::SeqCst);

            let handle = tokio::spawn(async move {
                let _permit = permit; // held for the task's lifetime
                let job_id = job.job_id.clone();
                let input_path = job.input_path.display().to_string();

                match pipeline::run(&job, &sender).await {
                    Ok((outcome, detail)) => {
                        sender
                            .send(PipelineEvent::JobFinished {
                                job_id,
                                input_path,
                                outcome,
                                detail,
                            })
                            .await;
                    }
                    Err(err) => {
                        warn!(error = %err, "pipeline worker failed");
                        sender
                            .send(PipelineEvent::JobFinished {
                                job_id,
                                input_path,
                                outcome: JobOutcome::Failed,
                                detail: Some(err.detail()),
                            })
                            .await;
                    }
                }

                active.fetch_sub(1, Ordering::SeqCst);
            });

            self.handles.push(handle);
        }
    }

    /// Drain every event currently buffered, without blocking. Call
    /// periodically and after `submit`/`stop_all` to observe progress.
    pub fn poll_events(&mut self) -> Vec<PipelineEvent> {
        self.handles.retain(|h| !h.is_finished());
        self.drain_admissions();
        self.event_bus.poll_events()
    }

    pub fn all_complete(&self) -> bool {
        self.pending.is_empty() && self.active.load(Ordering::SeqCst) == 0
    }

    /// Graceful termination escalating to forced abort after a grace
    /// period (spec §4.1, §5 "Cancellation & timeouts").
    pub async fn stop_all(&mut self) {
        for job in self.pending.drain(..) {
            self.sender
                .send(PipelineEvent::JobFinished {
                    job_id: job.job_id.clone(),
                    input_path: job.input_path.display().to_string(),
                    outcome: JobOutcome::Failed,
                    detail: Some("cancelled".to_string()),
                })
                .await;
        }

        info!(grace_s = SHUTDOWN_GRACE.as_secs(), "waiting for in-flight jobs to finish");
        let deadline = tokio::time::Instant::now() + SHUTDOWN_GRACE;
        while tokio::time::Instant::now() < deadline && !self.handles.iter().all(|h| h.is_finished()) {
            tokio::time::sleep(Duration::from_millis(100)).await;
        }

        for handle in &self.handles {
            if !handle.is_finished() {
                handle.abort();
            }
        }
    }

    /// Drains the pending queue and the event channels (spec §4.1 `cleanup()`).
    pub fn cleanup(&mut self) {
        self.pending.clear();
        self.event_bus.drain();
        self.handles.clear();
    }
}
