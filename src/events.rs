use tokio::sync::mpsc;

/// Outcome recorded on a terminal `JobFinished` event (spec §3 `JobState`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    Skipped,
}

/// Typed events emitted by every component into the bus (spec §3, §4.7).
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Progress {
        job_id: String,
        base_name: String,
        percent: u8,
    },
    Status {
        job_id: String,
        base_name: String,
        text: String,
    },
    TimerTick {
        job_id: String,
        base_name: String,
        elapsed_mm_ss: String,
    },
    DownloadStarted {
        model_name: String,
    },
    DownloadProgress {
        percent: u8,
        downloaded_mb: f64,
        total_mb: f64,
        speed_mbps: f64,
    },
    DownloadCompleted,
    DownloadError {
        msg: String,
    },
    JobFinished {
        job_id: String,
        input_path: String,
        outcome: JobOutcome,
        detail: Option<String>,
    },
}

/// Multi-producer / single-consumer channel of `PipelineEvent`s.
///
/// Backed by a *bounded* `mpsc` channel rather than `broadcast`: broadcast
/// drops messages for a lagging receiver, which violates the "no silent
/// drops" requirement (spec §4.7, §9). A full buffer makes producers wait
/// instead. Ordering is preserved per-producer; cross-producer interleaving
/// is unspecified, matching the spec.
pub struct EventBus {
    sender: mpsc::Sender<PipelineEvent>,
    receiver: mpsc::Receiver<PipelineEvent>,
}

/// A cloneable handle producers use to emit events; never see the receiver.
#[derive(Clone)]
pub struct EventSender(mpsc::Sender<PipelineEvent>);

impl EventSender {
    pub async fn send(&self, event: PipelineEvent) {
        // An Err here means the consumer dropped the receiver entirely
        // (e.g. during shutdown); there's no one left to block for.
        let _ = self.0.send(event).await;
    }
}

impl EventBus {
    /// `capacity` bounds in-flight events before producers block; it is a
    /// backpressure knob, not a drop threshold.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        Self { sender, receiver }
    }

    pub fn sender(&self) -> EventSender {
        EventSender(self.sender.clone())
    }

    /// Drain every event currently buffered, without blocking.
    pub fn poll_events(&mut self) -> Vec<PipelineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Drain and discard everything still queued (spec §4.1 `cleanup()`).
    pub fn drain(&mut self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_are_delivered_in_order_per_producer() {
        let mut bus = EventBus::new(16);
        let tx = bus.sender();

        tx.send(PipelineEvent::Status {
            job_id: "j1".into(),
            base_name: "b".into(),
            text: "extracting".into(),
        })
        .await;
        tx.send(PipelineEvent::Progress {
            job_id: "j1".into(),
            base_name: "b".into(),
            percent: 10,
        })
        .await;

        let events = bus.poll_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], PipelineEvent::Status { .. }));
        assert!(matches!(events[1], PipelineEvent::Progress { .. }));
    }

    #[tokio::test]
    async fn drain_empties_the_queue() {
        let mut bus = EventBus::new(16);
        let tx = bus.sender();
        tx.send(PipelineEvent::DownloadCompleted).await;
        bus.drain();
        assert!(bus.poll_events().is_empty());
    }

    #[tokio::test]
    async fn full_buffer_makes_producer_wait_not_drop() {
        let mut bus = EventBus::new(1);
        let tx = bus.sender();
        tx.send(PipelineEvent::DownloadCompleted).await;

        // Second send would block on a capacity-1 channel; spawn it and
        // confirm it only completes once the consumer drains.
        let tx2 = tx.clone();
        let handle = tokio::spawn(async move {
            tx2.send(PipelineEvent::DownloadCompleted).await;
        });

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert!(!handle.is_finished());

        bus.poll_events();
        handle.await.unwrap();
    }
}
