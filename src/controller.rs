use std::sync::Arc;

use crossbeam_channel::Sender;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SampleError;
use crate::metrics::Summary;
use crate::sampler::{Fetch, SpeedSampler};

#[derive(Debug)]
pub enum RunOutcome {
    Completed(Summary),
    Cancelled,
    Failed(SampleError),
}

impl From<Result<Summary, SampleError>> for RunOutcome {
    fn from(result: Result<Summary, SampleError>) -> Self {
        match result {
            Ok(summary) => RunOutcome::Completed(summary),
            Err(SampleError::Cancelled) => RunOutcome::Cancelled,
            Err(e) => RunOutcome::Failed(e),
        }
    }
}

#[derive(Debug)]
pub enum RunEventKind {
    Started { total: u32 },
    /// 1-based index of the sample about to run.
    Progress { index: u32, total: u32 },
    Finished(RunOutcome),
}

#[derive(Debug)]
pub struct RunEvent {
    pub run: u64,
    pub kind: RunEventKind,
}

/// Requests from the UI side.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Trigger,
    Cancel,
    Quit,
}

struct ActiveRun {
    id: u64,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Owns at most one run at a time. Starting a run cancels the active one and
/// waits for it to finish before the new one issues its first request.
pub struct RunController<F> {
    sampler: Arc<SpeedSampler<F>>,
    total_samples: u32,
    events: Sender<RunEvent>,
    next_run: u64,
    active: Option<ActiveRun>,
}

impl<F: Fetch + 'static> RunController<F> {
    pub fn new(sampler: Arc<SpeedSampler<F>>, total_samples: u32, events: Sender<RunEvent>) -> Self {
        Self {
            sampler,
            total_samples,
            events,
            next_run: 0,
            active: None,
        }
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|run| !run.handle.is_finished())
    }

    pub async fn start(&mut self) -> u64 {
        self.cancel().await;

        self.next_run += 1;
        let id = self.next_run;
        let total = self.total_samples;
        let cancel = CancellationToken::new();

        let sampler = Arc::clone(&self.sampler);
        let events = self.events.clone();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            info!(run = id, samples = total, "Starting speed test");
            let _ = events.send(RunEvent { run: id, kind: RunEventKind::Started { total } });

            let progress = events.clone();
            let result = sampler
                .run_all(total, token, move |index| {
                    let _ = progress.send(RunEvent { run: id, kind: RunEventKind::Progress { index, total } });
                })
                .await;

            let outcome = RunOutcome::from(result);
            match &outcome {
                RunOutcome::Completed(s) => info!(
                    run = id,
                    bps = s.avg_bits_per_sec,
                    kbps = s.avg_kb_per_sec,
                    mbps = s.avg_mb_per_sec,
                    "Speed test completed"
                ),
                RunOutcome::Cancelled => info!(run = id, "Speed test aborted"),
                RunOutcome::Failed(e) => error!(run = id, error = %e, "Speed test failed"),
            }
            let _ = events.send(RunEvent { run: id, kind: RunEventKind::Finished(outcome) });
        });

        self.active = Some(ActiveRun { id, cancel, handle });
        id
    }

    /// Cancels the active run, if any, and waits for its task to wind down.
    pub async fn cancel(&mut self) {
        if let Some(run) = self.active.take() {
            run.cancel.cancel();
            Self::reap(run).await;
        }
    }

    #[cfg(test)]
    pub async fn join(&mut self) {
        if let Some(run) = self.active.take() {
            Self::reap(run).await;
        }
    }

    async fn reap(run: ActiveRun) {
        if let Err(e) = run.handle.await {
            if !e.is_cancelled() {
                warn!(run = run.id, ?e, "Run task ended abnormally");
            }
        }
    }

    /// Drives the controller from UI commands until `Quit` or the sender is dropped.
    pub async fn serve(mut self, mut commands: UnboundedReceiver<Command>) {
        while let Some(cmd) = commands.recv().await {
            match cmd {
                Command::Trigger => {
                    self.start().await;
                }
                Command::Cancel => {
                    debug!(running = self.is_running(), "Cancel requested");
                    self.cancel().await;
                }
                Command::Quit => break,
            }
        }
        self.cancel().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::tests::{stepping_clock, FixedPayload, Hanging};
    use crossbeam_channel as channel;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    fn labels(events: &[RunEvent]) -> Vec<String> {
        events
            .iter()
            .map(|e| match &e.kind {
                RunEventKind::Started { total } => format!("{} started/{total}", e.run),
                RunEventKind::Progress { index, total } => format!("{} sample {index}/{total}", e.run),
                RunEventKind::Finished(RunOutcome::Completed(_)) => format!("{} completed", e.run),
                RunEventKind::Finished(RunOutcome::Cancelled) => format!("{} cancelled", e.run),
                RunEventKind::Finished(RunOutcome::Failed(_)) => format!("{} failed", e.run),
            })
            .collect()
    }

    #[tokio::test]
    async fn completed_run_publishes_progress_and_summary() {
        let (tx, rx) = channel::unbounded();
        let sampler = Arc::new(SpeedSampler::with_clock(FixedPayload::new(125_000), Duration::ZERO, stepping_clock(Duration::from_secs(1))));
        let mut controller = RunController::new(sampler, 2, tx);

        let id = controller.start().await;
        controller.join().await;
        assert!(!controller.is_running());

        let events: Vec<RunEvent> = rx.try_iter().collect();
        assert_eq!(
            labels(&events),
            vec!["1 started/2", "1 sample 1/2", "1 sample 2/2", "1 completed"]
        );
        assert_eq!(id, 1);
        match &events[3].kind {
            RunEventKind::Finished(RunOutcome::Completed(s)) => assert_eq!(s.avg_bits_per_sec, 1_000_000.0),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn new_run_cancels_in_flight_sample_first() {
        let (tx, rx) = channel::unbounded();
        let sampler = Arc::new(SpeedSampler::with_clock(Hanging::new(32, 1), Duration::ZERO, stepping_clock(Duration::from_millis(20))));
        let mut controller = RunController::new(Arc::clone(&sampler), 2, tx);

        controller.start().await;
        sampler.fetcher().entered.notified().await;
        assert!(controller.is_running());

        let second = controller.start().await;
        controller.join().await;

        assert_eq!(second, 2);
        assert_eq!(
            labels(&rx.try_iter().collect::<Vec<_>>()),
            vec![
                "1 started/2",
                "1 sample 1/2",
                "1 cancelled",
                "2 started/2",
                "2 sample 1/2",
                "2 sample 2/2",
                "2 completed",
            ]
        );
        // the hung request was dropped before the new run's first request went out
        let log = sampler.fetcher().log.lock().unwrap().clone();
        assert_eq!(&log[..3], ["start 1", "end 1", "start 2"]);
        assert_eq!(sampler.fetcher().started.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn cancel_ends_run_with_cancelled_outcome() {
        let (tx, rx) = channel::unbounded();
        let sampler = Arc::new(SpeedSampler::new(Hanging::new(8, u32::MAX), Duration::ZERO));
        let mut controller = RunController::new(Arc::clone(&sampler), 3, tx);

        controller.start().await;
        sampler.fetcher().entered.notified().await;
        controller.cancel().await;

        assert!(!controller.is_running());
        assert_eq!(labels(&rx.try_iter().collect::<Vec<_>>()), vec!["1 started/3", "1 sample 1/3", "1 cancelled"]);
        assert_eq!(sampler.fetcher().started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn cancel_when_idle_is_a_no_op() {
        let (tx, rx) = channel::unbounded();
        let sampler = Arc::new(SpeedSampler::new(FixedPayload::new(1), Duration::ZERO));
        let mut controller = RunController::new(sampler, 1, tx);
        controller.cancel().await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn serve_runs_until_quit() {
        let (tx, rx) = channel::unbounded();
        let (cmd_tx, cmd_rx) = tokio::sync::mpsc::unbounded_channel();
        let sampler = Arc::new(SpeedSampler::new(Hanging::new(8, u32::MAX), Duration::ZERO));
        let controller = RunController::new(Arc::clone(&sampler), 3, tx);
        let server = tokio::spawn(controller.serve(cmd_rx));

        cmd_tx.send(Command::Trigger).unwrap();
        sampler.fetcher().entered.notified().await;
        cmd_tx.send(Command::Quit).unwrap();
        server.await.unwrap();

        assert_eq!(labels(&rx.try_iter().collect::<Vec<_>>()), vec!["1 started/3", "1 sample 1/3", "1 cancelled"]);
    }

    #[test]
    fn outcome_from_result() {
        assert!(matches!(RunOutcome::from(Err(SampleError::Cancelled)), RunOutcome::Cancelled));
        assert!(matches!(
            RunOutcome::from(Err(SampleError::ZeroDuration { elapsed_secs: 0.0 })),
            RunOutcome::Failed(SampleError::ZeroDuration { .. })
        ));
    }
}
