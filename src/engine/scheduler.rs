use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};

use super::{recommender::Recommender, SchedulerConfig};

/// Requests model rebuilds in response to new ratings
///
/// Notifications are coalesced by a background task: a rebuild starts once ratings stop
/// arriving for the debounce window, immediately once `max_pending` ratings have piled
/// up, or on the periodic tick if anything is still unapplied.
#[derive(Clone)]
pub struct RetrainScheduler {
    notify_tx: mpsc::UnboundedSender<()>,
    pending: Arc<AtomicUsize>,
}

/// Handle for gracefully shutting down the scheduler task
pub struct RetrainSchedulerHandle {
    shutdown_tx: mpsc::Sender<()>,
    task: JoinHandle<()>,
}

impl RetrainSchedulerHandle {
    /// Stops the scheduler, waiting for an in-flight rebuild to finish
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(()).await;
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Retrain scheduler task panicked");
        }
        tracing::info!("Retrain scheduler stopped");
    }
}

impl RetrainScheduler {
    /// Spawns the background task that drives rebuilds for `recommender`
    pub fn spawn(
        recommender: Arc<Recommender>,
        config: SchedulerConfig,
    ) -> (Self, RetrainSchedulerHandle) {
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
        let pending = Arc::new(AtomicUsize::new(0));

        let task = tokio::spawn(Self::scheduler_task(
            recommender,
            config,
            pending.clone(),
            notify_rx,
            shutdown_rx,
        ));

        (
            Self { notify_tx, pending },
            RetrainSchedulerHandle { shutdown_tx, task },
        )
    }

    /// Records that a rating changed and a rebuild is due
    pub fn notify_rating(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
        if self.notify_tx.send(()).is_err() {
            tracing::warn!("Retrain scheduler is not running, rating will apply on next rebuild");
        }
    }

    /// Ratings recorded since the last successful rebuild started
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    async fn scheduler_task(
        recommender: Arc<Recommender>,
        config: SchedulerConfig,
        pending: Arc<AtomicUsize>,
        mut notify_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown_rx: mpsc::Receiver<()>,
    ) {
        tracing::info!(
            debounce_ms = config.debounce.as_millis() as u64,
            max_pending = config.max_pending,
            interval_secs = config.interval.as_secs(),
            "Retrain scheduler started"
        );

        let mut interval = tokio::time::interval(config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately
        interval.tick().await;

        let mut deadline: Option<Instant> = None;

        loop {
            tokio::select! {
                Some(()) = notify_rx.recv() => {
                    if pending.load(Ordering::SeqCst) >= config.max_pending {
                        deadline = None;
                        Self::run_retrain(&recommender, &pending, "batch").await;
                    } else {
                        deadline = Some(Instant::now() + config.debounce);
                    }
                }
                _ = wait_until(deadline) => {
                    deadline = None;
                    Self::run_retrain(&recommender, &pending, "debounce").await;
                }
                _ = interval.tick() => {
                    if pending.load(Ordering::SeqCst) > 0 {
                        deadline = None;
                        Self::run_retrain(&recommender, &pending, "interval").await;
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!(
                        pending = pending.load(Ordering::SeqCst),
                        "Retrain scheduler shutting down"
                    );
                    break;
                }
            }
        }
    }

    /// Rebuilds once; on failure the pending count is restored so a later trigger retries
    async fn run_retrain(recommender: &Recommender, pending: &AtomicUsize, trigger: &'static str) {
        let applied = pending.swap(0, Ordering::SeqCst);
        match recommender.retrain().await {
            Ok(report) => {
                tracing::info!(
                    trigger,
                    applied,
                    generation = report.generation,
                    "Scheduled retrain completed"
                );
            }
            Err(e) => {
                pending.fetch_add(applied, Ordering::SeqCst);
                tracing::warn!(
                    trigger,
                    error = %e,
                    "Scheduled retrain failed, previous model still served"
                );
            }
        }
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
