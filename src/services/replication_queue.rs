use crate::services::replication::MultipartUploader;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Time cancelled workers get to abort their open multipart uploads
const CANCEL_SETTLE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct ReplicationJob {
    pub key: String,
    pub queued_at: Instant,
}

/// Producer side of the replication queue, cloned into every ingestion path.
#[derive(Clone)]
pub struct ReplicationQueue {
    tx: mpsc::Sender<ReplicationJob>,
}

impl ReplicationQueue {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<ReplicationJob>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Queue `key` for replication, waiting while the queue is full.
    /// Returns false when the pool is no longer accepting work.
    pub async fn enqueue(&self, key: &str) -> bool {
        let job = ReplicationJob {
            key: key.to_string(),
            queued_at: Instant::now(),
        };

        match self.tx.send(job).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "Replication queue closed, {} will not be replicated",
                    e.0.key
                );
                false
            }
        }
    }
}

/// Keys left behind when the pool stopped
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub abandoned_in_flight: Vec<String>,
    pub abandoned_queued: Vec<String>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.abandoned_in_flight.is_empty() && self.abandoned_queued.is_empty()
    }
}

pub struct ReplicationPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
    cancel: CancellationToken,
    receiver: Arc<Mutex<mpsc::Receiver<ReplicationJob>>>,
    in_flight: Arc<DashMap<String, Instant>>,
}

impl ReplicationPool {
    pub fn start(
        uploader: Arc<MultipartUploader>,
        workers: usize,
        capacity: usize,
    ) -> (ReplicationQueue, ReplicationPool) {
        let (queue, rx) = ReplicationQueue::channel(capacity);
        let receiver = Arc::new(Mutex::new(rx));
        let in_flight = Arc::new(DashMap::new());
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let cancel = CancellationToken::new();

        let workers = workers.max(1);
        let handles = (0..workers)
            .map(|id| {
                tokio::spawn(run_worker(
                    id,
                    uploader.clone(),
                    receiver.clone(),
                    in_flight.clone(),
                    shutdown_rx.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!("🚀 Replication pool started ({} workers)", workers);

        (
            queue,
            ReplicationPool {
                handles,
                shutdown_tx,
                cancel,
                receiver,
                in_flight,
            },
        )
    }

    /// Keys currently being replicated
    pub fn in_flight(&self) -> Vec<String> {
        self.in_flight.iter().map(|e| e.key().clone()).collect()
    }

    async fn join_workers(&mut self, limit: Duration) -> bool {
        let pending = self.handles.iter_mut().filter(|h| !h.is_finished());
        tokio::time::timeout(limit, futures::future::join_all(pending))
            .await
            .is_ok()
    }

    /// Stop taking jobs, wait up to `grace` for in-flight replications,
    /// and report whatever was left behind.
    ///
    /// Replications still running after `grace` are cancelled, which aborts
    /// their multipart uploads on the store.
    pub async fn shutdown(mut self, grace: Duration) -> ShutdownReport {
        tracing::info!("🛑 Replication pool shutting down");
        let _ = self.shutdown_tx.send(true);

        let mut report = ShutdownReport::default();

        if !self.join_workers(grace).await {
            report.abandoned_in_flight = self.in_flight();
            self.cancel.cancel();

            if !self.join_workers(CANCEL_SETTLE).await {
                tracing::error!("❌ Replication workers did not stop after cancellation");
                for handle in &self.handles {
                    handle.abort();
                }
            }
        }

        {
            let mut rx = self.receiver.lock().await;
            rx.close();
            while let Ok(job) = rx.try_recv() {
                report.abandoned_queued.push(job.key);
            }
        }

        for key in &report.abandoned_in_flight {
            tracing::warn!("Replication of {} abandoned while in flight", key);
        }
        for key in &report.abandoned_queued {
            tracing::warn!("Replication of {} abandoned in queue", key);
        }

        if report.is_clean() {
            tracing::info!("✅ Replication pool stopped");
        }

        report
    }
}

async fn run_worker(
    id: usize,
    uploader: Arc<MultipartUploader>,
    receiver: Arc<Mutex<mpsc::Receiver<ReplicationJob>>>,
    in_flight: Arc<DashMap<String, Instant>>,
    mut shutdown: watch::Receiver<bool>,
    cancel: CancellationToken,
) {
    tracing::debug!("Replication worker {} started", id);

    loop {
        let job = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };

        let Some(job) = job else { break };

        tracing::debug!(
            "Worker {} picked up {} after {:?} in queue",
            id,
            job.key,
            job.queued_at.elapsed()
        );

        in_flight.insert(job.key.clone(), Instant::now());
        uploader.replicate_until(&job.key, &cancel).await;
        in_flight.remove(&job.key);
    }

    tracing::debug!("Replication worker {} stopped", id);
}
