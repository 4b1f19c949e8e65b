//! Cron-driven offer sync.
//!
//! The cron job never runs a sync itself. It only pushes a trigger into a
//! capacity-1 channel, so triggers that fire while a tick is running coalesce
//! into at most one follow-up tick. A single worker task drains the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use thiserror::Error;
use tokio::sync::{Mutex, Notify, mpsc};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};
use tracing::{debug, error, info, warn};

use super::service::OfferSync;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("invalid sync schedule {schedule:?}: {source}")]
    InvalidSchedule {
        schedule: String,
        #[source]
        source: JobSchedulerError,
    },

    #[error("cron scheduler failed: {0}")]
    Cron(#[from] JobSchedulerError),
}

struct Running {
    cron: JobScheduler,
    shutdown: Arc<Notify>,
    trigger: mpsc::Sender<()>,
    // Never joined; stop() only signals the worker.
    _worker: JoinHandle<()>,
}

pub struct SyncScheduler {
    sync: Arc<OfferSync>,
    schedule: String,
    stopped: Arc<AtomicBool>,
    running: Mutex<Option<Running>>,
}

impl SyncScheduler {
    pub fn new(sync: Arc<OfferSync>, schedule: impl Into<String>) -> Self {
        Self {
            sync,
            schedule: schedule.into(),
            stopped: Arc::new(AtomicBool::new(true)),
            running: Mutex::new(None),
        }
    }

    pub fn schedule(&self) -> &str {
        &self.schedule
    }

    pub async fn is_running(&self) -> bool {
        self.running.lock().await.is_some()
    }

    /// Register the cron job and spawn the worker. No-op when already running.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        let mut running = self.running.lock().await;
        if running.is_some() {
            debug!("scheduler already running");
            return Ok(());
        }

        let (trigger_tx, trigger_rx) = mpsc::channel::<()>(1);
        let cron = self.build_cron(trigger_tx.clone()).await?;

        self.stopped.store(false, Ordering::SeqCst);
        let shutdown = Arc::new(Notify::new());
        let worker = tokio::spawn(worker_loop(
            self.sync.clone(),
            trigger_rx,
            shutdown.clone(),
            self.stopped.clone(),
        ));

        if let Err(e) = cron.start().await {
            self.stopped.store(true, Ordering::SeqCst);
            shutdown.notify_one();
            return Err(e.into());
        }

        info!(schedule = %self.schedule, "scheduler started");
        *running = Some(Running {
            cron,
            shutdown,
            trigger: trigger_tx,
            _worker: worker,
        });
        Ok(())
    }

    async fn build_cron(&self, trigger: mpsc::Sender<()>) -> Result<JobScheduler, SchedulerError> {
        let job = Job::new_async(self.schedule.as_str(), move |_uuid, _l| {
            let trigger = trigger.clone();
            Box::pin(async move {
                if trigger.try_send(()).is_err() {
                    debug!("sync tick already pending, coalescing trigger");
                }
            })
        })
        .map_err(|source| SchedulerError::InvalidSchedule {
            schedule: self.schedule.clone(),
            source,
        })?;

        let cron = JobScheduler::new().await?;
        cron.add(job).await?;
        Ok(cron)
    }

    /// Queue an immediate tick. Returns `false` when a tick is already
    /// pending or the scheduler is not running.
    pub async fn trigger(&self) -> bool {
        match self.running.lock().await.as_ref() {
            Some(running) => running.trigger.try_send(()).is_ok(),
            None => false,
        }
    }

    /// Stop firing and signal the worker. A tick in progress finishes on its
    /// own; no new tick starts. No-op when not running.
    pub async fn stop(&self) {
        let Some(mut running) = self.running.lock().await.take() else {
            return;
        };

        self.stopped.store(true, Ordering::SeqCst);
        running.shutdown.notify_one();
        if let Err(e) = running.cron.shutdown().await {
            warn!(error = %e, "cron scheduler did not shut down cleanly");
        }
        info!("scheduler stopped");
    }
}

async fn worker_loop(
    sync: Arc<OfferSync>,
    mut triggers: mpsc::Receiver<()>,
    shutdown: Arc<Notify>,
    stopped: Arc<AtomicBool>,
) {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.notified() => break,
            msg = triggers.recv() => {
                if msg.is_none() || stopped.load(Ordering::SeqCst) {
                    break;
                }
                // Errors are logged by run_tick; the next trigger retries.
                if let Err(e) = sync.run_tick().await {
                    error!(error = %e, "offer sync tick aborted");
                }
            }
        }
    }
    debug!("sync worker exited");
}
