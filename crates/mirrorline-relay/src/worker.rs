// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Job worker: claims due jobs from the durable queue and runs them on a
//! bounded pool of tasks.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use mirrorline_config::model::RelayConfig;
use mirrorline_core::{Job, JobStatus, MirrorError, StorageAdapter};

use crate::flush::{FlushExecutor, FlushOutcome};
use crate::scheduler::{BatchScheduler, FLUSH_JOB, FlushJob};
use crate::to_delta;

pub struct JobWorker {
    storage: Arc<dyn StorageAdapter>,
    executor: Arc<FlushExecutor>,
    scheduler: Arc<BatchScheduler>,
    config: RelayConfig,
}

impl JobWorker {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        executor: Arc<FlushExecutor>,
        scheduler: Arc<BatchScheduler>,
        config: &RelayConfig,
    ) -> Self {
        Self {
            storage,
            executor,
            scheduler,
            config: config.clone(),
        }
    }

    /// Poll for due jobs until `cancel` fires, then wait for in-flight jobs.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let workers = self.config.workers.max(1);
        let permits = Arc::new(Semaphore::new(workers));
        info!(workers, "job worker started");

        while !cancel.is_cancelled() {
            let free = permits.available_permits();
            if free > 0 {
                match self.storage.claim_due_jobs(Utc::now(), free).await {
                    Ok(jobs) if !jobs.is_empty() => {
                        for job in jobs {
                            let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                                break;
                            };
                            let worker = Arc::clone(&self);
                            tokio::spawn(async move {
                                worker.process(job).await;
                                drop(permit);
                            });
                        }
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "claiming jobs failed"),
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval()) => {}
            }
        }

        let _ = permits.acquire_many(workers as u32).await;
        info!("job worker stopped");
    }

    /// Claim and run every job due at `now`, concurrently. Returns how many ran.
    pub async fn run_due(self: &Arc<Self>, now: DateTime<Utc>) -> Result<usize, MirrorError> {
        let jobs = self
            .storage
            .claim_due_jobs(now, self.config.workers.max(1))
            .await?;
        let count = jobs.len();

        let mut tasks = JoinSet::new();
        for job in jobs {
            let worker = Arc::clone(self);
            tasks.spawn(async move { worker.process(job).await });
        }
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "job task panicked");
            }
        }
        Ok(count)
    }

    async fn process(&self, job: Job) {
        if job.kind != FLUSH_JOB {
            self.fail(&job, &format!("unknown job kind `{}`", job.kind), Duration::ZERO)
                .await;
            return;
        }
        let payload: FlushJob = match serde_json::from_str(&job.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.fail(&job, &format!("bad flush payload: {e}"), Duration::ZERO)
                    .await;
                return;
            }
        };
        let (bot, user) = (payload.bot_id, payload.user_id);

        match self
            .executor
            .flush(bot, user, job.is_final_attempt())
            .await
        {
            Ok(FlushOutcome::RateLimited { retry_after }) => {
                self.reschedule(&job, payload, retry_after).await;
            }
            Ok(FlushOutcome::Busy) => {
                self.reschedule(&job, payload, self.config.poll_interval())
                    .await;
            }
            Ok(outcome) => {
                debug!(job_id = job.id, bot_id = %bot, user_id = %user, ?outcome, "flush job done");
                self.complete(&job).await;
            }
            Err(e) => {
                let backoff = self
                    .config
                    .retry_backoff(job.attempts + 1)
                    .max(e.retry_after().unwrap_or_default());
                self.fail(&job, &e.to_string(), backoff).await;
            }
        }
    }

    /// Push the flush out by `delay` without spending a retry attempt.
    async fn reschedule(&self, job: &Job, payload: FlushJob, delay: Duration) {
        let at = Utc::now() + to_delta(delay);
        match self
            .scheduler
            .schedule_now(payload.bot_id, payload.user_id, at)
            .await
        {
            Ok(_) => self.complete(job).await,
            Err(e) => self.fail(job, &e.to_string(), delay).await,
        }
    }

    async fn complete(&self, job: &Job) {
        if let Err(e) = self.storage.complete_job(job.id).await {
            warn!(job_id = job.id, error = %e, "failed to complete job");
        }
    }

    async fn fail(&self, job: &Job, reason: &str, backoff: Duration) {
        let retry_at = Utc::now() + to_delta(backoff);
        match self.storage.fail_job(job.id, reason, retry_at).await {
            Ok(JobStatus::Failed) => {
                error!(job_id = job.id, attempts = job.attempts + 1, reason, "job failed permanently")
            }
            Ok(status) => {
                warn!(job_id = job.id, %status, %retry_at, reason, "job failed, will retry")
            }
            Err(e) => error!(job_id = job.id, error = %e, "failed to record job failure"),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use mirrorline_core::{BotId, MirrorConfig, NewJob, RelayItem, Role, TransportErrorKind, UserId};

    use crate::test_support::Fixture;

    use super::*;

    async fn submit(fx: &Fixture, config: &MirrorConfig, text: &str) {
        fx.relay
            .scheduler
            .submit(BotId(7), UserId(42), &RelayItem::new(Role::User, text, Utc::now()), config)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn due_flush_job_delivers_and_completes() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 2).await;
        submit(&fx, &config, "a").await;
        submit(&fx, &config, "b").await;

        let ran = fx.relay.worker.run_due(Utc::now()).await.unwrap();
        assert_eq!(ran, 1);
        assert_eq!(fx.transport.batches().await.len(), 1);
        assert_eq!(fx.relay.worker.run_due(Utc::now()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn failed_flush_is_retried_with_backoff() {
        let fx = Fixture::new().await;
        let config = fx.configure(BotId(7), 1).await;
        submit(&fx, &config, "a").await;
        fx.transport.fail_next_posts([TransportErrorKind::Transient]).await;

        assert_eq!(fx.relay.worker.run_due(Utc::now()).await.unwrap(), 1);
        assert!(fx.transport.batches().await.is_empty());
        assert_eq!(fx.relay.worker.run_due(Utc::now()).await.unwrap(), 0);

        let later = Utc::now() + TimeDelta::seconds(5);
        assert_eq!(fx.relay.worker.run_due(later).await.unwrap(), 1);
        assert_eq!(fx.transport.batches().await.len(), 1);
    }

    #[tokio::test]
    async fn unknown_job_kinds_fail() {
        let fx = Fixture::new().await;
        let id = fx
            .storage
            .schedule_job(&NewJob {
                kind: "mystery".into(),
                dedupe_key: None,
                payload: "{}".into(),
                run_at: Utc::now(),
                max_attempts: 1,
            })
            .await
            .unwrap();

        assert_eq!(fx.relay.worker.run_due(Utc::now()).await.unwrap(), 1);
        let later = Utc::now() + TimeDelta::hours(1);
        assert_eq!(fx.relay.worker.run_due(later).await.unwrap(), 0);
        assert!(id > 0);
    }

    #[tokio::test]
    async fn run_stops_on_cancel() {
        let fx = Fixture::new().await;
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Arc::clone(&fx.relay.worker).run(cancel.clone()));
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
