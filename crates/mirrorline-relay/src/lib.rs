// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Mirrorline relay pipeline.
//!
//! Inbound messages enter through [`MirrorPipeline`], are buffered per
//! (bot, user) pair by the [`BatchScheduler`], and are delivered to review
//! threads by the [`FlushExecutor`] when a flush job fires. The
//! [`RecoverySweeper`] re-arms buffers that lost their job, and the
//! [`ControlHandler`] applies operator actions from pinned control panels.
//!
//! All shared state lives behind the [`CacheStore`] and [`StorageAdapter`]
//! traits. The flush lock, thread-creation lock and rate gate live in the
//! cache, so with the in-process `MemoryCache` they coordinate workers of a
//! single relay process only. Running several processes against one database
//! needs a networked `CacheStore`.

pub mod buffer;
pub mod collaborators;
pub mod control;
pub mod flush;
pub mod pipeline;
pub mod rate;
pub mod registry;
pub mod render;
pub mod resolver;
pub mod scheduler;
pub mod sweeper;
pub mod user_state;
pub mod worker;

#[cfg(test)]
pub(crate) mod test_support;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::TimeDelta;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use mirrorline_config::model::RelayConfig;
use mirrorline_core::{
    CacheStore, ConversationEngine, DirectoryService, MirrorError, StorageAdapter,
    TransportClient,
};

pub use buffer::BufferStore;
pub use collaborators::{LoggingEngine, MemoryDirectory, NullDirectory};
pub use control::{CallbackOutcome, ControlHandler};
pub use flush::{FlushExecutor, FlushOutcome};
pub use pipeline::{MirrorDisposition, MirrorPipeline, MirrorRequest};
pub use rate::{RateDecision, RateGate};
pub use registry::ThreadRegistry;
pub use resolver::DestinationResolver;
pub use scheduler::{BatchScheduler, FlushJob, Scheduled};
pub use sweeper::{RecoverySweeper, SweepReport};
pub use user_state::UserStateStore;
pub use worker::JobWorker;

/// External systems the relay is wired against.
#[derive(Clone)]
pub struct RelayDeps {
    pub storage: Arc<dyn StorageAdapter>,
    pub cache: Arc<dyn CacheStore>,
    pub transport: Arc<dyn TransportClient>,
    pub directory: Arc<dyn DirectoryService>,
    pub engine: Arc<dyn ConversationEngine>,
}

/// Every relay component, wired once at startup and shared by reference.
pub struct Relay {
    pub config: RelayConfig,
    pub resolver: Arc<DestinationResolver>,
    pub user_states: Arc<UserStateStore>,
    pub registry: Arc<ThreadRegistry>,
    pub buffer: Arc<BufferStore>,
    pub scheduler: Arc<BatchScheduler>,
    pub executor: Arc<FlushExecutor>,
    pub sweeper: Arc<RecoverySweeper>,
    pub control: Arc<ControlHandler>,
    pub worker: Arc<JobWorker>,
    pub pipeline: Arc<MirrorPipeline>,
}

impl Relay {
    pub fn new(config: RelayConfig, deps: RelayDeps) -> Self {
        let resolver = Arc::new(DestinationResolver::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.cache),
            Duration::from_secs(config.config_cache_ttl_secs),
        ));
        let user_states = Arc::new(UserStateStore::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.cache),
            Duration::from_secs(config.user_state_cache_ttl_secs),
        ));
        let registry = Arc::new(ThreadRegistry::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.cache),
            Arc::clone(&deps.transport),
            Arc::clone(&deps.directory),
            &config,
        ));
        let buffer = Arc::new(BufferStore::new(
            Arc::clone(&deps.cache),
            Arc::clone(&deps.storage),
            &config,
        ));
        let scheduler = Arc::new(BatchScheduler::new(
            Arc::clone(&deps.storage),
            Arc::clone(&buffer),
            &config,
        ));
        let executor = Arc::new(FlushExecutor::new(
            Arc::clone(&deps.cache),
            Arc::clone(&deps.storage),
            Arc::clone(&deps.transport),
            Arc::clone(&resolver),
            Arc::clone(&registry),
            Arc::clone(&buffer),
            &config,
        ));
        let sweeper = Arc::new(RecoverySweeper::new(
            Arc::clone(&deps.storage),
            Arc::clone(&deps.cache),
            Arc::clone(&buffer),
            Arc::clone(&resolver),
            Arc::clone(&scheduler),
            &config,
        ));
        let control = Arc::new(ControlHandler::new(
            Arc::clone(&user_states),
            Arc::clone(&registry),
            Arc::clone(&deps.engine),
        ));
        let worker = Arc::new(JobWorker::new(
            Arc::clone(&deps.storage),
            Arc::clone(&executor),
            Arc::clone(&scheduler),
            &config,
        ));
        let pipeline = Arc::new(MirrorPipeline::new(
            Arc::clone(&resolver),
            Arc::clone(&user_states),
            Arc::clone(&scheduler),
        ));

        Self {
            config,
            resolver,
            user_states,
            registry,
            buffer,
            scheduler,
            executor,
            sweeper,
            control,
            worker,
            pipeline,
        }
    }

    /// Start the job worker and the periodic sweeper.
    ///
    /// Both tasks stop when `cancel` fires; the worker finishes in-flight
    /// jobs first.
    pub fn spawn(&self, cancel: CancellationToken) -> Vec<JoinHandle<()>> {
        vec![
            tokio::spawn(Arc::clone(&self.worker).run(cancel.clone())),
            tokio::spawn(Arc::clone(&self.sweeper).run(cancel)),
        ]
    }
}

/// Run a transport call with a deadline.
pub(crate) async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = Result<T, MirrorError>>,
) -> Result<T, MirrorError> {
    tokio::time::timeout(limit, call)
        .await
        .map_err(|_| MirrorError::Timeout { duration: limit })?
}

/// Convert a std duration to a chrono delta; out-of-range values become one year.
pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or_else(|_| TimeDelta::days(365))
}
