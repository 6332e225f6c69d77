// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock transport client for deterministic testing.
//!
//! `MockTransport` implements `TransportClient`, capturing created threads,
//! posted messages, and pins for assertion. Post failures can be injected.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use mirrorline_core::{
    AdapterType, BotId, ControlPanel, DestinationId, HealthStatus, MessageId, MirrorError,
    PluginAdapter, ThreadId, TransportClient, TransportErrorKind,
};

/// A thread created through the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedThread {
    pub bot_id: BotId,
    pub destination: DestinationId,
    pub name: String,
    pub thread_id: ThreadId,
}

/// A message posted through the mock.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub bot_id: BotId,
    pub destination: DestinationId,
    pub thread_id: ThreadId,
    pub text: String,
    pub panel: Option<ControlPanel>,
}

pub struct MockTransport {
    threads: Arc<Mutex<Vec<CreatedThread>>>,
    posts: Arc<Mutex<Vec<PostedMessage>>>,
    pins: Arc<Mutex<Vec<MessageId>>>,
    failures: Arc<Mutex<VecDeque<TransportErrorKind>>>,
    create_delay: Arc<Mutex<Duration>>,
    next_id: AtomicU64,
    max_message_length: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::with_max_message_length(4096)
    }

    pub fn with_max_message_length(max_message_length: usize) -> Self {
        Self {
            threads: Arc::new(Mutex::new(Vec::new())),
            posts: Arc::new(Mutex::new(Vec::new())),
            pins: Arc::new(Mutex::new(Vec::new())),
            failures: Arc::new(Mutex::new(VecDeque::new())),
            create_delay: Arc::new(Mutex::new(Duration::ZERO)),
            next_id: AtomicU64::new(1),
            max_message_length,
        }
    }

    /// Fail the next relayed posts (control panels are never failed) with `kinds`, in order.
    pub async fn fail_next_posts(&self, kinds: impl IntoIterator<Item = TransportErrorKind>) {
        self.failures.lock().await.extend(kinds);
    }

    /// Make `create_thread` slow, to widen creation races.
    pub async fn set_create_delay(&self, delay: Duration) {
        *self.create_delay.lock().await = delay;
    }

    pub async fn created_threads(&self) -> Vec<CreatedThread> {
        self.threads.lock().await.clone()
    }

    /// Every posted message, control panels included.
    pub async fn posted(&self) -> Vec<PostedMessage> {
        self.posts.lock().await.clone()
    }

    /// Texts of relayed batches, without control panels.
    pub async fn batches(&self) -> Vec<String> {
        self.posts
            .lock()
            .await
            .iter()
            .filter(|p| p.panel.is_none())
            .map(|p| p.text.clone())
            .collect()
    }

    pub async fn pinned(&self) -> Vec<MessageId> {
        self.pins.lock().await.clone()
    }

    fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MirrorError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), MirrorError> {
        Ok(())
    }
}

#[async_trait]
impl TransportClient for MockTransport {
    fn max_message_length(&self) -> usize {
        self.max_message_length
    }

    async fn create_thread(
        &self,
        bot: BotId,
        destination: &DestinationId,
        name: &str,
    ) -> Result<ThreadId, MirrorError> {
        let delay = *self.create_delay.lock().await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let thread_id = ThreadId(format!("thread-{}", self.next_id()));
        self.threads.lock().await.push(CreatedThread {
            bot_id: bot,
            destination: destination.clone(),
            name: name.to_string(),
            thread_id: thread_id.clone(),
        });
        Ok(thread_id)
    }

    async fn post_message(
        &self,
        bot: BotId,
        destination: &DestinationId,
        thread: &ThreadId,
        text: &str,
        panel: Option<&ControlPanel>,
    ) -> Result<MessageId, MirrorError> {
        if panel.is_none()
            && let Some(kind) = self.failures.lock().await.pop_front()
        {
            return Err(MirrorError::transport(kind, "injected failure"));
        }
        self.posts.lock().await.push(PostedMessage {
            bot_id: bot,
            destination: destination.clone(),
            thread_id: thread.clone(),
            text: text.to_string(),
            panel: panel.cloned(),
        });
        Ok(MessageId(self.next_id().to_string()))
    }

    async fn pin_message(
        &self,
        _bot: BotId,
        _destination: &DestinationId,
        message: &MessageId,
    ) -> Result<(), MirrorError> {
        self.pins.lock().await.push(message.clone());
        Ok(())
    }
}
