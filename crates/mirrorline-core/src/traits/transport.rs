// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport client trait for the destination chat platform.

use async_trait::async_trait;

use crate::error::MirrorError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{BotId, ControlPanel, DestinationId, MessageId, ThreadId};

/// Client for the platform that hosts review destinations.
///
/// Every call acts on behalf of `bot`, whose credentials the implementation
/// resolves itself.
#[async_trait]
pub trait TransportClient: PluginAdapter {
    /// Longest text accepted by a single `post_message` call, in UTF-16
    /// code units.
    fn max_message_length(&self) -> usize;

    async fn create_thread(
        &self,
        bot: BotId,
        destination: &DestinationId,
        name: &str,
    ) -> Result<ThreadId, MirrorError>;

    async fn post_message(
        &self,
        bot: BotId,
        destination: &DestinationId,
        thread: &ThreadId,
        text: &str,
        panel: Option<&ControlPanel>,
    ) -> Result<MessageId, MirrorError>;

    async fn pin_message(
        &self,
        bot: BotId,
        destination: &DestinationId,
        message: &MessageId,
    ) -> Result<(), MirrorError>;
}
