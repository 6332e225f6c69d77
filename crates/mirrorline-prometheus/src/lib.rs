// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Prometheus metrics for the Mirrorline relay.
//!
//! Relay components record through the metrics-rs facade helpers in
//! [`recording`]. [`PrometheusAdapter`] installs the exporter and renders the
//! text format served on the gateway's `/metrics` endpoint.

pub mod recording;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use mirrorline_core::MirrorError;

pub use recording::{
    record_flush, record_flush_latency, record_items_delivered, record_message,
    record_recovered, record_thread_created,
};

/// Prometheus metrics exporter.
#[derive(Clone)]
pub struct PrometheusAdapter {
    handle: PrometheusHandle,
}

impl PrometheusAdapter {
    /// Install the Prometheus recorder globally.
    ///
    /// Only one recorder can be installed per process; a second call fails.
    pub fn new() -> Result<Self, MirrorError> {
        let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
            MirrorError::Internal(format!("failed to install Prometheus recorder: {e}"))
        })?;

        recording::register_metrics();

        tracing::info!("prometheus metrics recorder installed");

        Ok(Self { handle })
    }

    /// Wrap an existing handle without installing anything.
    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn handle(&self) -> &PrometheusHandle {
        &self.handle
    }

    /// Render all collected metrics in Prometheus text format.
    pub fn render(&self) -> String {
        self.handle.render()
    }
}
