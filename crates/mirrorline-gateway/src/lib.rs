// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP ingest gateway.
//!
//! Client bots that do not embed the relay post their conversation
//! messages to `/v1/mirror`; operators without a Telegram client can apply
//! control-panel actions through `/v1/control`.

pub mod auth;
pub mod handlers;
pub mod server;

pub use auth::AuthConfig;
pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};
