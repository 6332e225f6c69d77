// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP request handlers for the gateway.

use axum::{
    Json,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use mirrorline_core::{BotId, ControlAction, UserId};
use mirrorline_relay::{CallbackOutcome, MirrorDisposition, MirrorRequest};

use crate::server::GatewayState;

/// Request body for `POST /v1/mirror`.
#[derive(Debug, Deserialize)]
pub struct MirrorBody {
    #[serde(flatten)]
    pub message: MirrorRequest,
    /// Optional name shown in the user's thread title.
    #[serde(default)]
    pub user_display_name: Option<String>,
    /// Optional bot handle used in centralized thread titles.
    #[serde(default)]
    pub bot_handle: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MirrorResponse {
    pub disposition: MirrorDisposition,
}

/// Request body for `POST /v1/control`.
#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    /// Callback token, `{action}_{record_id}`.
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ControlResponse {
    pub action: ControlAction,
    pub bot_id: BotId,
    pub user_id: UserId,
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// POST /v1/mirror
///
/// Always answers 202: mirroring failures never reach the ingest caller.
pub async fn post_mirror(
    State(state): State<GatewayState>,
    Json(body): Json<MirrorBody>,
) -> (StatusCode, Json<MirrorResponse>) {
    let MirrorBody {
        message,
        user_display_name,
        bot_handle,
    } = body;

    if let Some(directory) = &state.directory {
        if let Some(name) = user_display_name {
            directory.set_user(message.bot_id, message.user_id, name);
        }
        if let Some(handle) = bot_handle {
            directory.set_bot(message.bot_id, handle);
        }
    }

    let disposition = state.pipeline.mirror_message(message).await;
    (StatusCode::ACCEPTED, Json(MirrorResponse { disposition }))
}

/// POST /v1/control
pub async fn post_control(
    State(state): State<GatewayState>,
    Json(body): Json<ControlRequest>,
) -> Response {
    match state.control.handle_callback(&body.token).await {
        CallbackOutcome::Applied {
            action,
            bot_id,
            user_id,
            text,
        } => (
            StatusCode::OK,
            Json(ControlResponse {
                action,
                bot_id,
                user_id,
                text,
            }),
        )
            .into_response(),
        CallbackOutcome::Unrecognized => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse {
                error: "unrecognized action".to_string(),
            }),
        )
            .into_response(),
    }
}

/// GET /health
pub async fn get_health(State(state): State<GatewayState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.health.start_time.elapsed().as_secs(),
    })
}

/// GET /metrics
pub async fn get_metrics(State(state): State<GatewayState>) -> Response {
    match &state.health.prometheus_render {
        Some(render) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            render(),
        )
            .into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}
