// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Long-polling listener for control-panel button presses.
//!
//! Each client bot that posts into review groups receives the callback
//! queries for its own buttons, so one listener runs per configured bot.

use std::sync::Arc;

use teloxide::prelude::*;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use mirrorline_core::BotId;
use mirrorline_relay::{CallbackOutcome, ControlHandler};

use crate::TelegramTransport;

const UNRECOGNIZED: &str = "Unrecognized action.";

/// Start one callback listener per bot. Bots without a token are skipped.
pub async fn spawn_callback_listeners(
    transport: &TelegramTransport,
    bots: impl IntoIterator<Item = BotId>,
    control: Arc<ControlHandler>,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for bot_id in bots {
        match transport.bot(bot_id).await {
            Ok(bot) => handles.push(tokio::spawn(listen(
                bot,
                bot_id,
                Arc::clone(&control),
                cancel.clone(),
            ))),
            Err(e) => warn!(bot_id = %bot_id, error = %e, "callback listener not started"),
        }
    }
    handles
}

async fn listen(bot: Bot, bot_id: BotId, control: Arc<ControlHandler>, cancel: CancellationToken) {
    info!(bot_id = %bot_id, "listening for control-panel callbacks");

    let handler = Update::filter_callback_query().endpoint(move |bot: Bot, query: CallbackQuery| {
        let control = Arc::clone(&control);
        async move {
            let reply = match query.data.as_deref() {
                Some(token) => match control.handle_callback(token).await {
                    CallbackOutcome::Applied { text, .. } => text,
                    CallbackOutcome::Unrecognized => {
                        debug!(token, "unrecognized callback token");
                        UNRECOGNIZED.to_string()
                    }
                },
                None => UNRECOGNIZED.to_string(),
            };

            if let Err(e) = bot.answer_callback_query(query.id.clone()).text(reply).await {
                warn!(error = %e, "failed to answer callback query");
            }
            respond(())
        }
    });

    let mut dispatcher = Dispatcher::builder(bot, handler)
        .default_handler(|_| async {})
        .build();

    tokio::select! {
        _ = dispatcher.dispatch() => {}
        _ = cancel.cancelled() => {}
    }
    debug!(bot_id = %bot_id, "callback listener stopped");
}
