// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Operator flags per (bot, user) pair.

use mirrorline_core::{BotId, MirrorError, UserId, UserMirrorState};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

pub async fn get_user_state(
    db: &Database,
    bot: BotId,
    user: UserId,
) -> Result<Option<UserMirrorState>, MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT is_banned, is_ai_paused FROM mirror_user_states
                 WHERE bot_id = ?1 AND user_id = ?2",
                params![bot.0, user.0],
                |row| {
                    Ok(UserMirrorState {
                        is_banned: row.get(0)?,
                        is_ai_paused: row.get(1)?,
                    })
                },
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn upsert_user_state(
    db: &Database,
    bot: BotId,
    user: UserId,
    state: UserMirrorState,
) -> Result<(), MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO mirror_user_states (bot_id, user_id, is_banned, is_ai_paused)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (bot_id, user_id) DO UPDATE SET
                     is_banned = excluded.is_banned,
                     is_ai_paused = excluded.is_ai_paused,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![bot.0, user.0, state.is_banned, state.is_ai_paused],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    #[tokio::test]
    async fn state_round_trips_and_updates() {
        let (db, _dir) = setup_db().await;
        assert!(get_user_state(&db, BotId(1), UserId(2)).await.unwrap().is_none());

        let banned = UserMirrorState {
            is_banned: true,
            is_ai_paused: false,
        };
        upsert_user_state(&db, BotId(1), UserId(2), banned).await.unwrap();
        assert_eq!(
            get_user_state(&db, BotId(1), UserId(2)).await.unwrap(),
            Some(banned)
        );

        let paused = UserMirrorState {
            is_banned: false,
            is_ai_paused: true,
        };
        upsert_user_state(&db, BotId(1), UserId(2), paused).await.unwrap();
        assert_eq!(
            get_user_state(&db, BotId(1), UserId(2)).await.unwrap(),
            Some(paused)
        );
    }
}
