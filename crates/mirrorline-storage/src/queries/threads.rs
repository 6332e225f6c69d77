// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Thread mappings of (bot, user) pairs.

use chrono::{DateTime, Utc};
use mirrorline_core::{
    BotId, DestinationId, MessageId, MirrorError, NewThread, ThreadHandle, ThreadId, UserId,
    format_timestamp,
};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, opt_ts_column};

const SELECT_COLUMNS: &str = "SELECT id, bot_id, user_id, destination, thread_id,
        control_message_id, messages_relayed, last_flush_at
     FROM mirror_threads";

fn row_to_thread(row: &rusqlite::Row<'_>) -> rusqlite::Result<ThreadHandle> {
    Ok(ThreadHandle {
        record_id: row.get(0)?,
        bot_id: BotId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        destination: DestinationId(row.get(3)?),
        thread_id: ThreadId(row.get(4)?),
        control_message_id: row.get::<_, Option<String>>(5)?.map(MessageId),
        messages_relayed: row.get(6)?,
        last_flush_at: opt_ts_column(row, 7)?,
    })
}

pub async fn get_thread(
    db: &Database,
    bot: BotId,
    user: UserId,
) -> Result<Option<ThreadHandle>, MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE bot_id = ?1 AND user_id = ?2"),
                params![bot.0, user.0],
                row_to_thread,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_thread_by_record(
    db: &Database,
    record_id: i64,
) -> Result<Option<ThreadHandle>, MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![record_id],
                row_to_thread,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert a mapping; when the pair already has one, return it untouched.
pub async fn insert_thread(db: &Database, thread: &NewThread) -> Result<ThreadHandle, MirrorError> {
    let thread = thread.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO mirror_threads (bot_id, user_id, destination, thread_id)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT (bot_id, user_id) DO NOTHING",
                params![
                    thread.bot_id.0,
                    thread.user_id.0,
                    thread.destination.0,
                    thread.thread_id.0,
                ],
            )?;
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE bot_id = ?1 AND user_id = ?2"),
                params![thread.bot_id.0, thread.user_id.0],
                row_to_thread,
            )
        })
        .await
        .map_err(map_tr_err)
}

pub async fn set_control_message(
    db: &Database,
    record_id: i64,
    message_id: &MessageId,
) -> Result<(), MirrorError> {
    let message_id = message_id.0.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE mirror_threads SET control_message_id = ?1 WHERE id = ?2",
                params![message_id, record_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn record_flush(
    db: &Database,
    record_id: i64,
    delivered: i64,
    at: DateTime<Utc>,
) -> Result<(), MirrorError> {
    let at = format_timestamp(at);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE mirror_threads
                 SET messages_relayed = messages_relayed + ?1, last_flush_at = ?2
                 WHERE id = ?3",
                params![delivered, at, record_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn delete_thread(db: &Database, record_id: i64) -> Result<(), MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM mirror_threads WHERE id = ?1", params![record_id])?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    fn new_thread(thread_id: &str) -> NewThread {
        NewThread {
            bot_id: BotId(7),
            user_id: UserId(42),
            destination: DestinationId("-1001".into()),
            thread_id: ThreadId(thread_id.into()),
        }
    }

    #[tokio::test]
    async fn insert_is_first_writer_wins() {
        let (db, _dir) = setup_db().await;

        let first = insert_thread(&db, &new_thread("100")).await.unwrap();
        let second = insert_thread(&db, &new_thread("200")).await.unwrap();

        assert_eq!(first.record_id, second.record_id);
        assert_eq!(second.thread_id, ThreadId("100".into()));
    }

    #[tokio::test]
    async fn control_message_and_counters_are_persisted() {
        let (db, _dir) = setup_db().await;
        let handle = insert_thread(&db, &new_thread("100")).await.unwrap();
        assert_eq!(handle.messages_relayed, 0);
        assert!(handle.last_flush_at.is_none());

        set_control_message(&db, handle.record_id, &MessageId("55".into()))
            .await
            .unwrap();
        let at = Utc::now();
        record_flush(&db, handle.record_id, 3, at).await.unwrap();
        record_flush(&db, handle.record_id, 2, at).await.unwrap();

        let stored = get_thread_by_record(&db, handle.record_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.control_message_id, Some(MessageId("55".into())));
        assert_eq!(stored.messages_relayed, 5);
        assert!(stored.last_flush_at.is_some());
    }

    #[tokio::test]
    async fn delete_forgets_the_mapping() {
        let (db, _dir) = setup_db().await;
        let handle = insert_thread(&db, &new_thread("100")).await.unwrap();
        delete_thread(&db, handle.record_id).await.unwrap();
        assert!(get_thread(&db, BotId(7), UserId(42)).await.unwrap().is_none());

        let recreated = insert_thread(&db, &new_thread("300")).await.unwrap();
        assert_eq!(recreated.thread_id, ThreadId("300".into()));
    }
}
