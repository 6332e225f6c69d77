// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable shadow copies of the ephemeral buffers.
//!
//! Each (bot, user) pair has at most one open record (`pending` or `sending`).
//! Items are stored as a JSON array in enqueue order; acknowledgements remove
//! items by ID, wherever they sit in the array.

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use mirrorline_core::{
    BotId, MirrorError, RelayItem, ShadowBuffer, ShadowStatus, UserId, format_timestamp,
};
use rusqlite::{OptionalExtension, Transaction, params};

use crate::database::{Database, map_tr_err, opt_ts_column, ts_column};

const SELECT_COLUMNS: &str = "SELECT id, bot_id, user_id, items, status, scheduled_flush_at,
        locked_until, created_at, updated_at
     FROM mirror_shadow_buffers";

fn conversion_err(idx: usize, e: impl std::error::Error + Send + Sync + 'static) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
}

fn row_to_shadow(row: &rusqlite::Row<'_>) -> rusqlite::Result<ShadowBuffer> {
    let items: String = row.get(3)?;
    let status: String = row.get(4)?;
    Ok(ShadowBuffer {
        id: row.get(0)?,
        bot_id: BotId(row.get(1)?),
        user_id: UserId(row.get(2)?),
        items: serde_json::from_str(&items).map_err(|e| conversion_err(3, e))?,
        status: ShadowStatus::from_str(&status).map_err(|e| conversion_err(4, e))?,
        scheduled_flush_at: ts_column(row, 5)?,
        locked_until: opt_ts_column(row, 6)?,
        created_at: ts_column(row, 7)?,
        updated_at: ts_column(row, 8)?,
    })
}

fn open_record(tx: &Transaction<'_>, bot: BotId, user: UserId) -> rusqlite::Result<Option<ShadowBuffer>> {
    tx.query_row(
        &format!("{SELECT_COLUMNS} WHERE bot_id = ?1 AND user_id = ?2 AND status IN ('pending', 'sending')"),
        params![bot.0, user.0],
        row_to_shadow,
    )
    .optional()
}

/// Append `item` to the pair's open record, creating a `pending` one if needed.
pub async fn append(
    db: &Database,
    bot: BotId,
    user: UserId,
    item: &RelayItem,
    scheduled_flush_at: DateTime<Utc>,
) -> Result<i64, MirrorError> {
    let item = item.clone();
    let scheduled = format_timestamp(scheduled_flush_at);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let id = match open_record(&tx, bot, user)? {
                Some(mut record) => {
                    record.items.push(item);
                    let items = serde_json::to_string(&record.items).map_err(|e| conversion_err(3, e))?;
                    tx.execute(
                        "UPDATE mirror_shadow_buffers
                         SET items = ?1, scheduled_flush_at = ?2,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?3",
                        params![items, scheduled, record.id],
                    )?;
                    record.id
                }
                None => {
                    let items = serde_json::to_string(&[item]).map_err(|e| conversion_err(3, e))?;
                    tx.execute(
                        "INSERT INTO mirror_shadow_buffers (bot_id, user_id, items, status, scheduled_flush_at)
                         VALUES (?1, ?2, ?3, 'pending', ?4)",
                        params![bot.0, user.0, items, scheduled],
                    )?;
                    tx.last_insert_rowid()
                }
            };
            tx.commit()?;
            Ok(id)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_open(
    db: &Database,
    bot: BotId,
    user: UserId,
) -> Result<Option<ShadowBuffer>, MirrorError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let record = open_record(&tx, bot, user)?;
            tx.commit()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Remove the items with the given IDs from the open record.
///
/// An emptied record is closed with `closed_status`; a record that still holds
/// items goes back to `pending` with its lock cleared.
async fn consume(
    db: &Database,
    bot: BotId,
    user: UserId,
    ids: &[String],
    closed_status: ShadowStatus,
) -> Result<usize, MirrorError> {
    let closed = closed_status.to_string();
    let ids: HashSet<String> = ids.iter().cloned().collect();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let removed = match open_record(&tx, bot, user)? {
                None => 0,
                Some(mut record) => {
                    let before = record.items.len();
                    record.items.retain(|item| !ids.contains(&item.id));
                    let removed = before - record.items.len();
                    if record.items.is_empty() {
                        tx.execute(
                            "UPDATE mirror_shadow_buffers
                             SET items = '[]', status = ?1, locked_until = NULL,
                                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                             WHERE id = ?2",
                            params![closed, record.id],
                        )?;
                    } else {
                        let items =
                            serde_json::to_string(&record.items).map_err(|e| conversion_err(3, e))?;
                        tx.execute(
                            "UPDATE mirror_shadow_buffers
                             SET items = ?1, status = 'pending', locked_until = NULL,
                                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                             WHERE id = ?2",
                            params![items, record.id],
                        )?;
                    }
                    removed
                }
            };
            tx.commit()?;
            Ok(removed)
        })
        .await
        .map_err(map_tr_err)
}

/// Acknowledge delivered items.
pub async fn ack(
    db: &Database,
    bot: BotId,
    user: UserId,
    ids: &[String],
) -> Result<usize, MirrorError> {
    consume(db, bot, user, ids, ShadowStatus::Sent).await
}

/// Abandon items.
pub async fn drop_items(
    db: &Database,
    bot: BotId,
    user: UserId,
    ids: &[String],
) -> Result<usize, MirrorError> {
    consume(db, bot, user, ids, ShadowStatus::Dropped).await
}

/// Open records whose flush is overdue or whose sending lock expired.
pub async fn due(db: &Database, now: DateTime<Utc>, limit: usize) -> Result<Vec<ShadowBuffer>, MirrorError> {
    let now = format_timestamp(now);
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "{SELECT_COLUMNS}
                 WHERE (status = 'pending' AND scheduled_flush_at <= ?1)
                    OR (status = 'sending' AND (locked_until IS NULL OR locked_until <= ?1))
                 ORDER BY scheduled_flush_at ASC, id ASC
                 LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![now, limit], row_to_shadow)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn mark_sending(db: &Database, id: i64, locked_until: DateTime<Utc>) -> Result<(), MirrorError> {
    let locked_until = format_timestamp(locked_until);
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE mirror_shadow_buffers
                 SET status = 'sending', locked_until = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2 AND status IN ('pending', 'sending')",
                params![locked_until, id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Delete closed records last touched before `older_than`. Returns the count.
pub async fn prune(db: &Database, older_than: DateTime<Utc>) -> Result<u64, MirrorError> {
    let cutoff = format_timestamp(older_than);
    db.connection()
        .call(move |conn| {
            let n = conn.execute(
                "DELETE FROM mirror_shadow_buffers
                 WHERE status IN ('sent', 'dropped') AND updated_at < ?1",
                params![cutoff],
            )?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}
