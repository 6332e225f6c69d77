// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mirror configuration rows.

use std::str::FromStr;

use mirrorline_core::{BotId, DestinationId, MirrorConfig, MirrorError, RoutingMode};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err};

const SELECT_COLUMNS: &str = "SELECT bot_id, destination, routing_mode, batch_size,
        batch_delay_secs, flush_timeout_secs, active
     FROM mirror_configs";

fn row_to_config(row: &rusqlite::Row<'_>) -> rusqlite::Result<MirrorConfig> {
    let mode: String = row.get(2)?;
    let routing_mode = RoutingMode::from_str(&mode).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(2, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(MirrorConfig {
        bot_id: BotId(row.get(0)?),
        destination: DestinationId(row.get(1)?),
        routing_mode,
        batch_size: row.get(3)?,
        batch_delay_secs: row.get::<_, i64>(4)? as u64,
        flush_timeout_secs: row.get::<_, i64>(5)? as u64,
        active: row.get(6)?,
    })
}

pub async fn get_config(db: &Database, bot: BotId) -> Result<Option<MirrorConfig>, MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("{SELECT_COLUMNS} WHERE bot_id = ?1"),
                params![bot.0],
                row_to_config,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Insert or replace the configuration of `config.bot_id`.
pub async fn upsert_config(db: &Database, config: &MirrorConfig) -> Result<(), MirrorError> {
    let config = config.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO mirror_configs (bot_id, destination, routing_mode, batch_size,
                     batch_delay_secs, flush_timeout_secs, active)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT (bot_id) DO UPDATE SET
                     destination = excluded.destination,
                     routing_mode = excluded.routing_mode,
                     batch_size = excluded.batch_size,
                     batch_delay_secs = excluded.batch_delay_secs,
                     flush_timeout_secs = excluded.flush_timeout_secs,
                     active = excluded.active,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![
                    config.bot_id.0,
                    config.destination.0,
                    config.routing_mode.to_string(),
                    config.batch_size,
                    config.batch_delay_secs as i64,
                    config.flush_timeout_secs as i64,
                    config.active,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_configs(db: &Database) -> Result<Vec<MirrorConfig>, MirrorError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY bot_id"))?;
            let rows = stmt.query_map([], row_to_config)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::test_support::setup_db;

    #[tokio::test]
    async fn missing_config_is_none() {
        let (db, _dir) = setup_db().await;
        assert!(get_config(&db, BotId(1)).await.unwrap().is_none());
        assert!(list_configs(&db).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_then_update_replaces_fields() {
        let (db, _dir) = setup_db().await;

        let mut config = MirrorConfig::new(BotId(7), DestinationId("-1001".into()));
        upsert_config(&db, &config).await.unwrap();

        config.routing_mode = RoutingMode::Centralized;
        config.batch_size = 3;
        config.active = false;
        upsert_config(&db, &config).await.unwrap();

        let stored = get_config(&db, BotId(7)).await.unwrap().unwrap();
        assert_eq!(stored, config);
        assert_eq!(list_configs(&db).await.unwrap().len(), 1);
    }
}
