// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Durable task queue with dedupe keys, due times, and lease-based claiming.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use mirrorline_core::{Job, JobStatus, MirrorError, NewJob, format_timestamp};
use rusqlite::{OptionalExtension, params};

use crate::database::{Database, map_tr_err, opt_ts_column, ts_column};

/// Seconds a claimed job stays invisible to other workers.
pub const JOB_LEASE_SECS: i64 = 300;

fn job_lease() -> Duration {
    Duration::seconds(JOB_LEASE_SECS)
}

const SELECT_COLUMNS: &str = "SELECT id, kind, dedupe_key, payload, status, attempts,
        max_attempts, run_at, locked_until, last_error
     FROM jobs";

fn row_to_job(row: &rusqlite::Row<'_>) -> rusqlite::Result<Job> {
    let status: String = row.get(4)?;
    Ok(Job {
        id: row.get(0)?,
        kind: row.get(1)?,
        dedupe_key: row.get(2)?,
        payload: row.get(3)?,
        status: JobStatus::from_str(&status).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
        })?,
        attempts: row.get(5)?,
        max_attempts: row.get(6)?,
        run_at: ts_column(row, 7)?,
        locked_until: opt_ts_column(row, 8)?,
        last_error: row.get(9)?,
    })
}

/// Insert a job, or move the pending job sharing its dedupe key to the new due time.
///
/// Returns the ID of the job that will run.
pub async fn schedule(db: &Database, job: &NewJob) -> Result<i64, MirrorError> {
    let job = job.clone();
    let run_at = format_timestamp(job.run_at);
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "INSERT INTO jobs (kind, dedupe_key, payload, max_attempts, run_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (dedupe_key) WHERE status = 'pending' AND dedupe_key IS NOT NULL
                 DO UPDATE SET
                     run_at = excluded.run_at,
                     payload = excluded.payload,
                     max_attempts = excluded.max_attempts,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 RETURNING id",
                params![job.kind, job.dedupe_key, job.payload, job.max_attempts, run_at],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Claim up to `limit` due pending jobs, oldest due first.
pub async fn claim_due(db: &Database, now: DateTime<Utc>, limit: usize) -> Result<Vec<Job>, MirrorError> {
    let now_str = format_timestamp(now);
    let locked_until = format_timestamp(now + job_lease());
    let limit = limit as i64;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let jobs = {
                let mut stmt = tx.prepare(&format!(
                    "{SELECT_COLUMNS}
                     WHERE status = 'pending' AND run_at <= ?1
                     ORDER BY run_at ASC, id ASC
                     LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![now_str, limit], row_to_job)?;
                rows.collect::<Result<Vec<_>, _>>()?
            };
            for job in &jobs {
                tx.execute(
                    "UPDATE jobs SET status = 'processing', locked_until = ?1,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![locked_until, job.id],
                )?;
            }
            tx.commit()?;
            Ok(jobs
                .into_iter()
                .map(|job| Job {
                    status: JobStatus::Processing,
                    locked_until: Some(now + job_lease()),
                    ..job
                })
                .collect())
        })
        .await
        .map_err(map_tr_err)
}

/// Mark a job as completed.
pub async fn complete(db: &Database, id: i64) -> Result<(), MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE jobs SET status = 'completed', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Record a failed attempt.
///
/// Increments attempts. At `max_attempts` the job is `failed`. When another
/// pending job already carries the same dedupe key, this one is `superseded`
/// and the sibling is pushed back to at least `retry_at`. Otherwise the job
/// returns to `pending` due at `retry_at`.
pub async fn fail(
    db: &Database,
    id: i64,
    error: &str,
    retry_at: DateTime<Utc>,
) -> Result<JobStatus, MirrorError> {
    let error = error.to_string();
    let retry_at = format_timestamp(retry_at);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let (attempts, max_attempts, dedupe_key): (u32, u32, Option<String>) = tx.query_row(
                "SELECT attempts, max_attempts, dedupe_key FROM jobs WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )?;
            let new_attempts = attempts + 1;

            let sibling: Option<i64> = match &dedupe_key {
                Some(key) => tx
                    .query_row(
                        "SELECT id FROM jobs WHERE dedupe_key = ?1 AND status = 'pending' AND id != ?2",
                        params![key, id],
                        |row| row.get(0),
                    )
                    .optional()?,
                None => None,
            };

            let status = if new_attempts >= max_attempts {
                JobStatus::Failed
            } else if let Some(sibling) = sibling {
                tx.execute(
                    "UPDATE jobs SET run_at = MAX(run_at, ?1),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE id = ?2",
                    params![retry_at, sibling],
                )?;
                JobStatus::Superseded
            } else {
                JobStatus::Pending
            };

            tx.execute(
                "UPDATE jobs SET status = ?1, attempts = ?2, last_error = ?3, run_at = ?4,
                 locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?5",
                params![status.to_string(), new_attempts, error, retry_at, id],
            )?;
            tx.commit()?;
            Ok(status)
        })
        .await
        .map_err(map_tr_err)
}

/// Return `processing` jobs with an expired lease to `pending`.
///
/// A stale job whose dedupe key already has a pending sibling is superseded
/// instead. Returns the number of jobs requeued.
pub async fn requeue_stale(db: &Database, now: DateTime<Utc>) -> Result<u64, MirrorError> {
    let now = format_timestamp(now);
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE jobs SET status = 'superseded', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing' AND locked_until <= ?1
                   AND dedupe_key IS NOT NULL
                   AND EXISTS (SELECT 1 FROM jobs p
                               WHERE p.dedupe_key = jobs.dedupe_key AND p.status = 'pending')",
                params![now],
            )?;
            // Two stale jobs with one key: keep the newest, supersede the rest.
            tx.execute(
                "UPDATE jobs SET status = 'superseded', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing' AND locked_until <= ?1
                   AND dedupe_key IS NOT NULL
                   AND id < (SELECT MAX(s.id) FROM jobs s
                             WHERE s.dedupe_key = jobs.dedupe_key
                               AND s.status = 'processing' AND s.locked_until <= ?1)",
                params![now],
            )?;
            let n = tx.execute(
                "UPDATE jobs SET status = 'pending', locked_until = NULL,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE status = 'processing' AND locked_until <= ?1",
                params![now],
            )?;
            tx.commit()?;
            Ok(n as u64)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch a job by ID.
pub async fn get(db: &Database, id: i64) -> Result<Option<Job>, MirrorError> {
    db.connection()
        .call(move |conn| {
            conn.query_row(&format!("{SELECT_COLUMNS} WHERE id = ?1"), params![id], row_to_job)
                .optional()
        })
        .await
        .map_err(map_tr_err)
}
