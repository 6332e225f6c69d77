// SPDX-FileCopyrightText: 2026 Mirrorline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mirrorline sweep` command implementation.
//!
//! One recovery pass over the durable shadow buffers, followed by every
//! flush job that is due. Meant for cron-style recovery when no `serve`
//! process is running.

use chrono::Utc;
use tracing::info;

use mirrorline_config::model::MirrorlineConfig;
use mirrorline_core::MirrorError;

use crate::serve::Runtime;

/// Upper bound on job rounds, so a job that keeps rescheduling itself
/// cannot keep the command alive.
const MAX_ROUNDS: usize = 100;

pub async fn run_sweep(config: MirrorlineConfig) -> Result<(), MirrorError> {
    let runtime = Runtime::build(&config).await?;

    let report = runtime.relay.sweeper.sweep(Utc::now()).await?;
    info!(
        from_durable = report.from_durable,
        requeued_jobs = report.requeued_jobs,
        pruned = report.pruned,
        "sweep finished"
    );

    let mut delivered = 0;
    for _ in 0..MAX_ROUNDS {
        let ran = runtime.relay.worker.run_due(Utc::now()).await?;
        if ran == 0 {
            break;
        }
        delivered += ran;
    }

    println!(
        "recovered {} buffer(s), requeued {} job(s), pruned {} record(s), ran {delivered} job(s)",
        report.from_durable + report.from_cache,
        report.requeued_jobs,
        report.pruned,
    );

    runtime.close().await;
    Ok(())
}
