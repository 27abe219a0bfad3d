//! Batch re-authentication of entries that carry credentials
//!
//! Snapshot the eligible entries under the pool lock, sign each one in
//! concurrently with the lock released, then commit every success in a single
//! critical section. One attempt failing or panicking never cancels the rest.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::entry::SEPARATOR;
use crate::pool::{Pool, RefreshTarget, Refreshed};

/// Sign-in attempts allowed in flight at once unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT: usize = 20;

/// Outcome of one batch refresh.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RefreshReport {
    pub refreshed_count: usize,
    pub failed_count: usize,
    /// Entries attempted: credentials present and a non-empty password
    pub total_count: usize,
    /// New composite strings, in commit order. Carries passwords and tokens,
    /// so it is handed to persistence but never serialized.
    #[serde(skip_serializing)]
    pub updated_entries: Vec<String>,
    pub message: String,
}

impl RefreshReport {
    pub fn changed(&self) -> bool {
        !self.updated_entries.is_empty()
    }
}

/// Re-authenticate every eligible entry with at most `max_concurrent`
/// sign-ins in flight (0 is treated as 1), then write the new tokens back.
pub async fn batch_refresh(pool: &Pool, max_concurrent: usize) -> RefreshReport {
    let (generation, targets) = pool.refresh_targets();
    let total_count = targets.len();
    if total_count == 0 {
        debug!("no entries with credentials to refresh");
        return RefreshReport {
            message: "no entries with credentials to refresh".into(),
            ..RefreshReport::default()
        };
    }

    info!(entries = total_count, max_concurrent, "starting batch refresh");

    let semaphore = Arc::new(Semaphore::new(max_concurrent.max(1)));
    let mut attempts = JoinSet::new();
    for target in targets {
        let upstream = pool.upstream().clone();
        let semaphore = semaphore.clone();
        attempts.spawn(async move {
            let Ok(_permit) = semaphore.acquire_owned().await else {
                return None;
            };
            sign_in(&upstream, target).await
        });
    }

    let mut refreshed = Vec::new();
    let mut failed_count = 0usize;
    while let Some(joined) = attempts.join_next().await {
        match joined {
            Ok(Some(item)) => refreshed.push(item),
            Ok(None) => failed_count += 1,
            Err(e) => {
                error!(error = %e, "refresh attempt panicked");
                failed_count += 1;
            }
        }
    }

    let summary = pool.commit_refresh(generation, refreshed);
    failed_count += summary.discarded;
    let refreshed_count = summary.updated.len();

    metrics::counter!("token_pool_refresh_total", "outcome" => "success")
        .increment(refreshed_count as u64);
    metrics::counter!("token_pool_refresh_total", "outcome" => "failed")
        .increment(failed_count as u64);

    let message = format!(
        "refreshed {refreshed_count} of {total_count} entries, {failed_count} failed"
    );
    info!(
        refreshed = refreshed_count,
        failed = failed_count,
        total = total_count,
        "batch refresh complete"
    );

    RefreshReport {
        refreshed_count,
        failed_count,
        total_count,
        updated_entries: summary.updated,
        message,
    }
}

async fn sign_in(upstream: &zai_auth::Upstream, target: RefreshTarget) -> Option<Refreshed> {
    match upstream
        .sign_in(&target.email, target.password.expose())
        .await
    {
        // A separator inside the token would turn the rewritten entry into an
        // opaque bearer carrying the password
        Ok(token) if token.contains(SEPARATOR) => {
            warn!(
                position = target.position,
                email = %target.email,
                "sign-in token contains the entry separator, entry left unchanged"
            );
            None
        }
        Ok(token) => {
            debug!(
                position = target.position,
                email = %target.email,
                token = %zai_auth::token_preview(&token),
                "sign-in succeeded"
            );
            Some(Refreshed {
                position: target.position,
                raw: target.raw,
                token,
            })
        }
        Err(e) => {
            warn!(
                position = target.position,
                email = %target.email,
                error = %e,
                "sign-in failed, entry left unchanged"
            );
            None
        }
    }
}
