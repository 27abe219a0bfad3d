//! Background health and refresh loops
//!
//! Each loop runs one cycle as its own task, then sleeps. A cycle that
//! returns an error or panics is logged and the loop sleeps the shorter retry
//! interval instead. Both loops share one `CancellationToken`; cancelling it
//! aborts a running cycle (its results were never committed) and ends the
//! sleep.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::{Error, Result};
use crate::pool::Pool;
use crate::refresh::{DEFAULT_MAX_CONCURRENT, RefreshReport, batch_refresh};

/// Persistence collaborator notified after a refresh changed entries.
pub trait EntrySink: Send + Sync {
    /// Store the full raw entry list.
    fn persist<'a>(
        &'a self,
        entries: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>>;
}

impl EntrySink for zai_auth::EntryFile {
    fn persist<'a>(
        &'a self,
        entries: &'a [String],
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            self.save(entries)
                .await
                .map_err(|e| Error::Persist(e.to_string()))
        })
    }
}

#[derive(Debug, Clone)]
pub struct HealthSchedule {
    pub interval: Duration,
    pub retry: Duration,
}

impl Default for HealthSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(600),
            retry: Duration::from_secs(300),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RefreshSchedule {
    pub enabled: bool,
    pub interval: Duration,
    pub retry: Duration,
    pub max_concurrent: usize,
}

impl Default for RefreshSchedule {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: Duration::from_secs(3600),
            retry: Duration::from_secs(300),
            max_concurrent: DEFAULT_MAX_CONCURRENT,
        }
    }
}

/// Handle to the running background loops.
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl Scheduler {
    /// Start the health loop, and the refresh loop when enabled.
    pub fn spawn(
        pool: Arc<Pool>,
        health: HealthSchedule,
        refresh: RefreshSchedule,
        sink: Option<Arc<dyn EntrySink>>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let mut handles = Vec::with_capacity(2);

        info!(
            interval_secs = health.interval.as_secs(),
            "starting health loop"
        );
        let health_pool = pool.clone();
        handles.push((
            "health",
            tokio::spawn(run_loop(
                "health",
                cancel.clone(),
                health.interval,
                health.retry,
                move || {
                    let pool = health_pool.clone();
                    async move {
                        health_cycle(&pool).await;
                        Ok(())
                    }
                },
            )),
        ));

        if refresh.enabled {
            info!(
                interval_secs = refresh.interval.as_secs(),
                max_concurrent = refresh.max_concurrent,
                "starting refresh loop"
            );
            let max_concurrent = refresh.max_concurrent;
            handles.push((
                "refresh",
                tokio::spawn(run_loop(
                    "refresh",
                    cancel.clone(),
                    refresh.interval,
                    refresh.retry,
                    move || {
                        let pool = pool.clone();
                        let sink = sink.clone();
                        async move {
                            refresh_cycle(&pool, max_concurrent, sink.as_deref())
                                .await
                                .map(|_| ())
                        }
                    },
                )),
            ));
        } else {
            info!("token refresh disabled");
        }

        Self { cancel, handles }
    }

    /// Number of loops running.
    pub fn loops(&self) -> usize {
        self.handles.len()
    }

    /// Cancel both loops and wait for them to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(loop_name = name, error = %e, "background loop ended abnormally");
            }
        }
        info!("background loops stopped");
    }
}

/// Probe every failed entry and clear the ones the upstream accepts again.
///
/// Returns how many entries recovered.
pub async fn health_cycle(pool: &Pool) -> usize {
    let tokens = pool.failed_tokens();
    if tokens.is_empty() {
        debug!("no failed entries to probe");
        return 0;
    }

    let mut recovered = 0;
    for token in &tokens {
        let healthy = pool.upstream().probe(token).await;
        metrics::counter!("token_pool_probe_total", "healthy" => healthy.to_string()).increment(1);
        if healthy {
            pool.mark_success(token);
            recovered += 1;
        }
    }

    info!(
        probed = tokens.len(),
        recovered,
        "health check complete"
    );
    recovered
}

/// Refresh every entry with credentials and persist the pool if anything
/// changed.
pub async fn refresh_cycle(
    pool: &Pool,
    max_concurrent: usize,
    sink: Option<&dyn EntrySink>,
) -> Result<RefreshReport> {
    let report = batch_refresh(pool, max_concurrent).await;
    if report.changed()
        && let Some(sink) = sink
    {
        sink.persist(&pool.entries()).await?;
        debug!(updated = report.refreshed_count, "refreshed entries persisted");
    }
    Ok(report)
}

/// Drive `cycle` until `cancel` fires.
async fn run_loop<F, Fut>(
    name: &'static str,
    cancel: CancellationToken,
    interval: Duration,
    retry: Duration,
    mut cycle: F,
) where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    loop {
        let mut task = tokio::spawn(cycle());
        let outcome = tokio::select! {
            () = cancel.cancelled() => {
                task.abort();
                debug!(loop_name = name, "cycle cancelled");
                return;
            }
            joined = &mut task => joined
                .map_err(|e| Error::Cycle(e.to_string()))
                .and_then(|result| result),
        };

        let wait = match outcome {
            Ok(()) => interval,
            Err(e) => {
                error!(
                    loop_name = name,
                    error = %e,
                    retry_secs = retry.as_secs(),
                    "cycle failed, retrying"
                );
                retry
            }
        };

        tokio::select! {
            () = cancel.cancelled() => {
                debug!(loop_name = name, "loop cancelled");
                return;
            }
            () = tokio::time::sleep(wait) => {}
        }
    }
}
