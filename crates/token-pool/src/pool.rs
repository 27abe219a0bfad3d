//! Shared pool state: rotation, failure tracking and wholesale replace
//!
//! Entries, the round-robin cursor, the failed set and the credential index
//! live behind one `parking_lot::Mutex`. Every operation here is a short
//! synchronous critical section; network calls (probe, sign-in) happen in the
//! scheduler and refresh engine with the lock released, and their results are
//! committed back through `commit_refresh` / `mark_success`.

use std::collections::HashSet;

use common::Secret;
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info, warn};
use zai_auth::{Upstream, token_preview};

use crate::entry::{CredentialEntry, PLACEHOLDER_IDENTITY, extract_token};
use crate::outcome::Outcome;
use crate::store::{CredentialRecord, CredentialStore};

struct PoolState {
    store: CredentialStore,
    cursor: usize,
    /// Raw strings, never bare tokens
    failed: HashSet<String>,
    /// Bumped on every `replace`; refresh commits computed against an older
    /// generation are dropped.
    generation: u64,
}

impl PoolState {
    fn publish_failed(&self) {
        metrics::gauge!("token_pool_failed_entries").set(self.failed.len() as f64);
    }
}

/// One row of the admin listing. Carries a token preview, never the token.
#[derive(Debug, Clone, Serialize)]
pub struct EntryStatus {
    pub position: usize,
    pub email: String,
    pub has_credentials: bool,
    pub needs_token: bool,
    pub failed: bool,
    pub token_preview: String,
}

/// Entry selected for re-authentication, captured under the lock.
#[derive(Debug, Clone)]
pub(crate) struct RefreshTarget {
    pub position: usize,
    pub raw: String,
    pub email: String,
    pub password: Secret<String>,
}

/// Successful sign-in waiting to be committed.
#[derive(Debug)]
pub(crate) struct Refreshed {
    pub position: usize,
    /// Raw string the sign-in was computed from
    pub raw: String,
    pub token: String,
}

/// Result of committing a refresh batch.
#[derive(Debug, Default)]
pub(crate) struct CommitSummary {
    pub updated: Vec<String>,
    pub discarded: usize,
}

/// Rotating pool of upstream tokens.
pub struct Pool {
    state: Mutex<PoolState>,
    upstream: Upstream,
}

impl Pool {
    /// Build the pool from the startup entry list.
    pub fn new(raw_list: Vec<String>, upstream: Upstream) -> Self {
        let store = CredentialStore::parse(raw_list);
        info!(entries = store.len(), "pool initialized");
        let state = PoolState {
            store,
            cursor: 0,
            failed: HashSet::new(),
            generation: 0,
        };
        state.publish_failed();
        Self {
            state: Mutex::new(state),
            upstream,
        }
    }

    /// Next usable token, skipping failed entries round-robin.
    ///
    /// Returns `None` only for an empty pool. When every entry is failed the
    /// failed set is cleared and the first entry's token is returned even
    /// though it was just marked failed; the caller gets a token to retry with
    /// instead of an outage.
    pub fn select_next(&self) -> Option<String> {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let n = state.store.len();
        if n == 0 {
            metrics::counter!("token_pool_selections_total", "result" => "empty").increment(1);
            return None;
        }

        for _ in 0..n {
            let idx = state.cursor % n;
            state.cursor = (idx + 1) % n;
            let raw = &state.store.entries()[idx];
            if !state.failed.contains(raw) {
                metrics::counter!("token_pool_selections_total", "result" => "selected")
                    .increment(1);
                return Some(extract_token(raw).to_string());
            }
        }

        // Full scan: the cursor is back where it started
        warn!(
            failed = state.failed.len(),
            "all entries failed, clearing failed set"
        );
        state.failed.clear();
        state.publish_failed();
        metrics::counter!("token_pool_selections_total", "result" => "reset").increment(1);
        Some(extract_token(&state.store.entries()[0]).to_string())
    }

    /// Mark the entry owning `token` as unusable. Unknown tokens are ignored.
    pub fn mark_failed(&self, token: &str) {
        let mut state = self.state.lock();
        let Some(position) = state.store.resolve(token) else {
            debug!(token = %token_preview(token), "mark_failed: token not in pool");
            return;
        };
        let raw = state.store.entries()[position].clone();
        if state.failed.insert(raw) {
            warn!(
                position,
                token = %token_preview(token),
                failed = state.failed.len(),
                "entry marked failed"
            );
            state.publish_failed();
        }
    }

    /// Clear the failure mark on the entry owning `token`, if any.
    pub fn mark_success(&self, token: &str) {
        let mut state = self.state.lock();
        let Some(position) = state.store.resolve(token) else {
            return;
        };
        let raw = state.store.entries()[position].clone();
        if state.failed.remove(&raw) {
            info!(position, token = %token_preview(token), "entry recovered");
            state.publish_failed();
        }
    }

    /// Apply a classified upstream outcome for `token`.
    pub fn report(&self, token: &str, outcome: Outcome) {
        metrics::counter!("token_pool_outcomes_total", "outcome" => outcome.label()).increment(1);
        match outcome {
            Outcome::Success => self.mark_success(token),
            Outcome::Rejected => self.mark_failed(token),
            Outcome::Transient => {
                debug!(token = %token_preview(token), "transient upstream error, no pool action");
            }
        }
    }

    /// Swap in a new entry list. Resets the cursor and clears the failed set.
    pub fn replace(&self, raw_list: Vec<String>) {
        let store = CredentialStore::parse(raw_list);
        let mut state = self.state.lock();
        let previous = state.store.len();
        state.store = store;
        state.cursor = 0;
        state.failed.clear();
        state.generation += 1;
        info!(
            previous,
            entries = state.store.len(),
            generation = state.generation,
            "pool replaced"
        );
        state.publish_failed();
    }

    /// Credential record for a raw string or bare token.
    pub fn lookup(&self, id: &str) -> CredentialRecord {
        self.state.lock().store.lookup(id)
    }

    pub fn len(&self) -> usize {
        self.state.lock().store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().store.is_empty()
    }

    pub fn failed_count(&self) -> usize {
        self.state.lock().failed.len()
    }

    /// Failed raw strings in pool order.
    pub fn failed_entries(&self) -> Vec<String> {
        let state = self.state.lock();
        state
            .store
            .entries()
            .iter()
            .filter(|raw| state.failed.contains(*raw))
            .cloned()
            .collect()
    }

    /// Bare tokens of the failed entries, for the health loop to probe.
    pub fn failed_tokens(&self) -> Vec<String> {
        self.failed_entries()
            .iter()
            .map(|raw| extract_token(raw).to_string())
            .collect()
    }

    /// Snapshot of the raw entries in pool order.
    pub fn entries(&self) -> Vec<String> {
        self.state.lock().store.entries().to_vec()
    }

    pub fn cursor(&self) -> usize {
        self.state.lock().cursor
    }

    pub fn upstream(&self) -> &Upstream {
        &self.upstream
    }

    /// Per-entry status rows for the admin API.
    pub fn listing(&self) -> Vec<EntryStatus> {
        let state = self.state.lock();
        state
            .store
            .entries()
            .iter()
            .enumerate()
            .map(|(position, raw)| {
                let entry = CredentialEntry::parse(raw);
                EntryStatus {
                    position,
                    email: entry.email().to_string(),
                    has_credentials: entry.has_credentials(),
                    needs_token: entry.needs_token(),
                    failed: state.failed.contains(raw),
                    token_preview: entry.token().map(token_preview).unwrap_or_default(),
                }
            })
            .collect()
    }

    /// Pool health summary.
    ///
    /// `healthy` with no failures, `degraded` with some, `unhealthy` when the
    /// pool is empty or every entry is failed.
    pub fn health(&self) -> serde_json::Value {
        let state = self.state.lock();
        let total = state.store.len();
        let failed = state.failed.len();
        let with_credentials = state
            .store
            .entries()
            .iter()
            .filter(|raw| CredentialEntry::parse(raw).has_credentials())
            .count();

        let status = if total == 0 || failed >= total {
            "unhealthy"
        } else if failed > 0 {
            "degraded"
        } else {
            "healthy"
        };

        serde_json::json!({
            "status": status,
            "entries_total": total,
            "entries_available": total.saturating_sub(failed),
            "entries_failed": failed,
            "entries_with_credentials": with_credentials,
            "cursor": state.cursor,
            "generation": state.generation
        })
    }

    /// Entries eligible for re-authentication: credentials present and a
    /// non-empty password. Returned with the generation they belong to.
    pub(crate) fn refresh_targets(&self) -> (u64, Vec<RefreshTarget>) {
        let state = self.state.lock();
        let targets = state
            .store
            .entries()
            .iter()
            .enumerate()
            .filter_map(|(position, raw)| {
                let record = state.store.lookup(raw);
                (record.has_credentials && !record.password.is_empty()).then(|| RefreshTarget {
                    position,
                    raw: raw.clone(),
                    email: record.email,
                    password: record.password,
                })
            })
            .collect();
        (state.generation, targets)
    }

    /// Write refreshed tokens back in one critical section.
    ///
    /// A result is dropped when the pool was replaced since the snapshot or
    /// its position no longer holds the raw string it was computed from.
    pub(crate) fn commit_refresh(&self, generation: u64, refreshed: Vec<Refreshed>) -> CommitSummary {
        let mut guard = self.state.lock();
        let state = &mut *guard;

        if state.generation != generation {
            warn!(
                discarded = refreshed.len(),
                "pool replaced during refresh, discarding results"
            );
            return CommitSummary {
                updated: Vec::new(),
                discarded: refreshed.len(),
            };
        }

        let mut summary = CommitSummary::default();
        for item in refreshed {
            if state.store.get(item.position) != Some(item.raw.as_str()) {
                debug!(position = item.position, "entry changed during refresh, discarding");
                summary.discarded += 1;
                continue;
            }

            let record = state.store.lookup(&item.raw);
            let email = if record.email.is_empty() {
                PLACEHOLDER_IDENTITY
            } else {
                record.email.as_str()
            };

            let Some(raw) =
                state
                    .store
                    .replace_at(item.position, email, record.password.expose(), &item.token)
            else {
                summary.discarded += 1;
                continue;
            };

            if !state.store.entries().contains(&item.raw) {
                state.failed.remove(&item.raw);
            }
            summary.updated.push(raw);
        }
        state.publish_failed();
        summary
    }
}
