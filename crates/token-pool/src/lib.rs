//! Rotating pool of Z.AI upstream tokens
//!
//! Holds an ordered list of raw entries (bare tokens, `email----password`
//! pairs, or `email----password----token` composites), hands out tokens with
//! skip-failed round robin, tracks which entries the upstream rejected, and
//! re-authenticates entries that carry credentials.
//!
//! Entry lifecycle:
//! 1. Pool is built from the configured list; every entry starts usable
//! 2. `select_next()` returns the next token not marked failed
//! 3. Upstream 401/403/429 → `report(Rejected)` marks the entry failed
//! 4. Health loop probes failed entries and clears those accepted again
//! 5. Refresh loop signs in entries with credentials and rewrites them in place
//! 6. When every entry is failed, the failed set is cleared and rotation restarts

pub mod entry;
pub mod error;
pub mod outcome;
pub mod pool;
pub mod refresh;
pub mod scheduler;
pub mod store;

pub use entry::{CredentialEntry, PLACEHOLDER_IDENTITY, SEPARATOR, extract_token};
pub use error::{Error, Result};
pub use outcome::{Outcome, classify_status};
pub use pool::{EntryStatus, Pool};
pub use refresh::{DEFAULT_MAX_CONCURRENT, RefreshReport, batch_refresh};
pub use scheduler::{
    EntrySink, HealthSchedule, RefreshSchedule, Scheduler, health_cycle, refresh_cycle,
};
pub use store::{CredentialRecord, CredentialStore};
