//! Z.AI upstream constants
//!
//! Endpoint paths and client identity used for every upstream call. These are
//! public values of the web client, not secrets.

use std::time::Duration;

/// Upstream origin serving both chat and sign-in endpoints
pub const DEFAULT_BASE_URL: &str = "https://chat.z.ai";

/// Chat completion endpoint, used for production requests and health probes
pub const CHAT_COMPLETIONS_PATH: &str = "/api/chat/completions";

/// Email/password sign-in endpoint returning `{"token": "..."}`
pub const SIGNIN_PATH: &str = "/api/v1/auths/signin";

/// Upstream model identifier used for the synthetic probe request
pub const DEFAULT_MODEL: &str = "0727-360B-API";

/// Browser user agent the upstream web client sends
pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/138.0.0.0 Safari/537.36";

/// Frontend build the upstream expects in `x-fe-version`
pub const FRONTEND_VERSION: &str = "prod-fe-1.0.53";

/// TCP connect timeout for all upstream calls
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Total timeout for a health probe request
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Total timeout for one sign-in exchange
pub const DEFAULT_SIGNIN_TIMEOUT: Duration = Duration::from_secs(30);
