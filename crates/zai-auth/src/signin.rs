//! Email/password sign-in exchange
//!
//! POSTs `{"email", "password"}` to the upstream sign-in endpoint. Only an
//! HTTP 200 carrying a non-empty `token` field counts as success; every other
//! response is an error the caller counts and logs.

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::constants::USER_AGENT;
use crate::error::{Error, Result};
use crate::upstream::Upstream;

#[derive(Debug, Serialize)]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
}

/// Body returned by the sign-in endpoint. Fields other than `token` are ignored.
#[derive(Debug, Deserialize)]
pub struct SignInResponse {
    #[serde(default)]
    pub token: Option<String>,
}

impl Upstream {
    /// Exchange an email/password pair for a fresh session token.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<String> {
        let response = self
            .client
            .post(self.config.signin_url())
            .timeout(self.config.signin_timeout)
            .header(reqwest::header::USER_AGENT, USER_AGENT)
            .json(&SignInRequest { email, password })
            .send()
            .await
            .map_err(|e| Error::Http(format!("sign-in request failed: {e}")))?;

        let status = response.status();
        if status != StatusCode::OK {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<no body>"));

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(Error::InvalidCredentials(format!(
                    "sign-in rejected ({status}): {body}"
                )));
            }

            return Err(Error::SignIn(format!("sign-in returned {status}: {body}")));
        }

        let parsed = response
            .json::<SignInResponse>()
            .await
            .map_err(|e| Error::SignIn(format!("invalid sign-in response: {e}")))?;

        match parsed.token {
            Some(token) if !token.is_empty() => Ok(token),
            _ => Err(Error::MissingToken),
        }
    }
}
