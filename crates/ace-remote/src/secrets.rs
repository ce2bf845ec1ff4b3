//! HTTP implementation of `ace_core::credentials::SecretFetcher` (§6,
//! `--secrets-backend secret-manager`).
//!
//! `ace-core` stays HTTP-client-agnostic (its `SecretFetcher` trait has no
//! `reqwest` dependency); this crate already owns that dependency for the
//! board/issue clients, so the real fetcher lives here.

use ace_core::credentials::{CredentialError, SecretFetcher};
use async_trait::async_trait;
use std::time::Duration;

/// Fetches a secret from `<endpoint_base>/secrets/<name>`, expecting a JSON
/// body `{"value": "<secret>"}`. Grounded on
/// `original_source/src/ace/config/secrets.py`'s GCP Secret Manager client,
/// generalized to a plain HTTP GET since no GCP SDK is in this crate's
/// dependency stack.
pub struct HttpSecretFetcher {
    http: reqwest::Client,
}

impl HttpSecretFetcher {
    pub fn new() -> Self {
        HttpSecretFetcher {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build http client"),
        }
    }
}

impl Default for HttpSecretFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SecretFetcher for HttpSecretFetcher {
    async fn fetch_secret(&self, endpoint_base: &str, name: &str) -> Result<String, CredentialError> {
        let url = format!("{}/secrets/{}", endpoint_base.trim_end_matches('/'), name);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| CredentialError::BackendUnavailable(e.to_string()))?;

        if !response.status().is_success() {
            return Err(CredentialError::BackendUnavailable(format!(
                "status {}",
                response.status()
            )));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CredentialError::BackendUnavailable(e.to_string()))?;

        body.get("value")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| CredentialError::NotFound(name.to_string()))
    }
}
