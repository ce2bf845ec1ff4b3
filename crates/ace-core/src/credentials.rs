//! The credential store abstraction named as an external collaborator in
//! §1 and required by §4.9 step 6 (resolve required tokens, bail fatally if
//! any required token is missing).
//!
//! Grounded in `original_source/src/ace/config/secrets.py`'s
//! GCP-Secret-Manager-vs-env fallback shape, generalized to a
//! backend-agnostic HTTP call since a GCP SDK is out of this crate's
//! dependency stack.

use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential '{0}' not found")]
    NotFound(String),
    #[error("credential backend request failed: {0}")]
    BackendUnavailable(String),
}

/// Resolves named credentials (GitHub tokens, model API keys, ...).
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn resolve(&self, name: &str) -> Result<String, CredentialError>;
}

/// Reads credentials straight from the process environment. This is the
/// default backend (`--secrets-backend env`).
pub struct EnvCredentialStore;

#[async_trait]
impl CredentialStore for EnvCredentialStore {
    async fn resolve(&self, name: &str) -> Result<String, CredentialError> {
        std::env::var(name).map_err(|_| CredentialError::NotFound(name.to_string()))
    }
}

/// A thin seam over whatever HTTP client actually fetches a secret from a
/// remote secret-manager endpoint. `ace-remote` provides the real
/// implementation since it already owns the `reqwest` dependency; this
/// trait lets `ace-core` stay HTTP-client-agnostic.
#[async_trait]
pub trait SecretFetcher: Send + Sync {
    async fn fetch_secret(&self, endpoint_base: &str, name: &str) -> Result<String, CredentialError>;
}

/// Resolves credentials against a configurable secret-manager endpoint,
/// falling back to the environment when the backend is unreachable —
/// matching the prior implementation's secret-manager-then-env fallback
/// (`--secrets-backend secret-manager`).
pub struct SecretManagerCredentialStore {
    endpoint_base: String,
    fetcher: std::sync::Arc<dyn SecretFetcher>,
    fallback: EnvCredentialStore,
}

impl SecretManagerCredentialStore {
    pub fn new(endpoint_base: impl Into<String>, fetcher: std::sync::Arc<dyn SecretFetcher>) -> Self {
        SecretManagerCredentialStore {
            endpoint_base: endpoint_base.into(),
            fetcher,
            fallback: EnvCredentialStore,
        }
    }
}

#[async_trait]
impl CredentialStore for SecretManagerCredentialStore {
    async fn resolve(&self, name: &str) -> Result<String, CredentialError> {
        match self.fetcher.fetch_secret(&self.endpoint_base, name).await {
            Ok(secret) => Ok(secret),
            Err(e) => {
                tracing::warn!(credential = name, error = %e, "secret-manager lookup failed, falling back to env");
                self.fallback.resolve(name).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn env_store_resolves_present_var() {
        // SAFETY: test-only; no other test in this module touches this var.
        unsafe { std::env::set_var("ACE_TEST_CREDENTIAL_X", "secret-value") };
        let store = EnvCredentialStore;
        assert_eq!(store.resolve("ACE_TEST_CREDENTIAL_X").await.unwrap(), "secret-value");
        unsafe { std::env::remove_var("ACE_TEST_CREDENTIAL_X") };
    }

    #[tokio::test]
    async fn env_store_errors_on_missing_var() {
        unsafe { std::env::remove_var("ACE_TEST_CREDENTIAL_MISSING") };
        let store = EnvCredentialStore;
        assert!(store.resolve("ACE_TEST_CREDENTIAL_MISSING").await.is_err());
    }

    struct FailingFetcher;

    #[async_trait]
    impl SecretFetcher for FailingFetcher {
        async fn fetch_secret(&self, _endpoint_base: &str, _name: &str) -> Result<String, CredentialError> {
            Err(CredentialError::BackendUnavailable("unreachable in test".to_string()))
        }
    }

    #[tokio::test]
    async fn secret_manager_store_falls_back_to_env_on_backend_failure() {
        unsafe { std::env::set_var("ACE_TEST_CREDENTIAL_FALLBACK", "from-env") };
        let store = SecretManagerCredentialStore::new(
            "https://secrets.invalid",
            std::sync::Arc::new(FailingFetcher),
        );
        assert_eq!(
            store.resolve("ACE_TEST_CREDENTIAL_FALLBACK").await.unwrap(),
            "from-env"
        );
        unsafe { std::env::remove_var("ACE_TEST_CREDENTIAL_FALLBACK") };
    }
}
