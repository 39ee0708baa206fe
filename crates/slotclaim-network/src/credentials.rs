//! Identity credentials and the 24h wall-clock cache in front of them.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use slotclaim_protocol::CREDENTIAL_TTL_SECS;

use crate::{BoxFuture, NetworkError};

/// An authenticated identity token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub issued_at: DateTime<Utc>,
}

impl Credential {
    pub fn is_fresh(&self, now: DateTime<Utc>, ttl: chrono::Duration) -> bool {
        now.signed_duration_since(self.issued_at) < ttl
    }
}

/// External source of identity tokens.
pub trait CredentialSource: Send + Sync {
    fn resolve_credential<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<String, NetworkError>>;
}

/// Tokens supplied up front, typically from the config file.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    tokens: HashMap<String, String>,
}

impl StaticCredentials {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl CredentialSource for StaticCredentials {
    fn resolve_credential<'a>(
        &'a self,
        identity: &'a str,
    ) -> BoxFuture<'a, Result<String, NetworkError>> {
        Box::pin(async move {
            self.tokens
                .get(identity)
                .cloned()
                .ok_or_else(|| NetworkError::MissingCredential(identity.to_string()))
        })
    }
}

/// Caches resolved credentials per identity so that repeated connects
/// within the TTL skip the authentication round-trip.
pub struct CredentialCache {
    source: Arc<dyn CredentialSource>,
    ttl: chrono::Duration,
    entries: Mutex<HashMap<String, Credential>>,
}

impl CredentialCache {
    pub fn new(source: Arc<dyn CredentialSource>) -> Self {
        Self::with_ttl(source, chrono::Duration::seconds(CREDENTIAL_TTL_SECS))
    }

    pub fn with_ttl(source: Arc<dyn CredentialSource>, ttl: chrono::Duration) -> Self {
        Self {
            source,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub async fn resolve(&self, identity: &str) -> Result<Credential, NetworkError> {
        self.resolve_at(identity, Utc::now()).await
    }

    /// Resolve against an explicit wall-clock instant.
    pub async fn resolve_at(
        &self,
        identity: &str,
        now: DateTime<Utc>,
    ) -> Result<Credential, NetworkError> {
        if let Some(cached) = self.entries.lock().await.get(identity) {
            if cached.is_fresh(now, self.ttl) {
                return Ok(cached.clone());
            }
        }

        tracing::debug!(identity = %identity, "Resolving identity credential");
        let token = self.source.resolve_credential(identity).await?;
        let credential = Credential {
            token,
            issued_at: now,
        };
        self.entries
            .lock()
            .await
            .insert(identity.to_string(), credential.clone());
        Ok(credential)
    }

    /// Forget the cached credential for one identity.
    pub async fn invalidate(&self, identity: &str) {
        self.entries.lock().await.remove(identity);
    }
}
