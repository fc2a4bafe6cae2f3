use crate::constants::files::STATE_FILE_MODE;
use crate::errors::ToolError;
use crate::utils::fs_atomic::atomic_write_text_file;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

/// Persisted credential state: dashboard tokens plus the API keys minted per
/// application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub api_keys: BTreeMap<String, String>,
}

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

impl CredentialState {
    pub fn apply_grant(&mut self, grant: TokenGrant) {
        self.access_token = Some(grant.access_token);
        if let Some(refresh) = grant.refresh_token {
            self.refresh_token = Some(refresh);
        }
        self.expires_at = grant
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs));
    }
}

/// Shared owner of [`CredentialState`]. Every read-modify-write goes through
/// the inner lock and is persisted before the lock is released.
pub struct TokenStore {
    path: Option<PathBuf>,
    state: Mutex<CredentialState>,
}

impl TokenStore {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ToolError> {
        let path = path.as_ref().to_path_buf();
        let state = match std::fs::read_to_string(&path) {
            Ok(raw) if raw.trim().is_empty() => CredentialState::default(),
            Ok(raw) => serde_json::from_str(&raw).map_err(|err| {
                ToolError::credential(format!(
                    "Failed to parse credential state {}: {}",
                    path.display(),
                    err
                ))
                .with_hint("Delete the file and authenticate again")
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => CredentialState::default(),
            Err(err) => {
                return Err(ToolError::credential(format!(
                    "Failed to read credential state {}: {}",
                    path.display(),
                    err
                )))
            }
        };
        Ok(Self {
            path: Some(path),
            state: Mutex::new(state),
        })
    }

    /// Store that never touches disk.
    pub fn in_memory(state: CredentialState) -> Self {
        Self {
            path: None,
            state: Mutex::new(state),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn snapshot(&self) -> CredentialState {
        self.state.lock().await.clone()
    }

    pub async fn update<F>(&self, apply: F) -> Result<CredentialState, ToolError>
    where
        F: FnOnce(&mut CredentialState),
    {
        let mut guard = self.state.lock().await;
        let mut next = guard.clone();
        apply(&mut next);
        self.persist(&next).await?;
        *guard = next.clone();
        Ok(next)
    }

    /// Rotates the access token unless someone already did.
    ///
    /// When the stored token no longer equals `stale`, another caller
    /// refreshed while this one waited on the lock and that token is returned
    /// without a second round trip.
    pub async fn refresh<F, Fut>(&self, stale: &str, exchange: F) -> Result<String, ToolError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<TokenGrant, ToolError>>,
    {
        let mut guard = self.state.lock().await;
        if let Some(current) = guard.access_token.as_deref() {
            if current != stale {
                return Ok(current.to_string());
            }
        }
        let refresh_token = guard.refresh_token.clone().ok_or_else(|| {
            ToolError::credential("Access token expired and no refresh token is stored")
                .with_hint("Authenticate again to obtain a new token")
        })?;

        let grant = exchange(refresh_token).await?;
        let mut next = guard.clone();
        next.apply_grant(grant);
        self.persist(&next).await?;
        let token = next.access_token.clone().unwrap_or_default();
        *guard = next;
        tracing::info!("dashboard access token refreshed");
        Ok(token)
    }

    /// Writes `state` on the blocking pool; the caller keeps the lock until
    /// the file is in place.
    async fn persist(&self, state: &CredentialState) -> Result<(), ToolError> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let raw = serde_json::to_string_pretty(state)
            .map_err(|err| ToolError::internal(format!("Failed to encode state: {}", err)))?;
        tokio::task::spawn_blocking(move || {
            atomic_write_text_file(&path, &raw, STATE_FILE_MODE).map_err(|err| {
                ToolError::credential(format!(
                    "Failed to write credential state {}: {}",
                    path.display(),
                    err
                ))
            })
        })
        .await
        .map_err(|err| ToolError::internal(format!("Credential state writer failed: {}", err)))?
    }
}
