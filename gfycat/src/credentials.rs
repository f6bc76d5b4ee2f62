//! The OAuth credential bundle and its on-disk store.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// The full token state Gfycat hands out from its token endpoint.
///
/// Every field is optional: a freshly created credentials file holds an empty bundle, and the
/// API is free to leave out fields it considers unchanged. The shape doubles as the on-disk
/// format, so a file written by [`CredentialStore::save`] is exactly a token-endpoint response.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default)]
    pub access_token: Option<String>,
    /// Lifetime of the access token in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub refresh_token_expires_in: Option<u64>,
    /// The user the tokens were issued for.
    #[serde(default)]
    pub resource_owner: Option<String>,
}

impl Credentials {
    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref().filter(|t| !t.is_empty())
    }

    /// Fills in the refresh token from `previous` when a refresh response did not carry one.
    pub(crate) fn inherit_refresh_token(&mut self, previous: &Credentials) {
        if self.refresh_token().is_none() && previous.refresh_token().is_some() {
            tracing::trace!("new credentials lack a refresh token, keeping the previous one");
            self.refresh_token = previous.refresh_token.clone();
            self.refresh_token_expires_in = previous.refresh_token_expires_in;
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn redact(secret: &Option<String>) -> &'static str {
            if secret.is_some() { "<redacted>" } else { "None" }
        }
        f.debug_struct("Credentials")
            .field("access_token", &redact(&self.access_token))
            .field("expires_in", &self.expires_in)
            .field("refresh_token", &redact(&self.refresh_token))
            .field("refresh_token_expires_in", &self.refresh_token_expires_in)
            .field("resource_owner", &self.resource_owner)
            .finish()
    }
}

/// A JSON file holding one [`Credentials`] bundle.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the bundle, first creating the file with an empty bundle if it does not exist.
    pub async fn load_or_create(&self) -> Result<Credentials> {
        let exists = tokio::fs::try_exists(&self.path)
            .await
            .map_err(|e| Error::io(format!("check for {}", self.path.display()), e))?;
        if !exists {
            tracing::info!(
                path = %self.path.display(),
                "credentials file does not exist, creating it now"
            );
            self.save(&Credentials::default()).await?;
        }
        self.load().await
    }

    pub async fn load(&self) -> Result<Credentials> {
        let raw = tokio::fs::read(&self.path)
            .await
            .map_err(|e| Error::io(format!("read credentials from {}", self.path.display()), e))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Overwrites the file with `credentials`.
    pub async fn save(&self, credentials: &Credentials) -> Result<()> {
        let json = serde_json::to_vec_pretty(credentials)?;
        tokio::fs::write(&self.path, json)
            .await
            .map_err(|e| Error::io(format!("write credentials to {}", self.path.display()), e))?;
        tracing::debug!(path = %self.path.display(), "persisted credentials");
        Ok(())
    }
}
