//! AWS credential resolution.

use std::fmt;

use crate::error::{Error, Result};

/// Access key pair plus optional session token.
#[derive(Clone)]
pub struct AwsCredentials {
    pub access_key_id: String,
    secret_access_key: String,
    pub session_token: Option<String>,
}

impl AwsCredentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        session_token: Option<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            session_token,
        }
    }

    /// Read the standard `AWS_*` variables through `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Option<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let access_key_id = non_empty("AWS_ACCESS_KEY_ID")?;
        let secret_access_key = non_empty("AWS_SECRET_ACCESS_KEY")?;
        Some(Self {
            access_key_id,
            secret_access_key,
            session_token: non_empty("AWS_SESSION_TOKEN"),
        })
    }

    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn secret_access_key(&self) -> &str {
        &self.secret_access_key
    }
}

impl fmt::Debug for AwsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AwsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"<redacted>")
            .field("session_token", &self.session_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

/// Where signing credentials come from.
///
/// Environment credentials are re-read on every request so rotated
/// session tokens are picked up without a restart.
#[derive(Debug, Clone, Default)]
pub enum CredentialSource {
    #[default]
    Environment,
    Static(AwsCredentials),
}

impl CredentialSource {
    pub fn resolve(&self) -> Result<AwsCredentials> {
        match self {
            CredentialSource::Environment => {
                AwsCredentials::from_env().ok_or(Error::CredentialsUnavailable)
            }
            CredentialSource::Static(credentials) => Ok(credentials.clone()),
        }
    }
}
