use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::RequestBuilder;

pub struct SecretString(String);

impl SecretString {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// Where the service-account key comes from.
#[derive(Debug)]
pub enum CredentialSource {
    Inline(SecretString),
    File(PathBuf),
    /// No authentication, for the Firestore emulator and local mock servers.
    None,
}

impl CredentialSource {
    pub fn from_env() -> Result<Self> {
        if let Ok(key_json) = std::env::var("GOOGLE_SERVICE_ACCOUNT_KEY") {
            return Ok(Self::Inline(SecretString(key_json)));
        }
        let path = std::env::var("GOOGLE_APPLICATION_CREDENTIALS").context(
            "neither GOOGLE_SERVICE_ACCOUNT_KEY nor GOOGLE_APPLICATION_CREDENTIALS env var is set",
        )?;
        Ok(Self::File(PathBuf::from(path)))
    }

    pub fn load(&self) -> Result<Credentials> {
        let account = match self {
            Self::Inline(key_json) => CustomServiceAccount::from_json(key_json.expose())
                .context("invalid service account key in GOOGLE_SERVICE_ACCOUNT_KEY")?,
            Self::File(path) => CustomServiceAccount::from_file(path)
                .with_context(|| format!("failed to load service account from {}", path.display()))?,
            Self::None => return Ok(Credentials::Anonymous),
        };
        Ok(Credentials::ServiceAccount(Arc::new(account)))
    }
}

#[derive(Clone)]
pub enum Credentials {
    ServiceAccount(Arc<dyn TokenProvider>),
    Anonymous,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ServiceAccount(_) => f.write_str("ServiceAccount([REDACTED])"),
            Self::Anonymous => f.write_str("Anonymous"),
        }
    }
}

impl Credentials {
    /// Attaches a bearer token for `scopes`, or leaves the request untouched when anonymous.
    pub async fn authorize(&self, req: RequestBuilder, scopes: &[&str]) -> Result<RequestBuilder> {
        match self {
            Self::ServiceAccount(provider) => {
                let token = provider
                    .token(scopes)
                    .await
                    .context("failed to obtain access token")?;
                Ok(req.bearer_auth(token.as_str()))
            }
            Self::Anonymous => Ok(req),
        }
    }

    pub async fn project_id(&self) -> Result<Option<String>> {
        match self {
            Self::ServiceAccount(provider) => {
                let project_id = provider
                    .project_id()
                    .await
                    .context("service account does not name a project")?;
                Ok(Some(project_id.to_string()))
            }
            Self::Anonymous => Ok(None),
        }
    }
}
