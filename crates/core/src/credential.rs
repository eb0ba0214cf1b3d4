//! Ephemeral credentials minted by a trusted intermediary.

use crate::error::CredentialError;
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::fmt;
use tracing::{debug, instrument};

/// A short-lived bearer token authorizing one negotiation.
pub struct EphemeralKey(SecretString);

impl EphemeralKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(SecretString::from(value.into()))
    }

    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl fmt::Debug for EphemeralKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EphemeralKey([REDACTED])")
    }
}

/// Anything that can hand out an ephemeral credential.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CredentialSource: Send + Sync {
    async fn fetch(&self) -> Result<EphemeralKey, CredentialError>;
}

#[derive(Deserialize)]
struct SessionTokenResponse {
    client_secret: ClientSecret,
}

#[derive(Deserialize)]
struct ClientSecret {
    value: String,
}

/// Fetches credentials with a plain `GET` against the intermediary.
///
/// The intermediary answers with `{ "client_secret": { "value": "<token>" } }`.
pub struct HttpCredentialSource {
    client: reqwest::Client,
    url: String,
}

impl HttpCredentialSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl CredentialSource for HttpCredentialSource {
    #[instrument(name = "fetch_credential", skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<EphemeralKey, CredentialError> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(CredentialError::Unreachable)?;

        let status = response.status();
        if !status.is_success() {
            return Err(CredentialError::Status(status.as_u16()));
        }

        let body: SessionTokenResponse = response
            .json()
            .await
            .map_err(|e| CredentialError::Malformed(e.to_string()))?;
        if body.client_secret.value.is_empty() {
            return Err(CredentialError::Malformed(
                "client_secret.value is empty".to_string(),
            ));
        }

        debug!("Obtained ephemeral credential");
        Ok(EphemeralKey::new(body.client_secret.value))
    }
}
