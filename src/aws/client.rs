//! HTTP client that signs every request for one AWS service.

use chrono::Utc;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use serde::Serialize;
use tracing::debug;

use super::credentials::CredentialSource;
use super::sigv4::{sign_request, SigningParams};
use crate::error::{Error, Result};

/// Request body plus its content type.
#[derive(Debug, Clone)]
pub struct Payload {
    content_type: &'static str,
    bytes: Vec<u8>,
}

impl Payload {
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(Self {
            content_type: "application/json",
            bytes: serde_json::to_vec(value)?,
        })
    }

    pub fn ndjson(body: String) -> Self {
        Self {
            content_type: "application/x-ndjson",
            bytes: body.into_bytes(),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

/// reqwest client bound to a credential source, region and service.
#[derive(Debug, Clone)]
pub struct SignedClient {
    http: reqwest::Client,
    credentials: CredentialSource,
    region: String,
    service: &'static str,
    label: &'static str,
}

impl SignedClient {
    /// `service` is the SigV4 signing name (`es`, `bedrock`, `execute-api`);
    /// `label` is used in error messages and logs.
    pub fn new(
        http: reqwest::Client,
        credentials: CredentialSource,
        region: impl Into<String>,
        service: &'static str,
        label: &'static str,
    ) -> Self {
        Self {
            http,
            credentials,
            region: region.into(),
            service,
            label,
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Sign and send a request, returning the raw response.
    pub async fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
    ) -> Result<reqwest::Response> {
        let credentials = self.credentials.resolve()?;

        let mut builder = self
            .http
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(payload) = payload {
            builder = builder
                .header(CONTENT_TYPE, payload.content_type)
                .body(payload.bytes);
        }
        let mut request = builder.build()?;

        sign_request(
            &mut request,
            &SigningParams {
                credentials: &credentials,
                region: &self.region,
                service: self.service,
                time: Utc::now(),
            },
        )?;

        debug!(service = self.label, %method, url, "Sending signed request");
        Ok(self.http.execute(request).await?)
    }

    /// Like [`send`](Self::send) but maps non-success statuses to
    /// [`Error::Upstream`] and returns the body text.
    pub async fn send_checked(
        &self,
        method: Method,
        url: &str,
        payload: Option<Payload>,
    ) -> Result<String> {
        let response = self.send(method, url, payload).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(Error::Upstream {
                service: self.label,
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_payload_content_type() {
        let payload = Payload::ndjson("{}\n".to_string());
        assert_eq!(payload.content_type, "application/x-ndjson");
        assert_eq!(payload.as_bytes(), b"{}\n");
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_sending() {
        let client = SignedClient::new(
            reqwest::Client::new(),
            CredentialSource::Environment,
            "us-east-1",
            "es",
            "OpenSearch",
        );
        // Only meaningful when the test environment carries no AWS keys.
        if crate::aws::AwsCredentials::from_env().is_some() {
            return;
        }
        let err = client
            .send(Method::GET, "http://127.0.0.1:9/_cluster/health", None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CredentialsUnavailable));
    }
}
