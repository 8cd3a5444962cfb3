//! AWS plumbing shared by the Bedrock, OpenSearch and API Gateway clients.
//!
//! ```text
//! ┌──────────────────┐   resolve   ┌─────────────────┐
//! │ CredentialSource │────────────▶│ AwsCredentials  │
//! └──────────────────┘             └────────┬────────┘
//!                                           │
//!                                           ▼
//! ┌──────────────┐   build    ┌──────────────────────┐   execute
//! │ SignedClient │───────────▶│ sigv4::sign_request  │──────────▶ service
//! └──────────────┘            └──────────────────────┘
//! ```

mod client;
mod credentials;
pub mod sigv4;

pub use client::{Payload, SignedClient};
pub use credentials::{AwsCredentials, CredentialSource};

/// Turn a configured endpoint into a base URL.
///
/// Bare hostnames (the usual form of an OpenSearch domain endpoint) get an
/// `https://` scheme; trailing slashes are dropped.
pub fn endpoint_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_url_adds_scheme() {
        assert_eq!(
            endpoint_url("search-demo.us-east-1.es.amazonaws.com"),
            "https://search-demo.us-east-1.es.amazonaws.com"
        );
    }

    #[test]
    fn test_endpoint_url_keeps_scheme_and_trims_slash() {
        assert_eq!(endpoint_url("http://127.0.0.1:9200/"), "http://127.0.0.1:9200");
    }
}
