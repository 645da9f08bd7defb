use reqwest::{RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::sync::Arc;
use thiserror::Error;

use crate::auth::{AccessTokenProvider, CredentialError};

pub mod catalog;
pub mod completion;
pub mod search;

pub use search::SearchIterator;

pub const API_VERSION: &str = "v2alpha";

#[derive(Debug, Error)]
pub enum RetailError {
    /// The service answered with its error envelope.
    #[error("retail api error: code = {status} ({code}) desc = {message}")]
    Api {
        code: u16,
        status: String,
        message: String,
    },

    #[error("retail api request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Credentials(#[from] CredentialError),
}

impl RetailError {
    pub fn is_not_found(&self) -> bool {
        match self {
            RetailError::Api { code, status, .. } => {
                *code == StatusCode::NOT_FOUND.as_u16() || status == "NOT_FOUND"
            }
            _ => false,
        }
    }

    /// The part of the error that is safe to hand back to an HTTP caller.
    pub fn client_message(&self) -> String {
        match self {
            RetailError::Api { message, .. } => message.clone(),
            RetailError::Http(e) => e.to_string(),
            RetailError::Credentials(e) => e.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorStatus {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// HTTP client for the Retail REST API, shared by all handlers.
#[derive(Clone)]
pub struct RetailClient {
    http: reqwest::Client,
    base_url: String,
    tokens: Arc<AccessTokenProvider>,
}

impl RetailClient {
    pub fn new(endpoint: &str, tokens: Arc<AccessTokenProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), API_VERSION),
            tokens,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL of a resource name, optionally followed by a `:method` suffix.
    fn url(&self, resource: &str, method: Option<&str>) -> String {
        let resource = resource.trim_start_matches('/');
        match method {
            Some(method) => format!("{}/{}:{}", self.base_url, resource, method),
            None => format!("{}/{}", self.base_url, resource),
        }
    }

    async fn post_json<B, R>(&self, url: String, body: &B) -> Result<R, RetailError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.send(self.http.post(url).json(body)).await
    }

    async fn get_json<R>(&self, url: String, query: &[(&str, String)]) -> Result<R, RetailError>
    where
        R: DeserializeOwned,
    {
        self.send(self.http.get(url).query(query)).await
    }

    async fn send<R>(&self, request: RequestBuilder) -> Result<R, RetailError>
    where
        R: DeserializeOwned,
    {
        let token = self.tokens.token().await?;
        let res = request.bearer_auth(token).send().await?;
        let status = res.status();
        if status.is_success() {
            return Ok(res.json().await?);
        }

        let body = res.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorEnvelope>(&body) {
            Ok(envelope) => RetailError::Api {
                code: if envelope.error.code == 0 {
                    status.as_u16()
                } else {
                    envelope.error.code
                },
                status: envelope.error.status,
                message: envelope.error.message,
            },
            Err(_) => RetailError::Api {
                code: status.as_u16(),
                status: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
                message: if body.is_empty() {
                    status.to_string()
                } else {
                    body
                },
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(endpoint: &str) -> RetailClient {
        RetailClient::new(endpoint, Arc::new(AccessTokenProvider::static_token("t")))
    }

    #[test]
    fn test_resource_urls() {
        let client = client("https://retail.googleapis.com/");
        assert_eq!(client.base_url(), "https://retail.googleapis.com/v2alpha");
        assert_eq!(
            client.url("projects/P/locations/global/catalogs/default_catalog", Some("completeQuery")),
            "https://retail.googleapis.com/v2alpha/projects/P/locations/global/catalogs/default_catalog:completeQuery"
        );
        assert_eq!(
            client.url("/projects/P/products/1", None),
            "https://retail.googleapis.com/v2alpha/projects/P/products/1"
        );
    }

    #[test]
    fn test_not_found_detection() {
        let err = RetailError::Api {
            code: 404,
            status: "NOT_FOUND".into(),
            message: "Product not found".into(),
        };
        assert!(err.is_not_found());
        assert_eq!(err.client_message(), "Product not found");

        let err = RetailError::Api {
            code: 400,
            status: "INVALID_ARGUMENT".into(),
            message: "bad page token".into(),
        };
        assert!(!err.is_not_found());
    }
}
