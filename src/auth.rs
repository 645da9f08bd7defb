use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::Mutex;

pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they actually expire.
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("failed to read credentials file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse credentials file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid service account private key: {0}")]
    InvalidKey(#[source] jsonwebtoken::errors::Error),

    #[error("failed to sign token assertion: {0}")]
    Sign(#[source] jsonwebtoken::errors::Error),

    #[error("token request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("token endpoint returned {status}: {body}")]
    TokenEndpoint { status: u16, body: String },
}

/// Contents of a credentials JSON file, keyed on its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    ServiceAccount(ServiceAccountKey),
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) > now
    }
}

enum TokenSource {
    Static(String),
    MetadataServer { url: String },
    ServiceAccount { key: ServiceAccountKey, signer: EncodingKey },
    AuthorizedUser(AuthorizedUser),
}

/// Hands out OAuth access tokens for the Retail API, caching them until
/// shortly before they expire.
pub struct AccessTokenProvider {
    http: reqwest::Client,
    source: TokenSource,
    cached: Mutex<Option<CachedToken>>,
}

impl AccessTokenProvider {
    fn with_source(source: TokenSource) -> Self {
        Self {
            http: reqwest::Client::new(),
            source,
            cached: Mutex::new(None),
        }
    }

    /// A fixed token, never refreshed.
    pub fn static_token(token: impl Into<String>) -> Self {
        Self::with_source(TokenSource::Static(token.into()))
    }

    /// Tokens from the managed environment's metadata server.
    pub fn metadata_server() -> Self {
        Self::metadata_server_at(METADATA_TOKEN_URL)
    }

    pub fn metadata_server_at(url: impl Into<String>) -> Self {
        Self::with_source(TokenSource::MetadataServer { url: url.into() })
    }

    pub fn from_credentials(credentials: CredentialsFile) -> Result<Self, CredentialError> {
        let source = match credentials {
            CredentialsFile::ServiceAccount(key) => {
                let signer = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
                    .map_err(CredentialError::InvalidKey)?;
                TokenSource::ServiceAccount { key, signer }
            }
            CredentialsFile::AuthorizedUser(user) => TokenSource::AuthorizedUser(user),
        };
        Ok(Self::with_source(source))
    }

    pub fn from_file(path: &Path) -> Result<Self, CredentialError> {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let credentials: CredentialsFile =
            serde_json::from_str(&content).map_err(|source| CredentialError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        Self::from_credentials(credentials)
    }

    /// Pick a token source the way the server does at startup:
    /// `RETAIL_ACCESS_TOKEN` wins, then the credentials file when running
    /// locally, else the metadata server.
    pub fn from_environment(local: bool, credentials_file: &Path) -> Result<Self, CredentialError> {
        if let Ok(token) = std::env::var("RETAIL_ACCESS_TOKEN") {
            if !token.is_empty() {
                log::info!("using access token from RETAIL_ACCESS_TOKEN");
                return Ok(Self::static_token(token));
            }
        }
        if local {
            log::info!("using credentials file {}", credentials_file.display());
            return Self::from_file(credentials_file);
        }
        log::info!("using metadata server credentials");
        Ok(Self::metadata_server())
    }

    pub fn kind(&self) -> &'static str {
        match &self.source {
            TokenSource::Static(_) => "static",
            TokenSource::MetadataServer { .. } => "metadata_server",
            TokenSource::ServiceAccount { .. } => "service_account",
            TokenSource::AuthorizedUser(_) => "authorized_user",
        }
    }

    /// Current access token, fetching a new one if the cached token is stale.
    pub async fn token(&self) -> Result<String, CredentialError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some(token) = &*cached {
            if token.is_fresh(now) {
                return Ok(token.token.clone());
            }
        }

        let fresh = self.fetch(now).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    async fn fetch(&self, now: DateTime<Utc>) -> Result<CachedToken, CredentialError> {
        let request = match &self.source {
            TokenSource::Static(token) => {
                return Ok(CachedToken {
                    token: token.clone(),
                    expires_at: now + Duration::days(365),
                });
            }
            TokenSource::MetadataServer { url } => {
                self.http.get(url).header("Metadata-Flavor", "Google")
            }
            TokenSource::ServiceAccount { key, signer } => {
                let assertion = sign_assertion(key, signer, now)?;
                self.http.post(&key.token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            TokenSource::AuthorizedUser(user) => self.http.post(&user.token_uri).form(&[
                ("grant_type", "refresh_token"),
                ("client_id", user.client_id.as_str()),
                ("client_secret", user.client_secret.as_str()),
                ("refresh_token", user.refresh_token.as_str()),
            ]),
        };

        let res = request.send().await?;
        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            return Err(CredentialError::TokenEndpoint {
                status: status.as_u16(),
                body,
            });
        }
        let body: TokenResponse = res.json().await?;
        let expires_in = body.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        log::debug!("fetched {} access token, expires in {expires_in}s", self.kind());

        Ok(CachedToken {
            token: body.access_token,
            expires_at: now + Duration::seconds(expires_in),
        })
    }
}

fn sign_assertion(
    key: &ServiceAccountKey,
    signer: &EncodingKey,
    now: DateTime<Utc>,
) -> Result<String, CredentialError> {
    let iat = now.timestamp();
    let claims = AssertionClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: &key.token_uri,
        iat,
        exp: iat + ASSERTION_LIFETIME_SECS,
    };
    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();
    encode(&header, &claims, signer).map_err(CredentialError::Sign)
}
