//! # BankID Adapter
//!
//! `IdentityProviderGateway` over the BankID relying-party API v6.0.
//!
//! Production requests authenticate with a client certificate (mutual TLS).
//! Every failure, including transport errors and unparseable bodies, is
//! normalized into a [`ProviderError`]. Transport and decode errors are
//! logged here and replaced by fixed details, since those details can reach
//! the signer.

use crate::domain::provider::{
    CollectResponse, InitiateRequest, OrderTokens, ProviderError, ProviderErrorCode,
};
use crate::ports::outbound::IdentityProviderGateway;
use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, instrument, warn};

const TEST_API_URL: &str = "https://appapi2.test.bankid.com/rp/v6.0";
const PRODUCTION_API_URL: &str = "https://appapi2.bankid.com/rp/v6.0";

const INIT_FAILED_DETAILS: &str = "Failed to initiate BankID authentication";
const POLL_FAILED_DETAILS: &str = "Failed to check BankID status";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BankIdEnvironment {
    #[default]
    Test,
    Production,
}

impl BankIdEnvironment {
    pub fn api_url(&self) -> &'static str {
        match self {
            Self::Test => TEST_API_URL,
            Self::Production => PRODUCTION_API_URL,
        }
    }
}

impl FromStr for BankIdEnvironment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(format!("unknown BankID environment: {other}")),
        }
    }
}

/// BankID client configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BankIdConfig {
    pub environment: BankIdEnvironment,
    /// Overrides the environment's API URL.
    pub api_url: Option<String>,
    /// PEM bundle with the relying-party certificate and private key.
    pub client_cert_path: Option<PathBuf>,
    /// PEM root certificate for the BankID server.
    pub ca_cert_path: Option<PathBuf>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    /// Plain text shown in the BankID app; sent base64-encoded.
    pub user_visible_data: String,
}

impl Default for BankIdConfig {
    fn default() -> Self {
        Self {
            environment: BankIdEnvironment::Test,
            api_url: None,
            client_cert_path: None,
            ca_cert_path: None,
            request_timeout: Duration::from_secs(10),
            user_visible_data: "SimpleSign Document Signing".to_string(),
        }
    }
}

impl BankIdConfig {
    pub fn base_url(&self) -> &str {
        self.api_url
            .as_deref()
            .unwrap_or_else(|| self.environment.api_url())
    }
}

/// Failures while building the HTTP client.
#[derive(Debug, Error)]
pub enum BankIdSetupError {
    #[error("failed to read certificate {path}: {source}")]
    ReadCertificate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid certificate in {path}: {source}")]
    InvalidCertificate {
        path: PathBuf,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthBody<'a> {
    end_user_ip: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    personal_number: Option<&'a str>,
    end_user_message: &'a str,
    user_visible_data: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderRefBody<'a> {
    order_ref: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error_code: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

/// BankID relying-party client.
pub struct BankIdGateway {
    client: reqwest::Client,
    base_url: String,
    user_visible_data: String,
}

impl BankIdGateway {
    pub fn new(config: &BankIdConfig) -> Result<Self, BankIdSetupError> {
        let mut builder = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(format!("ss-safeprotocol/{}", env!("CARGO_PKG_VERSION")));

        if let Some(path) = &config.client_cert_path {
            let pem = read_pem(path)?;
            let identity = reqwest::Identity::from_pem(&pem).map_err(|source| {
                BankIdSetupError::InvalidCertificate {
                    path: path.clone(),
                    source,
                }
            })?;
            builder = builder.identity(identity);
        }

        if let Some(path) = &config.ca_cert_path {
            let pem = read_pem(path)?;
            let root = reqwest::Certificate::from_pem(&pem).map_err(|source| {
                BankIdSetupError::InvalidCertificate {
                    path: path.clone(),
                    source,
                }
            })?;
            builder = builder.add_root_certificate(root);
        }

        let client = builder.build().map_err(BankIdSetupError::Client)?;
        Ok(Self::with_client(
            client,
            config.base_url(),
            &config.user_visible_data,
        ))
    }

    /// Client against an arbitrary base URL without TLS client auth.
    pub fn with_base_url(base_url: &str, timeout: Duration) -> Result<Self, BankIdSetupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(BankIdSetupError::Client)?;
        Ok(Self::with_client(
            client,
            base_url,
            &BankIdConfig::default().user_visible_data,
        ))
    }

    fn with_client(client: reqwest::Client, base_url: &str, user_visible_data: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user_visible_data: base64::engine::general_purpose::STANDARD
                .encode(user_visible_data.as_bytes()),
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint)
    }
}

fn read_pem(path: &Path) -> Result<Vec<u8>, BankIdSetupError> {
    std::fs::read(path).map_err(|source| BankIdSetupError::ReadCertificate {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a `ProviderError` from a non-2xx response.
async fn error_from_response(response: reqwest::Response, default_details: &str) -> ProviderError {
    let status = response.status();
    match response.json::<ErrorBody>().await {
        Ok(body) => {
            let code = body.error_code.as_deref().unwrap_or("UNKNOWN_ERROR");
            let details = body
                .details
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| default_details.to_string());
            ProviderError::new(ProviderErrorCode::from_code(code), details).with_hint(body.hint)
        }
        Err(_) => {
            debug!(status = %status, "BankID error body was not JSON");
            ProviderError::new(ProviderErrorCode::Unknown, default_details)
        }
    }
}

#[async_trait]
impl IdentityProviderGateway for BankIdGateway {
    #[instrument(skip(self, request), fields(ip = %request.ip_address))]
    async fn initiate(&self, request: InitiateRequest) -> Result<OrderTokens, ProviderError> {
        let body = AuthBody {
            end_user_ip: request.ip_address.to_string(),
            personal_number: request.personal_number.as_ref().map(|p| p.expose()),
            end_user_message: &request.end_user_message,
            user_visible_data: &self.user_visible_data,
        };

        let response = self
            .client
            .post(self.url("auth"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "BankID auth request failed");
                ProviderError::new(ProviderErrorCode::InitFailed, INIT_FAILED_DETAILS)
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "BankID authentication failed").await);
        }

        let tokens: OrderTokens = response.json().await.map_err(|e| {
            warn!(error = %e, "BankID auth response could not be decoded");
            ProviderError::new(ProviderErrorCode::InitFailed, INIT_FAILED_DETAILS)
        })?;
        debug!(order_ref = %tokens.order_ref, "BankID order started");
        Ok(tokens)
    }

    #[instrument(skip(self))]
    async fn poll(&self, order_ref: &str) -> Result<CollectResponse, ProviderError> {
        let response = self
            .client
            .post(self.url("collect"))
            .json(&OrderRefBody { order_ref })
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "BankID collect request failed");
                ProviderError::new(ProviderErrorCode::PollFailed, POLL_FAILED_DETAILS)
            })?;

        if !response.status().is_success() {
            return Err(error_from_response(response, "BankID poll failed").await);
        }

        let collected: CollectResponse = response.json().await.map_err(|e| {
            warn!(error = %e, "BankID collect response could not be decoded");
            ProviderError::new(ProviderErrorCode::PollFailed, POLL_FAILED_DETAILS)
        })?;
        debug!(status = ?collected.status, hint_code = ?collected.hint_code, "BankID order collected");
        Ok(collected)
    }

    #[instrument(skip(self))]
    async fn cancel(&self, order_ref: &str) -> bool {
        match self
            .client
            .post(self.url("cancel"))
            .json(&OrderRefBody { order_ref })
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(error = %e, "BankID cancel request failed");
                false
            }
        }
    }
}
