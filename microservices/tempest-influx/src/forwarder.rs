//! Write-endpoint forwarder
//!
//! Sends one line-protocol statement per request. The client is built once
//! and shared by every in-flight packet.

use std::time::Duration;

use reqwest::{Client, Url};
use thiserror::Error;
use tracing::{debug, info};

const MAX_BODY_IN_ERROR: usize = 256;

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("Invalid target URL: {0}")]
    InvalidTarget(String),

    #[error("Transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Write rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },
}

pub type Result<T> = std::result::Result<T, ForwardError>;

#[derive(Debug, Clone)]
pub struct ForwarderConfig {
    /// Write endpoint base URL
    pub target: String,
    pub token: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Log requests instead of sending them
    pub noop: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered { status: u16 },
    DryRun,
}

/// HTTP forwarder for line-protocol writes
#[derive(Debug, Clone)]
pub struct Forwarder {
    client: Client,
    target: Url,
    token: String,
    noop: bool,
}

impl Forwarder {
    pub fn new(config: &ForwarderConfig) -> Result<Self> {
        let target = Url::parse(&config.target)
            .map_err(|e| ForwardError::InvalidTarget(format!("{}: {}", config.target, e)))?;

        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            target,
            token: config.token.clone(),
            noop: config.noop,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.noop
    }

    /// Target URL with `bucket` and `precision` set; other query pairs are kept
    pub fn write_url(&self, bucket: &str) -> Url {
        let kept: Vec<(String, String)> = self
            .target
            .query_pairs()
            .filter(|(k, _)| k != "bucket" && k != "precision")
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        let mut url = self.target.clone();
        url.set_query(None);
        {
            let mut pairs = url.query_pairs_mut();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            pairs.append_pair("bucket", bucket);
            pairs.append_pair("precision", "s");
        }
        url
    }

    /// Write one statement to `bucket`
    pub async fn forward(&self, line: &str, bucket: &str) -> Result<ForwardOutcome> {
        let url = self.write_url(bucket);

        if self.noop {
            info!(url = %url, line = %line, "Dry run, write not sent");
            return Ok(ForwardOutcome::DryRun);
        }

        debug!(url = %url, bytes = line.len(), "Forwarding write");

        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(line.to_string())
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            Ok(ForwardOutcome::Delivered {
                status: status.as_u16(),
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ForwardError::Rejected {
                status: status.as_u16(),
                body: body.trim().chars().take(MAX_BODY_IN_ERROR).collect(),
            })
        }
    }
}
