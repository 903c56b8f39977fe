//! HTTP transport: one GET per URL, body to disk with progress or to memory.
//!
//! No retry happens here; callers wrap these calls with the combinators in
//! [`crate::fetch::retry`].

use indicatif::{ProgressBar, ProgressStyle};
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub mod quote_providers;
pub use quote_providers::{AlphaVantageProvider, QuoteProvider, YahooProvider};

const USER_AGENT: &str = "rapina/0.1 (+https://github.com/dude333/rapina)";

/// Per-call transport options
#[derive(Debug, Clone, Copy)]
pub struct RequestOptions {
    /// Some gateways present broken certificate chains
    pub verify_tls: bool,
    /// Overall budget; `None` for archive downloads, which stream progress
    pub timeout: Option<Duration>,
}

impl RequestOptions {
    /// Small JSON/HTML endpoints
    pub fn small(timeout: Duration) -> Self {
        Self {
            verify_tls: true,
            timeout: Some(timeout),
        }
    }

    /// Archive downloads: no overall cap
    pub fn archive() -> Self {
        Self {
            verify_tls: true,
            timeout: None,
        }
    }

    pub fn without_tls_verification(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}

/// HTTP client shared by every fetcher
#[derive(Clone)]
pub struct HttpClient {
    secure: Client,
    insecure: Client,
}

impl HttpClient {
    /// Create a client whose connect phase is capped at `connect_timeout`
    pub fn new(connect_timeout: Duration) -> Result<Self> {
        let build = |verify: bool| {
            Client::builder()
                .user_agent(USER_AGENT)
                .connect_timeout(connect_timeout)
                .danger_accept_invalid_certs(!verify)
                .build()
                .map_err(|e| Error::network("<client>", e))
        };

        Ok(Self {
            secure: build(true)?,
            insecure: build(false)?,
        })
    }

    fn client(&self, options: RequestOptions) -> &Client {
        if options.verify_tls {
            &self.secure
        } else {
            &self.insecure
        }
    }

    async fn send(&self, url: &str, options: RequestOptions) -> Result<Response> {
        let mut request = self.client(options).get(url);
        if let Some(timeout) = options.timeout {
            request = request.timeout(timeout);
        }

        debug!("GET {}", url);
        let response = request.send().await.map_err(|e| Error::network(url, e))?;

        if response.status() != StatusCode::OK {
            return Err(Error::NotFound(format!("{} ({})", url, response.status())));
        }
        Ok(response)
    }

    /// Stream the body of `url` into `target`, returning the byte count
    pub async fn download(&self, url: &str, target: &Path, options: RequestOptions) -> Result<u64> {
        let mut response = self.send(url, options).await?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::io(parent, e))?;
        }
        let mut file = tokio::fs::File::create(target)
            .await
            .map_err(|e| Error::io(target, e))?;

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::with_template("{spinner:.green} {msg} {bytes} ({bytes_per_sec})")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(file_label(target));

        let mut total: u64 = 0;
        let outcome: Result<()> = async {
            while let Some(chunk) = response.chunk().await.map_err(|e| Error::network(url, e))? {
                file.write_all(&chunk).await.map_err(|e| Error::io(target, e))?;
                total += chunk.len() as u64;
                pb.set_position(total);
            }
            file.flush().await.map_err(|e| Error::io(target, e))
        }
        .await;
        pb.finish_and_clear();

        if let Err(e) = outcome {
            warn!("⚠️ download de {} falhou após {} bytes: {}", url, total, e);
            drop(file);
            let _ = tokio::fs::remove_file(target).await;
            return Err(e);
        }

        info!("📥 {} ({} bytes)", file_label(target), total);
        Ok(total)
    }

    /// Fetch `url` as raw bytes
    pub async fn get_bytes(&self, url: &str, options: RequestOptions) -> Result<Vec<u8>> {
        let response = self.send(url, options).await?;
        let bytes = response.bytes().await.map_err(|e| Error::network(url, e))?;
        Ok(bytes.to_vec())
    }

    /// Fetch `url` as text (UTF-8 or whatever charset the server declares)
    pub async fn get_text(&self, url: &str, options: RequestOptions) -> Result<String> {
        let response = self.send(url, options).await?;
        response.text().await.map_err(|e| Error::network(url, e))
    }

    /// Fetch and deserialize a JSON document
    pub async fn get_json<T: DeserializeOwned>(&self, url: &str, options: RequestOptions) -> Result<T> {
        let body = self.get_text(url, options).await?;
        Ok(serde_json::from_str(&body)?)
    }
}

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
