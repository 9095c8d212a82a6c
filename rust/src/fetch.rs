//! Blocking HTTP(S) transport, also understanding `file://` URLs
//! the way dnf does for `gpgkey=`.
// SPDX-License-Identifier: Apache-2.0 OR MIT

use crate::cancel::Cancellable;
use crate::config::FetchConfig;
use anyhow::{Context, Result};
use reqwest::blocking::{Client, Response};
use reqwest::{StatusCode, Url};
use std::fs::File;
use std::io::{self, Read};
use std::time::Duration;

/// Failure to retrieve a single URL.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("failed to open {path}")]
    File {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("failed to read response body")]
    Body(#[source] io::Error),
}

/// A readable response body.
pub enum Body {
    Http(Response),
    File(File),
}

impl Read for Body {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Body::Http(r) => r.read(buf),
            Body::File(f) => f.read(buf),
        }
    }
}

impl std::fmt::Debug for Body {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Body::Http(r) => write!(f, "Body::Http({})", r.url()),
            Body::File(_) => write!(f, "Body::File"),
        }
    }
}

/// Issues GET requests with a bounded timeout.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    timeout: Duration,
    cancellable: Cancellable,
}

impl Fetcher {
    pub fn new(config: &FetchConfig, cancellable: Cancellable) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .build()
            .context("Building HTTP client")?;
        Ok(Self {
            client,
            timeout: config.timeout,
            cancellable,
        })
    }

    pub fn cancellable(&self) -> &Cancellable {
        &self.cancellable
    }

    /// Request timeout, shortened so that it never outlives the run deadline.
    fn request_timeout(&self) -> Duration {
        match self.cancellable.remaining() {
            Some(r) => r.min(self.timeout),
            None => self.timeout,
        }
    }

    /// Start a GET request; any non-success status is an error.
    pub fn get(&self, url: &str) -> Result<Body, FetchError> {
        let invalid = |reason: String| FetchError::InvalidUrl {
            url: url.to_string(),
            reason,
        };
        let parsed = Url::parse(url).map_err(|e| invalid(e.to_string()))?;
        if parsed.scheme() == "file" {
            let path = parsed
                .to_file_path()
                .map_err(|_| invalid("not a local path".into()))?;
            let f = File::open(&path).map_err(|source| FetchError::File {
                path: path.display().to_string(),
                source,
            })?;
            return Ok(Body::File(f));
        }
        tracing::debug!("GET {}", url);
        let resp = self
            .client
            .get(parsed)
            .timeout(self.request_timeout())
            .send()?;
        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status(status));
        }
        Ok(Body::Http(resp))
    }

    /// Download a (small) resource into memory.
    pub fn get_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let mut body = self.get(url)?;
        let mut buf = Vec::new();
        body.read_to_end(&mut buf).map_err(FetchError::Body)?;
        Ok(buf)
    }
}
