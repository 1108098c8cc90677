// SPDX-License-Identifier: AGPL-3.0-or-later
// SPDX-FileCopyrightText: 2024 Hyperpolymath

//! Image retrieval for image-URL requests

use crate::error::{ExplainError, Result};
use std::time::Duration;

/// Default timeout for image downloads
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Source of raw image bytes
pub trait ImageSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>>;
}

/// Blocking HTTP(S) downloader
#[derive(Debug, Clone)]
pub struct HttpImageFetcher {
    client: reqwest::blocking::Client,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ExplainError::Config(format!("failed to build http client: {}", e)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::blocking::Client) -> Self {
        Self { client }
    }
}

impl ImageSource for HttpImageFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>> {
        let failed = |reason: String| ExplainError::ExternalFetchFailed {
            url: url.to_string(),
            reason,
        };

        tracing::info!("Fetching image from: {}", url);

        let response = self.client.get(url).send().map_err(|e| failed(e.to_string()))?;
        if !response.status().is_success() {
            return Err(failed(format!("status {}", response.status())));
        }

        let body = response.bytes().map_err(|e| failed(e.to_string()))?;
        if body.is_empty() {
            return Err(failed("empty response body".to_string()));
        }

        tracing::debug!("Fetched {} bytes", body.len());
        Ok(body.to_vec())
    }
}
