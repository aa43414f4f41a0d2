// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Fetching the raw bytes of the sample asset.

use std::sync::Arc;

use futures_util::future::{BoxFuture, FutureExt};
use tracing::debug;

use crate::error::EngineError;

/// Fetches the raw, undecoded bytes of an asset.
pub trait AssetFetcher: Send + Sync {
    /// Starts fetching the asset at the given location. Nothing happens until the
    /// returned future is polled.
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Vec<u8>, EngineError>>;
}

/// Fetches assets with an HTTP GET.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a new HTTP fetcher.
    pub fn new() -> Result<HttpFetcher, EngineError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| EngineError::unavailable("http client", e))?;
        Ok(HttpFetcher { client })
    }
}

impl AssetFetcher for HttpFetcher {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Vec<u8>, EngineError>> {
        let client = self.client.clone();
        let location = location.to_string();
        async move {
            debug!(location, "GET sample asset");
            let response = client
                .get(&location)
                .send()
                .await
                .map_err(|e| EngineError::unavailable(&location, e))?;

            let status = response.status();
            if !status.is_success() {
                return Err(EngineError::unavailable(
                    &location,
                    format!("HTTP {}", status.as_u16()),
                ));
            }

            let body = response
                .bytes()
                .await
                .map_err(|e| EngineError::unavailable(&location, e))?;
            Ok(body.to_vec())
        }
        .boxed()
    }
}

/// Reads assets from the local filesystem.
pub struct FileFetcher {}

impl FileFetcher {
    pub fn new() -> FileFetcher {
        FileFetcher {}
    }
}

impl Default for FileFetcher {
    fn default() -> Self {
        FileFetcher::new()
    }
}

impl AssetFetcher for FileFetcher {
    fn fetch(&self, location: &str) -> BoxFuture<'static, Result<Vec<u8>, EngineError>> {
        let location = location.to_string();
        async move {
            debug!(location, "Reading sample asset");
            tokio::fs::read(&location)
                .await
                .map_err(|e| EngineError::unavailable(&location, e))
        }
        .boxed()
    }
}

/// Returns true if the location should be fetched over HTTP.
pub fn is_remote(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

/// Gets the fetcher appropriate for the given location.
pub fn for_location(location: &str) -> Result<Arc<dyn AssetFetcher>, EngineError> {
    if is_remote(location) {
        Ok(Arc::new(HttpFetcher::new()?))
    } else {
        Ok(Arc::new(FileFetcher::new()))
    }
}
