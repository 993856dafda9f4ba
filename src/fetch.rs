//! Request/response model and the network abstraction.

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// How a request was issued by the page.
///
/// The fetch policy is chosen on this alone: top-level document loads are
/// served network-first, everything else cache-first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestMode {
    /// A top-level document load.
    Navigate,
    /// A sub-resource load (style sheet, script, image, data file).
    SubResource,
}

/// A request intercepted by the cache worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Absolute request URL.
    pub url: String,
    /// Request mode, which selects the fetch policy.
    pub mode: RequestMode,
}

impl Request {
    /// Creates a navigation (document) request.
    #[must_use]
    pub fn navigation(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::Navigate,
        }
    }

    /// Creates a sub-resource request.
    #[must_use]
    pub fn sub_resource(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            mode: RequestMode::SubResource,
        }
    }

    /// Returns true if this is a top-level document load.
    #[must_use]
    pub const fn is_navigation(&self) -> bool {
        matches!(self.mode, RequestMode::Navigate)
    }
}

/// Classification of a response relative to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseKind {
    /// Same-origin response with full header visibility.
    Basic,
    /// Cross-origin response obtained via CORS.
    Cors,
    /// Cross-origin response with no visibility into the payload headers.
    Opaque,
}

/// A response, either live from the network or replayed from a cache bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL the response was fetched from.
    pub url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HashMap<String, String>,
    /// Response body.
    pub body: Bytes,
    /// Origin classification.
    pub kind: ResponseKind,
}

impl Response {
    /// Creates a same-origin response with the given status and body.
    #[must_use]
    pub fn basic(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: HashMap::new(),
            body: body.into(),
            kind: ResponseKind::Basic,
        }
    }

    /// Returns true if this response may be stored in a cache bucket.
    ///
    /// Only successful (status 200) same-origin basic responses are
    /// cacheable; everything else is passed through to the page untouched.
    #[must_use]
    pub fn is_cacheable(&self) -> bool {
        self.status == 200 && self.kind == ResponseKind::Basic
    }
}

/// Abstraction over network fetches for testability.
#[async_trait]
pub trait Network: Send + Sync {
    /// Performs the request against the live network.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be completed (DNS failure,
    /// connection refused, offline). HTTP error statuses are *not* errors;
    /// they come back as a [`Response`] with the corresponding status.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Default network implementation backed by `reqwest`.
pub struct ReqwestNetwork {
    client: reqwest::Client,
    origin: String,
}

impl ReqwestNetwork {
    /// Creates a network layer that classifies responses against `origin`
    /// (scheme + host, e.g. `https://example.com`).
    #[must_use]
    pub fn new(client: reqwest::Client, origin: impl Into<String>) -> Self {
        Self {
            client,
            origin: origin.into(),
        }
    }

    fn classify(&self, url: &str) -> ResponseKind {
        if url.starts_with(&self.origin) {
            ResponseKind::Basic
        } else {
            ResponseKind::Opaque
        }
    }
}

#[async_trait]
impl Network for ReqwestNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        let resp = self.client.get(&request.url).send().await?;
        let status = resp.status().as_u16();
        let url = resp.url().to_string();
        let headers = resp
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        let body = resp.bytes().await?;
        let kind = self.classify(&url);

        Ok(Response {
            url,
            status,
            headers,
            body,
            kind,
        })
    }
}
