//! Remote access: the [`Transport`] seam, endpoint layout, and the
//! [`Remote`] facade that adds token policy and CDN fallback on top.
//!
//! Every fetch resolves to bytes or a [`FetchError`]. A 404 is reported as
//! [`FetchError::NotFound`] so callers can tell "definitely absent" from a
//! transient failure.

mod endpoints;
mod remote;

pub use endpoints::Endpoints;
pub use remote::Remote;

use async_trait::async_trait;

use crate::error::FetchError;

/// Which class of endpoint a request targets.
///
/// Rate-limit detection only applies to the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// JSON API (branch lookup, tree listing, zipball).
    Api,
    /// Raw file content.
    Content,
}

/// A single GET request.
#[derive(Debug, Clone, Copy)]
pub struct FetchRequest<'a> {
    pub url: &'a str,
    pub kind: EndpointKind,
    /// Attach the configured bearer token, if any.
    pub use_token: bool,
}

impl<'a> FetchRequest<'a> {
    pub fn api(url: &'a str) -> Self {
        Self {
            url,
            kind: EndpointKind::Api,
            use_token: true,
        }
    }

    pub fn content(url: &'a str, use_token: bool) -> Self {
        Self {
            url,
            kind: EndpointKind::Content,
            use_token,
        }
    }
}

/// Fetches raw bytes over some transport.
///
/// Implementations retry transient failures themselves and must report
/// 404 as `NotFound` and API throttling as `RateLimited` without retrying.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn fetch(&self, request: FetchRequest<'_>) -> Result<Vec<u8>, FetchError>;
}
