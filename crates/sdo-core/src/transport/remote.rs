use std::sync::Arc;

use super::{Endpoints, FetchRequest, Transport};
use crate::cancel::Cancellation;
use crate::config::RepoName;
use crate::error::FetchError;

/// Token policy, CDN fallback and cancellation layered over a [`Transport`].
#[derive(Clone)]
pub struct Remote {
    transport: Arc<dyn Transport>,
    endpoints: Endpoints,
    cancel: Cancellation,
}

impl Remote {
    pub fn new(transport: Arc<dyn Transport>, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            cancel: Cancellation::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: Cancellation) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancel
    }

    fn check_cancelled(&self) -> Result<(), FetchError> {
        if self.cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        Ok(())
    }

    /// GET an API endpoint.
    pub async fn api(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.check_cancelled()?;
        self.transport.fetch(FetchRequest::api(url)).await
    }

    /// GET a whole-branch zipball.
    pub async fn branch_archive(&self, repo: &RepoName, branch: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.endpoints.zipball(repo, branch);
        log::debug!("Fetching branch archive {}", url);
        self.api(&url).await
    }

    /// GET a single file at a commit.
    ///
    /// Tries the raw host first (with the token when enabled). A definitive
    /// 404 there is final. Any other failure falls through the CDN mirrors
    /// in order; if all of them fail the primary error is returned.
    pub async fn content(&self, repo: &RepoName, sha: &str, path: &str) -> Result<Vec<u8>, FetchError> {
        self.check_cancelled()?;

        let primary_url = self.endpoints.raw(repo, sha, path);
        let primary_error = match self.transport.fetch(FetchRequest::content(&primary_url, true)).await {
            Ok(bytes) => return Ok(bytes),
            Err(e @ FetchError::NotFound { .. }) | Err(e @ FetchError::Cancelled) => return Err(e),
            Err(e) => e,
        };

        log::debug!("Primary fetch failed for {}: {}; trying mirrors", path, primary_error);

        for url in self.endpoints.cdn(repo, sha, path) {
            self.check_cancelled()?;
            match self.transport.fetch(FetchRequest::content(&url, false)).await {
                Ok(bytes) => return Ok(bytes),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => log::debug!("Mirror {} failed: {}", url, e),
            }
        }

        Err(primary_error)
    }
}
