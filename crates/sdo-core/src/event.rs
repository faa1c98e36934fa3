//! Progress events emitted during resolution and packaging.
//!
//! The core never formats user-facing text. It reports what happened as
//! [`ProgressEvent`] values through an explicit [`ProgressSink`] passed into
//! every resolution call, and the presentation layer decides how to render
//! them.

use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};

use crate::config::RepoKind;
use crate::error::FetchError;

/// Something observable happened while resolving one identifier.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// Resolution of an identifier began.
    ResolutionStarted { app_id: String },

    /// A repository is being tried.
    RepositoryStarted { repo: String, kind: RepoKind },

    /// The identifier's branch does not exist in the repository.
    BranchNotFound { repo: String },

    /// The remote listing was incomplete, so a missing file is inconclusive.
    TreeTruncated { repo: String },

    /// A key/config file was located in the branch tree.
    KeyFileFound { repo: String, path: String },

    /// Neither `key.vdf` nor `config.vdf` exists in the branch tree.
    KeyFileNotFound { repo: String },

    /// The key/config file could not be parsed.
    KeyFileUnparsable {
        repo: String,
        path: String,
        diagnostic: String,
    },

    /// Keys were extracted from a key/config file.
    KeysExtracted { repo: String, count: usize },

    /// A single file was fetched.
    FileFetched { repo: String, path: String },

    /// A single file could not be fetched; it is accounted as missing.
    FileFetchFailed {
        repo: String,
        path: String,
        error: FetchError,
    },

    /// A manifest file name did not follow `{depot}_{manifest}.manifest`.
    ManifestNameUnrecognized { repo: String, path: String },

    /// A depot identifier was not numeric, so it was left out of the script.
    DepotSkipped { app_id: String, depot: String },

    /// The remote refused further requests for now.
    RateLimited {
        repo: String,
        reset_at: Option<DateTime<Utc>>,
    },

    /// A repository could not be queried; scanning continues.
    RepositoryFailed { repo: String, error: FetchError },

    /// A repository satisfied the request; scanning stops.
    Satisfied {
        repo: String,
        kind: RepoKind,
        updated_at: Option<String>,
    },

    /// No configured repository satisfied the request.
    Exhausted { app_id: String },

    /// The final archive was written.
    PackagingComplete { path: PathBuf },

    /// The final archive could not be written.
    PackagingFailed { app_id: String, reason: String },

    /// The run was cancelled.
    Cancelled { app_id: String },
}

impl ProgressEvent {
    /// Whether the presentation layer should treat the event as a warning.
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            ProgressEvent::TreeTruncated { .. }
                | ProgressEvent::ManifestNameUnrecognized { .. }
                | ProgressEvent::DepotSkipped { .. }
                | ProgressEvent::KeyFileUnparsable { .. }
                | ProgressEvent::RateLimited { .. }
                | ProgressEvent::Cancelled { .. }
        )
    }

    /// Whether the presentation layer should treat the event as an error.
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            ProgressEvent::FileFetchFailed { .. }
                | ProgressEvent::RepositoryFailed { .. }
                | ProgressEvent::Exhausted { .. }
                | ProgressEvent::PackagingFailed { .. }
        )
    }
}

/// Receiver of progress events.
pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn emit(&self, event: ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Sink that records events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the events recorded so far.
    pub fn events(&self) -> Vec<ProgressEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl ProgressSink for MemorySink {
    fn emit(&self, event: ProgressEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event),
            Err(poisoned) => poisoned.into_inner().push(event),
        }
    }
}
