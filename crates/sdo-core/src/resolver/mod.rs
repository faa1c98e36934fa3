//! Resolution policy
//!
//! Walks the configured repositories in order for one identifier and stops
//! at the first one that satisfies the request. What "satisfies" means is
//! decided per repository by a [`Strategy`] derived from the repository
//! kind and the acquisition [`Mode`]:
//!
//! - Branch repositories: the whole-branch archive exists.
//! - Strict mode: a key/config file exists and yields at least one key.
//! - Full mode: the branch exists.
//!
//! Definitive absence, rate limits and network failures all advance to the
//! next repository. Cancellation ends the scan.

use futures_util::stream::{self, StreamExt};

use crate::config::{RepoKind, RepoName, Repository};
use crate::depot::{KeySet, ManifestRef, ManifestSet};
use crate::error::{FetchError, Result, SdoError};
use crate::event::{ProgressEvent, ProgressSink};
use crate::packager::FetchedFile;
use crate::transport::Remote;
use crate::tree::{RemoteTree, RemoteTreeEntry, TreeLocator};
use crate::vdf::{self, Extraction};


/// Upper bound on file fetches in flight for one repository.
pub const MAX_CONCURRENT_FETCHES: usize = 8;

/// Acquisition policy for Encrypted and Decrypted repositories.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// A key/config file with at least one key is required.
    Strict,
    /// The existence of the branch is enough; everything in it is kept.
    Full,
}

impl Mode {
    pub fn from_strict(strict: bool) -> Self {
        if strict {
            Mode::Strict
        } else {
            Mode::Full
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    BranchArchive,
    StrictKeys,
    FullBranch,
}

impl Strategy {
    fn select(kind: RepoKind, mode: Mode) -> Self {
        match (kind, mode) {
            (RepoKind::Branch, _) => Strategy::BranchArchive,
            (_, Mode::Strict) => Strategy::StrictKeys,
            (_, Mode::Full) => Strategy::FullBranch,
        }
    }
}

/// Keys, manifests and files acquired from one Encrypted/Decrypted repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Acquisition {
    pub repo: RepoName,
    pub kind: RepoKind,
    pub keys: KeySet,
    pub manifests: ManifestSet,
    /// Files to package, sorted by path.
    pub files: Vec<FetchedFile>,
    pub updated_at: Option<String>,
}

/// Data that satisfied a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Satisfaction {
    Depots(Acquisition),
    BranchArchive { repo: RepoName, bytes: Vec<u8> },
}

impl Satisfaction {
    pub fn repo(&self) -> &RepoName {
        match self {
            Satisfaction::Depots(acquisition) => &acquisition.repo,
            Satisfaction::BranchArchive { repo, .. } => repo,
        }
    }

    pub fn kind(&self) -> RepoKind {
        match self {
            Satisfaction::Depots(acquisition) => acquisition.kind,
            Satisfaction::BranchArchive { .. } => RepoKind::Branch,
        }
    }
}

/// Outcome of trying one identifier against one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquisitionResult {
    Satisfied(Satisfaction),
    NotFound,
    Error(FetchError),
}

/// Outcome of a full scan for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Satisfied(Satisfaction),
    Exhausted,
}

enum ScanState {
    Scanning(usize),
    Satisfied(Satisfaction),
    Exhausted,
}

pub struct Resolver {
    remote: Remote,
    mode: Mode,
}

impl Resolver {
    pub fn new(remote: Remote, mode: Mode) -> Self {
        Self { remote, mode }
    }

    pub fn is_cancelled(&self) -> bool {
        self.remote.cancellation().is_cancelled()
    }

    /// Resolve `app_id` against `repositories`, in order.
    ///
    /// Unselected repositories are skipped. Returns
    /// [`SdoError::Cancelled`] if cancellation is observed.
    pub async fn resolve(
        &self,
        repositories: &[Repository],
        app_id: &str,
        sink: &dyn ProgressSink,
    ) -> Result<Resolution> {
        sink.emit(ProgressEvent::ResolutionStarted {
            app_id: app_id.to_string(),
        });

        let mut state = ScanState::Scanning(0);
        loop {
            state = match state {
                ScanState::Scanning(index) => {
                    let Some(repository) = repositories.get(index) else {
                        state = ScanState::Exhausted;
                        continue;
                    };

                    if self.is_cancelled() {
                        return Err(cancelled(app_id, sink));
                    }
                    if !repository.selected {
                        state = ScanState::Scanning(index + 1);
                        continue;
                    }

                    let label = repository.name.to_string();
                    sink.emit(ProgressEvent::RepositoryStarted {
                        repo: label.clone(),
                        kind: repository.kind,
                    });

                    match self.attempt(repository, app_id, sink).await {
                        AcquisitionResult::Satisfied(satisfaction) => {
                            let updated_at = match &satisfaction {
                                Satisfaction::Depots(acquisition) => acquisition.updated_at.clone(),
                                Satisfaction::BranchArchive { .. } => None,
                            };
                            sink.emit(ProgressEvent::Satisfied {
                                repo: label,
                                kind: repository.kind,
                                updated_at,
                            });
                            ScanState::Satisfied(satisfaction)
                        }
                        AcquisitionResult::NotFound => ScanState::Scanning(index + 1),
                        AcquisitionResult::Error(FetchError::Cancelled) => {
                            return Err(cancelled(app_id, sink));
                        }
                        AcquisitionResult::Error(FetchError::RateLimited { reset_at, .. }) => {
                            log::warn!("{} is rate limited", label);
                            sink.emit(ProgressEvent::RateLimited { repo: label, reset_at });
                            ScanState::Scanning(index + 1)
                        }
                        AcquisitionResult::Error(error) => {
                            log::debug!("{} failed: {}", label, error);
                            sink.emit(ProgressEvent::RepositoryFailed { repo: label, error });
                            ScanState::Scanning(index + 1)
                        }
                    }
                }
                ScanState::Satisfied(satisfaction) => return Ok(Resolution::Satisfied(satisfaction)),
                ScanState::Exhausted => {
                    sink.emit(ProgressEvent::Exhausted {
                        app_id: app_id.to_string(),
                    });
                    return Ok(Resolution::Exhausted);
                }
            };
        }
    }

    /// Try a single repository.
    pub async fn attempt(&self, repository: &Repository, app_id: &str, sink: &dyn ProgressSink) -> AcquisitionResult {
        let strategy = Strategy::select(repository.kind, self.mode);
        log::debug!("Trying {} for {} ({:?})", repository.name, app_id, strategy);

        let outcome = match strategy {
            Strategy::BranchArchive => self.branch_archive(repository, app_id, sink).await,
            Strategy::StrictKeys => self.strict_keys(repository, app_id, sink).await,
            Strategy::FullBranch => self.full_branch(repository, app_id, sink).await,
        };

        match outcome {
            Ok(Some(satisfaction)) => AcquisitionResult::Satisfied(satisfaction),
            Ok(None) => AcquisitionResult::NotFound,
            Err(error) => AcquisitionResult::Error(error),
        }
    }

    async fn branch_archive(
        &self,
        repository: &Repository,
        app_id: &str,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<Option<Satisfaction>, FetchError> {
        match self.remote.branch_archive(&repository.name, app_id).await {
            Ok(bytes) => Ok(Some(Satisfaction::BranchArchive {
                repo: repository.name.clone(),
                bytes,
            })),
            Err(e) if e.is_not_found() => {
                sink.emit(ProgressEvent::BranchNotFound {
                    repo: repository.name.to_string(),
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    async fn strict_keys(
        &self,
        repository: &Repository,
        app_id: &str,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<Option<Satisfaction>, FetchError> {
        let Some(tree) = self.list_branch(repository, app_id, sink).await? else {
            return Ok(None);
        };
        let label = repository.name.to_string();

        let Some(key_entry) = tree.find_key_file() else {
            if tree.truncated {
                sink.emit(ProgressEvent::TreeTruncated { repo: label.clone() });
            }
            sink.emit(ProgressEvent::KeyFileNotFound { repo: label });
            return Ok(None);
        };
        sink.emit(ProgressEvent::KeyFileFound {
            repo: label.clone(),
            path: key_entry.path.clone(),
        });

        let bytes = match self.remote.content(&tree.repo, &tree.commit_sha, &key_entry.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                sink.emit(ProgressEvent::FileFetchFailed {
                    repo: label,
                    path: key_entry.path.clone(),
                    error: e,
                });
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let keys = self.extract_keys(&label, &key_entry.path, &bytes, sink);
        if keys.is_empty() {
            return Ok(None);
        }

        let files = self.fetch_files(&tree, tree.manifests().collect(), sink).await?;
        let manifests = self.manifest_refs(&label, &files, sink);

        Ok(Some(Satisfaction::Depots(Acquisition {
            repo: repository.name.clone(),
            kind: repository.kind,
            keys,
            manifests,
            files,
            updated_at: tree.updated_at.clone(),
        })))
    }

    async fn full_branch(
        &self,
        repository: &Repository,
        app_id: &str,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<Option<Satisfaction>, FetchError> {
        let Some(tree) = self.list_branch(repository, app_id, sink).await? else {
            return Ok(None);
        };
        let label = repository.name.to_string();

        if tree.truncated {
            sink.emit(ProgressEvent::TreeTruncated { repo: label.clone() });
        }

        let files = self.fetch_files(&tree, tree.files().collect(), sink).await?;

        let keys = match tree.find_key_file() {
            Some(entry) => match files.iter().find(|f| f.path == entry.path) {
                Some(file) => {
                    sink.emit(ProgressEvent::KeyFileFound {
                        repo: label.clone(),
                        path: entry.path.clone(),
                    });
                    self.extract_keys(&label, &entry.path, &file.bytes, sink)
                }
                None => KeySet::new(),
            },
            None => {
                sink.emit(ProgressEvent::KeyFileNotFound { repo: label.clone() });
                KeySet::new()
            }
        };

        let manifests = self.manifest_refs(&label, &files, sink);

        Ok(Some(Satisfaction::Depots(Acquisition {
            repo: repository.name.clone(),
            kind: repository.kind,
            keys,
            manifests,
            files,
            updated_at: tree.updated_at.clone(),
        })))
    }

    /// List the branch, mapping definitive absence to `None`.
    async fn list_branch(
        &self,
        repository: &Repository,
        app_id: &str,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<Option<RemoteTree>, FetchError> {
        match TreeLocator::new(&self.remote).list_branch(&repository.name, app_id).await {
            Ok(tree) => Ok(Some(tree)),
            Err(e) if e.is_not_found() => {
                sink.emit(ProgressEvent::BranchNotFound {
                    repo: repository.name.to_string(),
                });
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn extract_keys(&self, label: &str, path: &str, bytes: &[u8], sink: &dyn ProgressSink) -> KeySet {
        match vdf::extract(bytes) {
            Extraction::Keys(keys) => {
                sink.emit(ProgressEvent::KeysExtracted {
                    repo: label.to_string(),
                    count: keys.len(),
                });
                keys
            }
            Extraction::ParseFailure { diagnostic } => {
                log::warn!("Could not parse {} from {}: {}", path, label, diagnostic);
                sink.emit(ProgressEvent::KeyFileUnparsable {
                    repo: label.to_string(),
                    path: path.to_string(),
                    diagnostic,
                });
                KeySet::new()
            }
        }
    }

    /// Fetch `entries` concurrently.
    ///
    /// Failed fetches are reported and left out. Events are emitted in path
    /// order once every fetch has finished.
    async fn fetch_files(
        &self,
        tree: &RemoteTree,
        entries: Vec<&RemoteTreeEntry>,
        sink: &dyn ProgressSink,
    ) -> std::result::Result<Vec<FetchedFile>, FetchError> {
        let mut results: Vec<(String, std::result::Result<Vec<u8>, FetchError>)> = stream::iter(entries)
            .map(|entry| async move {
                let result = self.remote.content(&tree.repo, &tree.commit_sha, &entry.path).await;
                (entry.path.clone(), result)
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;
        results.sort_by(|a, b| a.0.cmp(&b.0));

        if results.iter().any(|(_, r)| matches!(r, Err(FetchError::Cancelled))) {
            return Err(FetchError::Cancelled);
        }

        let label = tree.repo.to_string();
        let mut files = Vec::with_capacity(results.len());
        for (path, result) in results {
            match result {
                Ok(bytes) => {
                    sink.emit(ProgressEvent::FileFetched {
                        repo: label.clone(),
                        path: path.clone(),
                    });
                    files.push(FetchedFile { path, bytes });
                }
                Err(error) => {
                    log::debug!("Failed to fetch {} from {}: {}", path, label, error);
                    sink.emit(ProgressEvent::FileFetchFailed {
                        repo: label.clone(),
                        path,
                        error,
                    });
                }
            }
        }

        Ok(files)
    }

    fn manifest_refs(&self, label: &str, files: &[FetchedFile], sink: &dyn ProgressSink) -> ManifestSet {
        let mut manifests = ManifestSet::new();
        for file in files {
            let name = file.path.rsplit('/').next().unwrap_or(&file.path);
            if !crate::depot::is_manifest_name(name) {
                continue;
            }
            match ManifestRef::from_path(&file.path) {
                Some(manifest) => {
                    manifests.insert(manifest);
                }
                None => sink.emit(ProgressEvent::ManifestNameUnrecognized {
                    repo: label.to_string(),
                    path: file.path.clone(),
                }),
            }
        }
        manifests
    }
}

fn cancelled(app_id: &str, sink: &dyn ProgressSink) -> SdoError {
    sink.emit(ProgressEvent::Cancelled {
        app_id: app_id.to_string(),
    });
    SdoError::Cancelled
}
