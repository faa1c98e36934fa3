//! Batch driver: resolve, generate the script and package, one identifier
//! at a time.

use std::fmt;
use std::str::FromStr;

use crate::config::{RepoKind, RepoName, Repository};
use crate::error::{Result, SdoError};
use crate::event::{ProgressEvent, ProgressSink};
use crate::packager::{PackagedOutput, Packager};
use crate::resolver::{Resolution, Resolver, Satisfaction};
use crate::script;

/// Reduce user input such as `"1245620-dlc"` to its numeric identifier.
pub fn normalize_identifier(input: &str) -> Result<String> {
    input
        .trim()
        .split('-')
        .map(str::trim)
        .find(|segment| !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()))
        .map(str::to_string)
        .ok_or_else(|| SdoError::InvalidIdentifier(input.to_string()))
}

/// One identifier to resolve, with an optional display name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub app_id: String,
    pub game_name: Option<String>,
}

impl Job {
    pub fn new(app_id: &str) -> Result<Self> {
        Ok(Self {
            app_id: normalize_identifier(app_id)?,
            game_name: None,
        })
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.game_name = (!name.trim().is_empty()).then(|| name.trim().to_string());
        self
    }

    /// Name used for the archive; sanitized later.
    pub fn display_name(&self) -> &str {
        self.game_name.as_deref().unwrap_or("")
    }
}

/// Parses `ID` or `ID=NAME`.
impl FromStr for Job {
    type Err = SdoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('=') {
            Some((id, name)) => Ok(Job::new(id)?.with_name(name)),
            None => Job::new(s),
        }
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.game_name {
            Some(name) => write!(f, "{} ({})", self.app_id, name),
            None => f.write_str(&self.app_id),
        }
    }
}

/// Where a packaged identifier came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedJob {
    pub output: PackagedOutput,
    pub repo: RepoName,
    pub kind: RepoKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOutcome {
    Packaged(PackagedJob),
    NotFound,
    Failed(String),
    Cancelled,
}

impl BatchOutcome {
    pub fn is_packaged(&self) -> bool {
        matches!(self, BatchOutcome::Packaged(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobReport {
    pub job: Job,
    pub outcome: BatchOutcome,
}

/// Per-identifier outcomes, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub entries: Vec<JobReport>,
}

impl BatchReport {
    pub fn push(&mut self, job: Job, outcome: BatchOutcome) {
        self.entries.push(JobReport { job, outcome });
    }

    pub fn packaged(&self) -> usize {
        self.entries.iter().filter(|e| e.outcome.is_packaged()).count()
    }

    pub fn all_packaged(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_packaged())
    }

    pub fn was_cancelled(&self) -> bool {
        self.entries.iter().any(|e| e.outcome == BatchOutcome::Cancelled)
    }
}

pub struct Pipeline {
    resolver: Resolver,
    packager: Packager,
    repositories: Vec<Repository>,
}

impl Pipeline {
    pub fn new(resolver: Resolver, packager: Packager, repositories: Vec<Repository>) -> Self {
        Self {
            resolver,
            packager,
            repositories,
        }
    }

    /// Run every job in order. Stops early only on cancellation.
    pub async fn run(&self, jobs: &[Job], sink: &dyn ProgressSink) -> BatchReport {
        let mut report = BatchReport::default();
        for job in jobs {
            let outcome = self.run_job(job, sink).await;
            let cancelled = outcome == BatchOutcome::Cancelled;
            report.push(job.clone(), outcome);
            if cancelled {
                break;
            }
        }
        report
    }

    /// Resolve and package a single identifier.
    pub async fn run_job(&self, job: &Job, sink: &dyn ProgressSink) -> BatchOutcome {
        let resolution = match self.resolver.resolve(&self.repositories, &job.app_id, sink).await {
            Ok(resolution) => resolution,
            Err(SdoError::Cancelled) => return BatchOutcome::Cancelled,
            Err(e) => return BatchOutcome::Failed(e.to_string()),
        };

        let satisfaction = match resolution {
            Resolution::Satisfied(satisfaction) => satisfaction,
            Resolution::Exhausted => return BatchOutcome::NotFound,
        };

        if self.resolver.is_cancelled() {
            sink.emit(ProgressEvent::Cancelled {
                app_id: job.app_id.clone(),
            });
            return BatchOutcome::Cancelled;
        }

        let repo = satisfaction.repo().clone();
        let kind = satisfaction.kind();

        match self.package(job, satisfaction, sink) {
            Ok(output) => {
                sink.emit(ProgressEvent::PackagingComplete {
                    path: output.path.clone(),
                });
                BatchOutcome::Packaged(PackagedJob { output, repo, kind })
            }
            Err(e) => {
                log::error!("Packaging {} failed: {}", job.app_id, e);
                sink.emit(ProgressEvent::PackagingFailed {
                    app_id: job.app_id.clone(),
                    reason: e.to_string(),
                });
                BatchOutcome::Failed(e.to_string())
            }
        }
    }

    fn package(&self, job: &Job, satisfaction: Satisfaction, sink: &dyn ProgressSink) -> Result<PackagedOutput> {
        match satisfaction {
            Satisfaction::BranchArchive { bytes, .. } => {
                self.packager.package_archive(job.display_name(), &job.app_id, &bytes)
            }
            Satisfaction::Depots(acquisition) => {
                for depot in script::unscriptable_depots(&acquisition.keys, &acquisition.manifests) {
                    sink.emit(ProgressEvent::DepotSkipped {
                        app_id: job.app_id.clone(),
                        depot: depot.to_string(),
                    });
                }
                let script = script::generate(&job.app_id, &acquisition.keys, &acquisition.manifests);
                self.packager.package_depots(
                    job.display_name(),
                    &job.app_id,
                    acquisition.kind,
                    &script,
                    &acquisition.files,
                )
            }
        }
    }
}
