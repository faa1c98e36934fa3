pub mod cancel;
pub mod config;
pub mod depot;
pub mod error;
pub mod event;
pub mod http;
pub mod packager;
pub mod pipeline;
pub mod resolver;
pub mod script;
pub mod transport;
pub mod tree;
pub mod vdf;

pub use cancel::Cancellation;
pub use config::{Config, ConfigLoader, RepoKind, RepoName, Repository, RepositoryList, Settings};
pub use depot::{DepotId, KeySet, ManifestId, ManifestRef, ManifestSet};
pub use error::{FetchError, Result, SdoError};
pub use event::{MemorySink, NullSink, ProgressEvent, ProgressSink};
pub use http::{HttpClient, HttpClientConfig};
pub use packager::{FetchedFile, PackagedOutput, Packager};
pub use pipeline::{normalize_identifier, BatchOutcome, BatchReport, Job, JobReport, PackagedJob, Pipeline};
pub use resolver::{Acquisition, AcquisitionResult, Mode, Resolution, Resolver, Satisfaction};
pub use transport::{Endpoints, Remote, Transport};
pub use tree::{RemoteTree, RemoteTreeEntry, TreeLocator};
