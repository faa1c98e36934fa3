//! Repository list: the ordered set of GitHub sources scanned for each identifier.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SdoError};

/// How a repository stores depot data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RepoKind {
    /// Manifests with hashed keys; output archives are marked encrypted.
    #[serde(alias = "encrypted", alias = "ENCRYPTED")]
    Encrypted,
    /// Manifests with working decryption keys.
    #[serde(alias = "decrypted", alias = "DECRYPTED")]
    Decrypted,
    /// Prebuilt per-identifier branches, downloaded as a zipball verbatim.
    #[serde(alias = "branch", alias = "BRANCH")]
    Branch,
}

impl RepoKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoKind::Encrypted => "Encrypted",
            RepoKind::Decrypted => "Decrypted",
            RepoKind::Branch => "Branch",
        }
    }
}

impl fmt::Display for RepoKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RepoKind {
    type Err = SdoError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "encrypted" => Ok(RepoKind::Encrypted),
            "decrypted" => Ok(RepoKind::Decrypted),
            "branch" => Ok(RepoKind::Branch),
            _ => Err(SdoError::Config(format!("Unknown repository type: {}", s))),
        }
    }
}

/// A GitHub `owner/name` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RepoName {
    owner: String,
    name: String,
}

impl RepoName {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self> {
        let owner = owner.into();
        let name = name.into();
        if !is_valid_segment(&owner) || !is_valid_segment(&name) {
            return Err(SdoError::InvalidRepository(format!("{}/{}", owner, name)));
        }
        Ok(Self { owner, name })
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn is_valid_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && segment
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

impl FromStr for RepoName {
    type Err = SdoError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().trim_end_matches('/');
        let s = s
            .strip_prefix("https://github.com/")
            .unwrap_or(s)
            .trim_end_matches(".git");

        match s.split_once('/') {
            Some((owner, name)) if !name.contains('/') => RepoName::new(owner, name),
            _ => Err(SdoError::InvalidRepository(s.to_string())),
        }
    }
}

impl TryFrom<String> for RepoName {
    type Error = SdoError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<RepoName> for String {
    fn from(value: RepoName) -> Self {
        value.to_string()
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// One configured repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub name: RepoName,
    #[serde(rename = "type")]
    pub kind: RepoKind,
    #[serde(default = "default_selected")]
    pub selected: bool,
}

fn default_selected() -> bool {
    true
}

impl Repository {
    pub fn new(name: RepoName, kind: RepoKind) -> Self {
        Self {
            name,
            kind,
            selected: true,
        }
    }
}

/// On-disk shapes of `repositories.json`.
#[derive(Deserialize)]
#[serde(untagged)]
enum RepositoryFile {
    List(Vec<Repository>),
    /// `{"owner/name": "Decrypted", ...}`, document order is priority order.
    Legacy(IndexMap<String, RepoKind>),
}

/// Ordered repository list; scan order is list order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct RepositoryList {
    repositories: Vec<Repository>,
}

impl RepositoryList {
    pub fn new(repositories: Vec<Repository>) -> Self {
        Self { repositories }
    }

    /// Parse either the list form or the legacy object form.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: RepositoryFile = serde_json::from_str(json)
            .map_err(|e| SdoError::Config(format!("Invalid repositories.json: {}", e)))?;
        Self::from_file(file)
    }

    fn from_file(file: RepositoryFile) -> Result<Self> {
        let repositories = match file {
            RepositoryFile::List(list) => list,
            RepositoryFile::Legacy(map) => map
                .into_iter()
                .map(|(name, kind)| Ok(Repository::new(name.parse()?, kind)))
                .collect::<Result<Vec<_>>>()?,
        };
        Ok(Self { repositories })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Repository> {
        self.repositories.iter()
    }

    /// Selected repositories, in priority order.
    pub fn selected(&self) -> Vec<Repository> {
        self.repositories.iter().filter(|r| r.selected).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.repositories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.repositories.is_empty()
    }

    pub fn get(&self, name: &RepoName) -> Option<&Repository> {
        self.repositories.iter().find(|r| &r.name == name)
    }

    /// Append a repository with lowest priority, or update the type of an
    /// existing one in place.
    pub fn add(&mut self, repository: Repository) {
        match self.repositories.iter_mut().find(|r| r.name == repository.name) {
            Some(existing) => existing.kind = repository.kind,
            None => self.repositories.push(repository),
        }
    }

    /// Remove a repository, returning whether it was present.
    pub fn remove(&mut self, name: &RepoName) -> bool {
        let before = self.repositories.len();
        self.repositories.retain(|r| &r.name != name);
        self.repositories.len() != before
    }

    /// Set the selection flag, returning whether the repository exists.
    pub fn set_selected(&mut self, name: &RepoName, selected: bool) -> bool {
        match self.repositories.iter_mut().find(|r| &r.name == name) {
            Some(repo) => {
                repo.selected = selected;
                true
            }
            None => false,
        }
    }

    /// Keep only the named repositories, preserving configured order.
    pub fn restricted_to(&self, names: &[RepoName]) -> Self {
        Self {
            repositories: self
                .repositories
                .iter()
                .filter(|r| names.contains(&r.name))
                .map(|r| Repository {
                    selected: true,
                    ..r.clone()
                })
                .collect(),
        }
    }
}

impl<'de> Deserialize<'de> for RepositoryList {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let file = RepositoryFile::deserialize(deserializer)?;
        Self::from_file(file).map_err(serde::de::Error::custom)
    }
}
