//! Branch tree listing and lookup of key/config and manifest files.

use serde::Deserialize;

use crate::config::RepoName;
use crate::depot::is_manifest_name;
use crate::error::FetchError;
use crate::transport::Remote;

/// Key file names in priority order; matched case-insensitively.
pub const KEY_FILE_NAMES: &[&str] = &["key.vdf", "config.vdf"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
}

/// One entry of a branch tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTreeEntry {
    /// Full path within the branch.
    pub path: String,
    /// Last path segment.
    pub name: String,
    pub kind: EntryKind,
}

impl RemoteTreeEntry {
    pub fn new(path: impl Into<String>, kind: EntryKind) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self { path, name, kind }
    }

    pub fn is_file(&self) -> bool {
        self.kind == EntryKind::File
    }

    pub fn depth(&self) -> usize {
        self.path.matches('/').count()
    }

    /// Whether this is a key/config file (`key.vdf` or `config.vdf`).
    pub fn is_key_file(&self) -> bool {
        self.is_file() && KEY_FILE_NAMES.iter().any(|n| self.name.eq_ignore_ascii_case(n))
    }

    pub fn is_manifest(&self) -> bool {
        self.is_file() && is_manifest_name(&self.name)
    }
}

/// The file listing of one branch of one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTree {
    pub repo: RepoName,
    pub branch: String,
    /// Commit the listing was taken from; file fetches pin to it.
    pub commit_sha: String,
    /// Author date of the branch head, as reported by the API.
    pub updated_at: Option<String>,
    pub entries: Vec<RemoteTreeEntry>,
    /// The remote listing was incomplete. Absence of a file is then
    /// inconclusive.
    pub truncated: bool,
}

impl RemoteTree {
    pub fn files(&self) -> impl Iterator<Item = &RemoteTreeEntry> {
        self.entries.iter().filter(|e| e.is_file())
    }

    /// Locate the key/config file anywhere in the tree.
    ///
    /// `key.vdf` wins over `config.vdf`. Among files with the same name the
    /// shallowest wins, then the lexically smallest path.
    pub fn find_key_file(&self) -> Option<&RemoteTreeEntry> {
        KEY_FILE_NAMES.iter().find_map(|wanted| {
            self.files()
                .filter(|e| e.name.eq_ignore_ascii_case(wanted))
                .min_by(|a, b| a.depth().cmp(&b.depth()).then_with(|| a.path.cmp(&b.path)))
        })
    }

    /// Manifest files at any depth.
    pub fn manifests(&self) -> impl Iterator<Item = &RemoteTreeEntry> {
        self.entries.iter().filter(|e| e.is_manifest())
    }
}

#[derive(Deserialize)]
struct BranchResponse {
    commit: BranchCommit,
}

#[derive(Deserialize)]
struct BranchCommit {
    sha: String,
    commit: CommitDetail,
}

#[derive(Deserialize)]
struct CommitDetail {
    tree: TreeRef,
    #[serde(default)]
    author: Option<CommitAuthor>,
}

#[derive(Deserialize)]
struct TreeRef {
    sha: String,
}

#[derive(Deserialize)]
struct CommitAuthor {
    #[serde(default)]
    date: Option<String>,
}

#[derive(Deserialize)]
struct TreeResponse {
    tree: Vec<TreeItem>,
    #[serde(default)]
    truncated: bool,
}

#[derive(Deserialize)]
struct TreeItem {
    path: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Resolves a branch to its full recursive tree listing.
pub struct TreeLocator<'a> {
    remote: &'a Remote,
}

impl<'a> TreeLocator<'a> {
    pub fn new(remote: &'a Remote) -> Self {
        Self { remote }
    }

    /// List every entry of `branch` in `repo`.
    ///
    /// A missing branch is `NotFound`. Unparsable API responses are
    /// `Malformed`.
    pub async fn list_branch(&self, repo: &RepoName, branch: &str) -> Result<RemoteTree, FetchError> {
        let endpoints = self.remote.endpoints();

        let branch_url = endpoints.branch(repo, branch);
        let body = self.remote.api(&branch_url).await?;
        let head: BranchResponse = parse_json(&branch_url, &body)?;

        let tree_url = endpoints.tree(repo, &head.commit.commit.tree.sha);
        let body = self.remote.api(&tree_url).await?;
        let listing: TreeResponse = parse_json(&tree_url, &body)?;

        let entries: Vec<RemoteTreeEntry> = listing
            .tree
            .into_iter()
            .filter_map(|item| {
                let kind = match item.kind.as_str() {
                    "blob" => EntryKind::File,
                    "tree" => EntryKind::Dir,
                    // submodule commits carry no content
                    _ => return None,
                };
                Some(RemoteTreeEntry::new(item.path, kind))
            })
            .collect();

        log::debug!(
            "{}@{}: {} entries{}",
            repo,
            branch,
            entries.len(),
            if listing.truncated { " (truncated)" } else { "" }
        );

        Ok(RemoteTree {
            repo: repo.clone(),
            branch: branch.to_string(),
            commit_sha: head.commit.sha,
            updated_at: head.commit.commit.author.and_then(|a| a.date),
            entries,
            truncated: listing.truncated,
        })
    }
}

fn parse_json<T: serde::de::DeserializeOwned>(url: &str, body: &[u8]) -> Result<T, FetchError> {
    serde_json::from_slice(body).map_err(|e| FetchError::Malformed {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
