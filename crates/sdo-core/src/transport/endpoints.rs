use crate::config::RepoName;

const GITHUB_API: &str = "https://api.github.com";
const GITHUB_RAW: &str = "https://raw.githubusercontent.com";
const JSDELIVR_MIRRORS: &[&str] = &[
    "https://gcore.jsdelivr.net/gh",
    "https://fastly.jsdelivr.net/gh",
    "https://cdn.jsdelivr.net/gh",
];

/// URL layout for the three endpoint classes: tree listing, raw file
/// content and branch archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    /// GitHub REST API base.
    pub api_base: String,
    /// Primary raw content host, `{raw}/{owner}/{name}/{sha}/{path}`.
    pub raw_base: String,
    /// CDN fallbacks in order, `{cdn}/{owner}/{name}@{sha}/{path}`.
    pub cdn_bases: Vec<String>,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            api_base: GITHUB_API.to_string(),
            raw_base: GITHUB_RAW.to_string(),
            cdn_bases: JSDELIVR_MIRRORS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint class at one base URL.
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            api_base: base.to_string(),
            raw_base: format!("{}/raw", base),
            cdn_bases: vec![format!("{}/cdn", base)],
        }
    }

    pub fn branch(&self, repo: &RepoName, branch: &str) -> String {
        format!(
            "{}/repos/{}/{}/branches/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            urlencoding::encode(branch)
        )
    }

    pub fn tree(&self, repo: &RepoName, tree_sha: &str) -> String {
        format!(
            "{}/repos/{}/{}/git/trees/{}?recursive=1",
            self.api_base,
            repo.owner(),
            repo.name(),
            tree_sha
        )
    }

    pub fn zipball(&self, repo: &RepoName, branch: &str) -> String {
        format!(
            "{}/repos/{}/{}/zipball/{}",
            self.api_base,
            repo.owner(),
            repo.name(),
            urlencoding::encode(branch)
        )
    }

    pub fn raw(&self, repo: &RepoName, sha: &str, path: &str) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.raw_base,
            repo.owner(),
            repo.name(),
            sha,
            encode_path(path)
        )
    }

    pub fn cdn(&self, repo: &RepoName, sha: &str, path: &str) -> Vec<String> {
        self.cdn_bases
            .iter()
            .map(|base| {
                format!(
                    "{}/{}/{}@{}/{}",
                    base,
                    repo.owner(),
                    repo.name(),
                    sha,
                    encode_path(path)
                )
            })
            .collect()
    }
}

/// Percent-encode each path segment, keeping the separators.
fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
