//! Configuration management
//!
//! Two files live in the configuration home (`SDO_HOME`, or the platform
//! config directory):
//!
//! - `repositories.json`: the ordered repository list. Order is priority:
//!   the first repository that satisfies a request wins.
//! - `settings.json`: token, strict validation and output directory.
//!
//! Environment variables (`SDO_GITHUB_TOKEN`, `SDO_OUTPUT_DIR`,
//! `SDO_STRICT`) override `settings.json`.
//!
//! # Example
//!
//! ```rust,no_run
//! use sdo_core::config::{Config, ConfigLoader};
//!
//! let loader = ConfigLoader::new(true);
//! let config = Config::load(&loader).unwrap();
//!
//! for repo in config.repositories.selected() {
//!     println!("{} ({})", repo.name, repo.kind);
//! }
//! ```

mod repository;
mod settings;
mod source;

pub use repository::{RepoKind, RepoName, Repository, RepositoryList};
pub use settings::Settings;
pub use source::ConfigLoader;

use crate::error::Result;

/// Repository list plus settings, loaded together.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub repositories: RepositoryList,
    pub settings: Settings,
}

impl Config {
    /// Load both files; missing files yield defaults.
    pub fn load(loader: &ConfigLoader) -> Result<Self> {
        let repositories = loader
            .load_json::<RepositoryList, _>(loader.repositories_path())?
            .unwrap_or_default();

        let mut settings = loader
            .load_json::<Settings, _>(loader.settings_path())?
            .unwrap_or_default();
        settings.apply_env_overrides(loader);

        log::debug!(
            "Loaded {} repositories from {}",
            repositories.len(),
            loader.repositories_path().display()
        );

        Ok(Self {
            repositories,
            settings,
        })
    }

    pub fn save_repositories(&self, loader: &ConfigLoader) -> Result<()> {
        loader.save_json(loader.repositories_path(), &self.repositories)
    }

    pub fn save_settings(&self, loader: &ConfigLoader) -> Result<()> {
        loader.save_json(loader.settings_path(), &self.settings)
    }
}
