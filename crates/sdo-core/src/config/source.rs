use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::{Result, SdoError};

const REPOSITORIES_FILE: &str = "repositories.json";
const SETTINGS_FILE: &str = "settings.json";

/// Locates configuration files and reads `SDO_*` environment variables.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    use_environment: bool,
    home: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(use_environment: bool) -> Self {
        Self {
            use_environment,
            home: None,
        }
    }

    /// Pin the configuration home, bypassing `SDO_HOME` and platform lookup.
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    /// Get an `SDO_*` environment variable; empty values count as unset.
    pub fn get_env(&self, var: &str) -> Option<String> {
        if !self.use_environment {
            return None;
        }

        env::var(var).ok().filter(|s| !s.is_empty())
    }

    /// Get a boolean environment variable (`0`, `false`, `no`, `off` are false)
    pub fn get_env_bool(&self, var: &str) -> Option<bool> {
        self.get_env(var).map(|val| {
            !matches!(val.to_lowercase().as_str(), "0" | "false" | "no" | "off")
        })
    }

    /// Get the configuration home directory
    pub fn get_home(&self) -> PathBuf {
        if let Some(ref home) = self.home {
            return home.clone();
        }

        if let Some(home) = self.get_env("SDO_HOME") {
            return PathBuf::from(home);
        }

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "sdo") {
            proj_dirs.config_dir().to_path_buf()
        } else {
            PathBuf::from(".sdo")
        }
    }

    pub fn repositories_path(&self) -> PathBuf {
        self.get_home().join(REPOSITORIES_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.get_home().join(SETTINGS_FILE)
    }

    /// Load a JSON file, returning `None` when it does not exist.
    pub fn load_json<T: DeserializeOwned, P: AsRef<Path>>(&self, path: P) -> Result<Option<T>> {
        let path = path.as_ref();

        if !path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| SdoError::Config(format!("Failed to read {}: {}", path.display(), e)))?;

        let value = serde_json::from_str(&contents)
            .map_err(|e| SdoError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;

        Ok(Some(value))
    }

    /// Write a value as pretty JSON, creating the parent directory.
    pub fn save_json<T: serde::Serialize, P: AsRef<Path>>(&self, path: P, value: &T) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| SdoError::Config(format!("Failed to create directory: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(value)
            .map_err(|e| SdoError::Config(format!("Failed to serialize {}: {}", path.display(), e)))?;

        fs::write(path, json)
            .map_err(|e| SdoError::Config(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_disabled() {
        let loader = ConfigLoader::new(false);
        assert_eq!(loader.get_env("PATH"), None);
        assert_eq!(loader.get_env_bool("PATH"), None);
    }

    #[test]
    fn test_pinned_home() {
        let loader = ConfigLoader::new(true).with_home("/tmp/sdo-home");
        assert_eq!(loader.get_home(), PathBuf::from("/tmp/sdo-home"));
        assert_eq!(loader.repositories_path(), PathBuf::from("/tmp/sdo-home/repositories.json"));
        assert_eq!(loader.settings_path(), PathBuf::from("/tmp/sdo-home/settings.json"));
    }

    #[test]
    fn test_get_home_fallback() {
        let loader = ConfigLoader::new(false);
        let home = loader.get_home();
        assert!(home.is_absolute() || home.starts_with(".sdo"));
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::new(false);
        let value: Option<serde_json::Value> = loader.load_json(dir.path().join("nope.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        fs::write(&path, "{ not json").unwrap();

        let loader = ConfigLoader::new(false);
        let result: Result<Option<serde_json::Value>> = loader.load_json(&path);
        assert!(matches!(result, Err(SdoError::Config(_))));
    }
}
