use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::source::ConfigLoader;
use crate::http::HttpClientConfig;

/// User settings stored in `settings.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// GitHub personal access token; raises API quotas.
    pub github_token: Option<String>,

    /// Attach the token to requests.
    pub use_github_token: bool,

    /// Require a key/config file before accepting a repository.
    pub strict_validation: bool,

    /// Directory receiving the final archives.
    pub output_dir: PathBuf,

    /// Proxy URL for every request.
    pub proxy: Option<String>,

    /// Whole-request timeout in seconds.
    pub timeout_secs: u64,

    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,

    /// Retries after a failed attempt, not counting the first one.
    pub max_retries: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            github_token: None,
            use_github_token: false,
            strict_validation: true,
            output_dir: PathBuf::from("Games"),
            proxy: None,
            timeout_secs: 30,
            connect_timeout_secs: 10,
            max_retries: 3,
        }
    }
}

impl Settings {
    /// Apply `SDO_GITHUB_TOKEN`, `SDO_OUTPUT_DIR`, `SDO_STRICT` and `SDO_PROXY`.
    pub fn apply_env_overrides(&mut self, loader: &ConfigLoader) {
        if let Some(token) = loader.get_env("SDO_GITHUB_TOKEN") {
            self.github_token = Some(token);
            self.use_github_token = true;
        }

        if let Some(dir) = loader.get_env("SDO_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }

        if let Some(strict) = loader.get_env_bool("SDO_STRICT") {
            self.strict_validation = strict;
        }

        if let Some(proxy) = loader.get_env("SDO_PROXY") {
            self.proxy = Some(proxy);
        }
    }

    /// HTTP client settings: timeouts, retries, proxy and the active token.
    pub fn http_config(&self) -> HttpClientConfig {
        let mut config = HttpClientConfig::new()
            .with_timeout(Duration::from_secs(self.timeout_secs))
            .with_connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .with_max_retries(self.max_retries)
            .with_token(self.active_token().map(str::to_string));

        if let Some(proxy) = self.proxy.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            config = config.with_proxy(proxy.to_string());
        }
        config
    }

    /// The token to send, if one is configured and enabled.
    pub fn active_token(&self) -> Option<&str> {
        if !self.use_github_token {
            return None;
        }
        self.github_token
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.strict_validation);
        assert!(!settings.use_github_token);
        assert_eq!(settings.output_dir, PathBuf::from("Games"));
        assert_eq!(settings.active_token(), None);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let settings: Settings = serde_json::from_str(r#"{"strict_validation": false}"#).unwrap();
        assert!(!settings.strict_validation);
        assert_eq!(settings.output_dir, PathBuf::from("Games"));
    }

    #[test]
    fn test_active_token_requires_flag() {
        let mut settings = Settings {
            github_token: Some("ghp_abc".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.active_token(), None);

        settings.use_github_token = true;
        assert_eq!(settings.active_token(), Some("ghp_abc"));

        settings.github_token = Some("   ".to_string());
        assert_eq!(settings.active_token(), None);
    }

    #[test]
    fn test_http_config_follows_settings() {
        let settings: Settings = serde_json::from_str(
            r#"{
                "proxy": "http://proxy.local:3128",
                "timeout_secs": 90,
                "connect_timeout_secs": 4,
                "max_retries": 1,
                "github_token": "ghp_abc",
                "use_github_token": true
            }"#,
        )
        .unwrap();

        let config = settings.http_config();
        assert_eq!(config.proxy.as_deref(), Some("http://proxy.local:3128"));
        assert_eq!(config.timeout, Duration::from_secs(90));
        assert_eq!(config.connect_timeout, Duration::from_secs(4));
        assert_eq!(config.max_retries, 1);
        assert_eq!(config.token.as_deref(), Some("ghp_abc"));
    }

    #[test]
    fn test_http_config_defaults() {
        let config = Settings::default().http_config();
        assert_eq!(config.proxy, None);
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.token, None);

        let blank = Settings {
            proxy: Some("  ".to_string()),
            ..Settings::default()
        };
        assert_eq!(blank.http_config().proxy, None);
    }

    #[test]
    fn test_env_overrides_ignored_when_disabled() {
        let loader = ConfigLoader::new(false);
        let mut settings = Settings::default();
        settings.apply_env_overrides(&loader);
        assert_eq!(settings, Settings::default());
    }
}
