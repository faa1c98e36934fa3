/// Integration tests for the configuration files
///
/// These tests load and save `repositories.json` and `settings.json`
/// through a pinned configuration home.

use sdo_core::config::{Config, ConfigLoader, RepoKind, Repository};
use std::env;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

#[test]
fn test_missing_files_give_defaults() {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::new(false).with_home(temp_dir.path());

    let config = Config::load(&loader).unwrap();

    assert!(config.repositories.is_empty());
    assert!(config.settings.strict_validation);
    assert_eq!(config.settings.output_dir, PathBuf::from("Games"));
    assert_eq!(config.settings.active_token(), None);
}

#[test]
fn test_load_legacy_repositories_file() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("repositories.json"),
        r#"{
            "zeta/encrypted": "Encrypted",
            "alpha/decrypted": "Decrypted",
            "mid/branch": "Branch"
        }"#,
    )
    .unwrap();
    let loader = ConfigLoader::new(false).with_home(temp_dir.path());

    let config = Config::load(&loader).unwrap();

    let names: Vec<String> = config.repositories.iter().map(|r| r.name.to_string()).collect();
    assert_eq!(names, vec!["zeta/encrypted", "alpha/decrypted", "mid/branch"]);
    assert!(config.repositories.iter().all(|r| r.selected));
    assert_eq!(config.repositories.iter().nth(2).unwrap().kind, RepoKind::Branch);
}

#[test]
fn test_save_and_reload_repositories() {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::new(false).with_home(temp_dir.path().join("nested"));

    let mut config = Config::default();
    config
        .repositories
        .add(Repository::new("o/one".parse().unwrap(), RepoKind::Decrypted));
    config
        .repositories
        .add(Repository::new("o/two".parse().unwrap(), RepoKind::Encrypted));
    config.repositories.set_selected(&"o/one".parse().unwrap(), false);
    config.save_repositories(&loader).unwrap();

    let saved = fs::read_to_string(loader.repositories_path()).unwrap();
    assert!(saved.trim_start().starts_with('['));
    assert!(saved.contains(r#""type": "Encrypted""#));

    let reloaded = Config::load(&loader).unwrap();
    assert_eq!(reloaded.repositories, config.repositories);
    assert_eq!(reloaded.repositories.selected().len(), 1);
}

#[test]
fn test_save_and_reload_settings() {
    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::new(false).with_home(temp_dir.path());

    let mut config = Config::default();
    config.settings.github_token = Some("ghp_test".to_string());
    config.settings.use_github_token = true;
    config.settings.strict_validation = false;
    config.save_settings(&loader).unwrap();

    let reloaded = Config::load(&loader).unwrap();
    assert_eq!(reloaded.settings.active_token(), Some("ghp_test"));
    assert!(!reloaded.settings.strict_validation);
}

#[test]
fn test_malformed_repositories_file_is_an_error() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("repositories.json"), r#"{"not a repo": "Branch"}"#).unwrap();
    let loader = ConfigLoader::new(false).with_home(temp_dir.path());

    assert!(Config::load(&loader).is_err());
}

#[test]
fn test_environment_overrides_settings() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join("settings.json"),
        r#"{"strict_validation": true, "output_dir": "from-file"}"#,
    )
    .unwrap();

    env::set_var("SDO_OUTPUT_DIR", "/from/env");
    env::set_var("SDO_STRICT", "off");
    env::set_var("SDO_GITHUB_TOKEN", "ghp_env");

    let loader = ConfigLoader::new(true).with_home(temp_dir.path());
    let config = Config::load(&loader).unwrap();

    env::remove_var("SDO_OUTPUT_DIR");
    env::remove_var("SDO_STRICT");
    env::remove_var("SDO_GITHUB_TOKEN");

    assert_eq!(config.settings.output_dir, PathBuf::from("/from/env"));
    assert!(!config.settings.strict_validation);
    assert_eq!(config.settings.active_token(), Some("ghp_env"));
}
