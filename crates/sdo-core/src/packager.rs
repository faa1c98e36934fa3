//! Final archive assembly.
//!
//! Archives are written to a temporary file in the output directory and
//! renamed into place, so a final archive never exists half-written.
//! Depot outcomes are assembled in a transient working directory which is
//! removed whether or not compression succeeds.

use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::config::RepoKind;
use crate::error::{Result, SdoError};
use crate::script::script_file_name;

/// Prefix of transient working directories inside the output directory.
pub const WORK_PREFIX: &str = ".sdo-work-";
/// Prefix of partially written archives inside the output directory.
pub const PART_PREFIX: &str = ".sdo-part-";

/// A file fetched from a repository, destined for the archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedFile {
    /// Path relative to the branch root.
    pub path: String,
    pub bytes: Vec<u8>,
}

/// The archive produced for one identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagedOutput {
    pub path: PathBuf,
    pub app_id: String,
    pub game_name: String,
}

pub struct Packager {
    output_dir: PathBuf,
}

impl Packager {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// `{GameName}-{Identifier}.zip`, marked `-encrypted` for Encrypted sources.
    pub fn archive_name(game_name: &str, app_id: &str, kind: RepoKind) -> String {
        let marker = if kind == RepoKind::Encrypted { "-encrypted" } else { "" };
        format!(
            "{}-{}{}.zip",
            sanitize_name(game_name),
            sanitize_name(app_id),
            marker
        )
    }

    /// Save a downloaded branch archive verbatim.
    pub fn package_archive(&self, game_name: &str, app_id: &str, bytes: &[u8]) -> Result<PackagedOutput> {
        let final_path = self
            .output_dir
            .join(Self::archive_name(game_name, app_id, RepoKind::Branch));

        self.write_atomically(&final_path, |file| {
            file.write_all(bytes)?;
            Ok(())
        })?;

        log::info!("Saved branch archive {}", final_path.display());
        Ok(PackagedOutput {
            path: final_path,
            app_id: app_id.to_string(),
            game_name: game_name.to_string(),
        })
    }

    /// Assemble the script and fetched files into the final archive.
    ///
    /// The script is written last and replaces a fetched file of the same name.
    pub fn package_depots(
        &self,
        game_name: &str,
        app_id: &str,
        kind: RepoKind,
        script: &str,
        files: &[FetchedFile],
    ) -> Result<PackagedOutput> {
        fs::create_dir_all(&self.output_dir)?;
        let final_path = self.output_dir.join(Self::archive_name(game_name, app_id, kind));

        let work = tempfile::Builder::new()
            .prefix(WORK_PREFIX)
            .tempdir_in(&self.output_dir)?;

        let result = assemble(work.path(), app_id, script, files)
            .and_then(|()| self.write_atomically(&final_path, |file| compress_dir(work.path(), file)));

        let work_path = work.path().to_path_buf();
        if let Err(e) = work.close() {
            log::warn!("Failed to remove working directory {}: {}", work_path.display(), e);
        }

        result?;
        log::info!("Packaged {} files into {}", files.len() + 1, final_path.display());

        Ok(PackagedOutput {
            path: final_path,
            app_id: app_id.to_string(),
            game_name: game_name.to_string(),
        })
    }

    /// Remove working directories and partial archives left by interrupted runs.
    pub fn cleanup_stale(&self) -> Result<usize> {
        if !self.output_dir.exists() {
            return Ok(0);
        }

        let mut removed = 0;
        for entry in fs::read_dir(&self.output_dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if !name.starts_with(WORK_PREFIX) && !name.starts_with(PART_PREFIX) {
                continue;
            }

            let path = entry.path();
            let outcome = if entry.file_type()?.is_dir() {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_file(&path)
            };
            match outcome {
                Ok(()) => {
                    log::debug!("Removed stale {}", path.display());
                    removed += 1;
                }
                Err(e) => log::warn!("Failed to remove {}: {}", path.display(), e),
            }
        }

        Ok(removed)
    }

    /// Write through a temporary file in the output directory, then rename.
    fn write_atomically<F>(&self, final_path: &Path, write: F) -> Result<()>
    where
        F: FnOnce(&mut File) -> Result<()>,
    {
        fs::create_dir_all(&self.output_dir)?;

        let mut temp = tempfile::Builder::new()
            .prefix(PART_PREFIX)
            .suffix(".zip")
            .tempfile_in(&self.output_dir)?;

        write(temp.as_file_mut())?;
        temp.as_file_mut().sync_all()?;

        temp.persist(final_path)
            .map_err(|e| SdoError::Packaging(format!("Failed to move archive into place: {}", e.error)))?;
        Ok(())
    }
}

/// Lay out fetched files and the script in the working directory.
fn assemble(work_dir: &Path, app_id: &str, script: &str, files: &[FetchedFile]) -> Result<()> {
    for file in files {
        let Some(relative) = safe_relative_path(&file.path) else {
            log::warn!("Skipping file with unsafe path: {}", file.path);
            continue;
        };

        let dest = work_dir.join(relative);
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&dest, &file.bytes)?;
    }

    fs::write(work_dir.join(script_file_name(app_id)), script)?;
    Ok(())
}

/// Zip every file under `dir`, in sorted path order.
fn compress_dir(dir: &Path, out: &mut File) -> Result<()> {
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| SdoError::Packaging(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(dir)
            .map_err(|e| SdoError::Packaging(e.to_string()))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/");

        zip.start_file(name, options)?;
        let mut contents = Vec::new();
        File::open(entry.path())?.read_to_end(&mut contents)?;
        zip.write_all(&contents)?;
    }

    zip.finish()?;
    Ok(())
}

/// Convert a remote `a/b/c` path into a relative path that cannot escape
/// the working directory.
fn safe_relative_path(path: &str) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for segment in path.split('/').filter(|s| !s.is_empty()) {
        if segment.contains('\\') || segment.contains(':') {
            return None;
        }
        let mut components = Path::new(segment).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(part)), None) => out.push(part),
            _ => return None,
        }
    }
    (!out.as_os_str().is_empty()).then_some(out)
}

/// Restrict a name to characters that are safe in file names everywhere.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !c.is_control() && !matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*'))
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim_matches(|c: char| c == '.' || c == ' ');

    if trimmed.is_empty() {
        "Unknown".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn unzip(path: &Path) -> BTreeMap<String, Vec<u8>> {
        let mut archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut out = BTreeMap::new();
        for i in 0..archive.len() {
            let mut file = archive.by_index(i).unwrap();
            let mut contents = Vec::new();
            file.read_to_end(&mut contents).unwrap();
            out.insert(file.name().to_string(), contents);
        }
        out
    }

    fn leftovers(dir: &Path) -> Vec<String> {
        fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|n| n.starts_with(WORK_PREFIX) || n.starts_with(PART_PREFIX))
            .collect()
    }

    fn file(path: &str, bytes: &[u8]) -> FetchedFile {
        FetchedFile {
            path: path.to_string(),
            bytes: bytes.to_vec(),
        }
    }

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("Half-Life: Alyx"), "Half-Life Alyx");
        assert_eq!(sanitize_name("A | B"), "A B");
        assert_eq!(sanitize_name("  spaced \t out  "), "spaced out");
        assert_eq!(sanitize_name("..hidden.."), "hidden");
        assert_eq!(sanitize_name("???"), "Unknown");
        assert_eq!(sanitize_name("Café ✓"), "Café ✓");
    }

    #[test]
    fn test_archive_name() {
        assert_eq!(Packager::archive_name("Game", "42", RepoKind::Decrypted), "Game-42.zip");
        assert_eq!(Packager::archive_name("Game", "42", RepoKind::Branch), "Game-42.zip");
        assert_eq!(
            Packager::archive_name("Game: X", "42", RepoKind::Encrypted),
            "Game X-42-encrypted.zip"
        );
    }

    #[test]
    fn test_safe_relative_path() {
        assert_eq!(safe_relative_path("a/b.manifest"), Some(PathBuf::from("a").join("b.manifest")));
        assert_eq!(safe_relative_path("a//b"), Some(PathBuf::from("a").join("b")));
        assert_eq!(safe_relative_path("../x"), None);
        assert_eq!(safe_relative_path("a/./x"), None);
        assert_eq!(safe_relative_path("a\\..\\x"), None);
        assert_eq!(safe_relative_path("C:x"), None);
        assert_eq!(safe_relative_path(""), None);
    }

    #[test]
    fn test_package_depots_round_trip() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path().join("Games"));
        let files = vec![
            file("100_1.manifest", b"m1"),
            file("sub/200_2.manifest", b"m2"),
        ];

        let output = packager
            .package_depots("Game", "42", RepoKind::Decrypted, "addappid(42)\n", &files)
            .unwrap();

        assert_eq!(output.path, out.path().join("Games").join("Game-42.zip"));
        let contents = unzip(&output.path);
        let names: Vec<&str> = contents.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["100_1.manifest", "42.lua", "sub/200_2.manifest"]);
        assert_eq!(contents["42.lua"], b"addappid(42)\n");
        assert_eq!(contents["sub/200_2.manifest"], b"m2");

        assert!(leftovers(packager.output_dir()).is_empty());
    }

    #[test]
    fn test_script_replaces_fetched_file_with_same_name() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path());
        let files = vec![file("42.lua", b"old")];

        let output = packager
            .package_depots("Game", "42", RepoKind::Decrypted, "new", &files)
            .unwrap();
        let contents = unzip(&output.path);
        assert_eq!(contents.len(), 1);
        assert_eq!(contents["42.lua"], b"new");
    }

    #[test]
    fn test_unsafe_paths_are_skipped() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path().join("Games"));
        let files = vec![file("../escape.manifest", b"x"), file("ok.manifest", b"y")];

        let output = packager
            .package_depots("Game", "1", RepoKind::Decrypted, "s", &files)
            .unwrap();
        let contents = unzip(&output.path);
        assert!(contents.contains_key("ok.manifest"));
        assert_eq!(contents.len(), 2);
        assert!(!out.path().join("escape.manifest").exists());
    }

    #[test]
    fn test_package_archive_is_verbatim() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path());

        let output = packager.package_archive("Game", "42", b"PK\x03\x04raw").unwrap();
        assert_eq!(fs::read(&output.path).unwrap(), b"PK\x03\x04raw");
        assert!(leftovers(out.path()).is_empty());
    }

    #[test]
    fn test_existing_archive_is_replaced() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path());

        packager.package_archive("Game", "42", b"first").unwrap();
        let output = packager.package_archive("Game", "42", b"second").unwrap();
        assert_eq!(fs::read(&output.path).unwrap(), b"second");
    }

    #[test]
    fn test_failure_leaves_no_archive_or_work_dir() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path());
        // A directory squatting on the final path makes the rename fail.
        fs::create_dir(out.path().join("Game-42.zip")).unwrap();
        fs::write(out.path().join("Game-42.zip").join("keep"), b"x").unwrap();

        let result = packager.package_depots("Game", "42", RepoKind::Decrypted, "s", &[]);
        assert!(result.is_err());
        assert!(out.path().join("Game-42.zip").is_dir());
        assert!(leftovers(out.path()).is_empty());
    }

    #[test]
    fn test_cleanup_stale() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path());
        fs::create_dir_all(out.path().join(format!("{}abc", WORK_PREFIX)).join("nested")).unwrap();
        fs::write(out.path().join(format!("{}x.zip", PART_PREFIX)), b"partial").unwrap();
        fs::write(out.path().join("Game-1.zip"), b"keep").unwrap();

        assert_eq!(packager.cleanup_stale().unwrap(), 2);
        assert!(leftovers(out.path()).is_empty());
        assert!(out.path().join("Game-1.zip").exists());
    }

    #[test]
    fn test_cleanup_missing_output_dir() {
        let out = TempDir::new().unwrap();
        let packager = Packager::new(out.path().join("absent"));
        assert_eq!(packager.cleanup_stale().unwrap(), 0);
    }
}
