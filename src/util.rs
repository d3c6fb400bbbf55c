#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use tracing::warn;
use walkdir::{DirEntry, WalkDir};

/// File endings treated as C/C++ sources.
pub const CPP_FILE_ENDINGS: &[&str] = &["cpp", "hpp", "cu", "c", "cc", "h"];

/// Whether `entry` is the `.git` folder or one of the `excluded` folder names.
fn is_excluded_dir(entry: &DirEntry, excluded: &[&str]) -> bool {
    entry.file_type().is_dir()
        && entry.depth() > 0
        && entry
            .file_name()
            .to_str()
            .is_some_and(|name| name == ".git" || excluded.contains(&name))
}

/// Walks `root_dir` and returns every regular file, skipping `.git` and any
/// folder named in `excluded_dirs`. Paths are sorted for stable output.
pub fn walk_files(root_dir: &Path, excluded_dirs: &[&str]) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(root_dir)
        .into_iter()
        .filter_entry(|entry| !is_excluded_dir(entry, excluded_dirs))
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.into_path())
        .collect();
    files.sort();
    files
}

/// Like [`walk_files`], restricted to files whose extension is in
/// `extensions`.
pub fn find_files(root_dir: &Path, extensions: &[String], excluded_dirs: &[&str]) -> Vec<PathBuf> {
    walk_files(root_dir, excluded_dirs)
        .into_iter()
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|wanted| wanted == ext))
        })
        .collect()
}

/// Whether `path` carries one of the C/C++ file endings.
pub fn is_cpp(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| CPP_FILE_ENDINGS.contains(&ext))
}

/// Recursively copies `source` into `destination`, creating folders as
/// needed and overwriting existing files.
pub fn copy_dir_all(source: &Path, destination: &Path) -> Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.with_context(|| format!("Could not walk {}", source.display()))?;
        let relative = entry
            .path()
            .strip_prefix(source)
            .context("walkdir yielded a path outside of its root")?;
        let target = destination.join(relative);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&target)
                .with_context(|| format!("Could not create {}", target.display()))?;
        } else {
            fs::copy(entry.path(), &target).with_context(|| {
                format!("Could not copy {} to {}", entry.path().display(), target.display())
            })?;
        }
    }

    Ok(())
}

/// Decodes `bytes` as UTF-8, replacing invalid sequences instead of failing.
/// `what` names the content in the warning emitted on replacement.
pub fn decode_lossy(bytes: Vec<u8>, what: &str) -> String {
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(err) => {
            warn!("{what} is not valid UTF-8, replacing undecodable bytes");
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

/// Unix timestamp (UTC) of the first second of `date`.
pub fn start_of_day(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Unix timestamp (UTC) of the last second of `date`.
pub fn end_of_day(date: NaiveDate) -> i64 {
    start_of_day(date) + 24 * 60 * 60 - 1
}
