//! Log source reader.
//!
//! Logs live under `root/YYYY-MM-DD/*.log`. Every `.log` file directly in
//! the date directory is read (no recursion), in file-name order, and the
//! contents are joined with a single `\n`. A missing directory or one with
//! no matching files yields empty text; the orchestrator turns that (and
//! whitespace-only text) into a not-found failure.

use std::path::{Path, PathBuf};

use globset::{Glob, GlobMatcher};
use walkdir::WalkDir;

use crate::error::{DigestError, DigestResult};

/// Raw concatenated log text for one day.
#[derive(Debug, Clone, Default)]
pub struct LogText {
    pub text: String,
    pub files: Vec<PathBuf>,
}

impl LogText {
    /// True when there is nothing but whitespace to analyse.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.text.lines().count()
    }
}

/// Directory holding the logs (and the persisted report) for one date.
pub fn date_dir(root: &Path, date: &str) -> PathBuf {
    root.join(date)
}

/// Read and concatenate the logs for `date` under `root`.
///
/// Runs on the blocking pool; the walk and the reads are synchronous.
pub async fn read_logs(root: &Path, date: &str) -> DigestResult<LogText> {
    let dir = date_dir(root, date);
    let task_dir = dir.clone();
    tokio::task::spawn_blocking(move || read_logs_blocking(&task_dir))
        .await
        .map_err(|e| DigestError::LogRead {
            path: dir,
            source: std::io::Error::other(e),
        })?
}

fn log_matcher(dir: &Path) -> DigestResult<GlobMatcher> {
    Glob::new("*.log")
        .map(|g| g.compile_matcher())
        .map_err(|e| DigestError::LogRead {
            path: dir.to_path_buf(),
            source: std::io::Error::other(e),
        })
}

fn read_logs_blocking(dir: &Path) -> DigestResult<LogText> {
    if !dir.is_dir() {
        return Ok(LogText::default());
    }

    let matcher = log_matcher(dir)?;
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| DigestError::LogRead {
            path: dir.to_path_buf(),
            source: e.into(),
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if matcher.is_match(entry.file_name()) {
            files.push(entry.into_path());
        }
    }
    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));

    let mut parts = Vec::with_capacity(files.len());
    for path in &files {
        let bytes = std::fs::read(path).map_err(|source| DigestError::LogRead {
            path: path.clone(),
            source,
        })?;
        parts.push(String::from_utf8_lossy(&bytes).into_owned());
    }

    Ok(LogText {
        text: parts.join("\n"),
        files,
    })
}
