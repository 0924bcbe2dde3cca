//! Persisted reports and the offline fallback.
//!
//! A finished report is written to `root/YYYY-MM-DD/summary.json`, next to
//! the logs it was built from. When the provider is unavailable, callers
//! read it back with [`load`] (or [`load_fallback`]) instead of running the
//! pipeline.
//!
//! Concurrent saves for the same date are not coordinated; the last
//! rename wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use crate::error::{require_date, DigestError, DigestResult};
use crate::logs::date_dir;
use crate::models::AnalysisResult;

pub const SUMMARY_FILE: &str = "summary.json";

/// Where the report for `date` lives under `root`.
pub fn summary_path(root: &Path, date: &str) -> PathBuf {
    date_dir(root, date).join(SUMMARY_FILE)
}

/// Write `result` as the report for `date`, replacing any previous one.
///
/// The JSON goes to a temporary file that is then renamed into place, so
/// an interrupted save never leaves a truncated report behind. The
/// temporary file is removed again if either step fails.
pub async fn save(result: &AnalysisResult, date: &str, root: &Path) -> DigestResult<PathBuf> {
    require_date(date)?;
    let dir = date_dir(root, date);
    let path = dir.join(SUMMARY_FILE);
    tokio::fs::create_dir_all(&dir)
        .await
        .map_err(persistence(&dir))?;

    let json = result.to_json_pretty().map_err(|e| DigestError::Persistence {
        path: path.clone(),
        source: std::io::Error::new(ErrorKind::InvalidData, e),
    })?;

    let tmp_path = path.with_extension("json.tmp");
    if let Err(e) = tokio::fs::write(&tmp_path, json).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(persistence(&tmp_path)(e));
    }
    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(persistence(&path)(e));
    }

    tracing::info!(path = %path.display(), "saved analysis report");
    Ok(path)
}

fn persistence(path: &Path) -> impl FnOnce(std::io::Error) -> DigestError {
    let path = path.to_path_buf();
    move |source| DigestError::Persistence { path, source }
}

/// Read the report for `date`, or `None` when none has been saved.
///
/// Key casing in the file does not matter. Any I/O error other than the
/// file not existing, and any decoding error, is returned.
pub async fn load(date: &str, root: &Path) -> DigestResult<Option<AnalysisResult>> {
    require_date(date)?;
    let path = summary_path(root, date);

    let text = match tokio::fs::read_to_string(&path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(source) => return Err(DigestError::Persistence { path, source }),
    };

    let result = AnalysisResult::from_json(&text).map_err(|e| DigestError::Persistence {
        path: path.clone(),
        source: std::io::Error::new(ErrorKind::InvalidData, e),
    })?;
    Ok(Some(result))
}

/// [`load`], with absence reported as [`DigestError::NoCachedReport`].
pub async fn load_fallback(date: &str, root: &Path) -> DigestResult<AnalysisResult> {
    load(date, root)
        .await?
        .ok_or_else(|| DigestError::NoCachedReport {
            date: date.to_string(),
        })
}
