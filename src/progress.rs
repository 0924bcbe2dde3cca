//! Analysis progress reporting.
//!
//! A run streams [`RunEvent`]s: one [`RunEvent::Progress`] before each
//! stage starts, then exactly one terminal event. Only
//! [`RunEvent::Completed`] carries a report, so consumers never have to
//! check an optional payload on ordinary progress events.
//!
//! The CLI renders progress on **stderr** so stdout stays parseable.

use std::io::Write;

use crate::error::DigestError;
use crate::models::AnalysisResult;

/// Number of stage slots a run reports against, whatever the chunk count.
pub const TOTAL_STAGES: usize = 6;

/// Pipeline stage, in execution order.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Stage {
    Reading,
    Sanitizing,
    Chunking,
    Summarizing,
    Merging,
    Complete,
}

impl Stage {
    /// Zero-based slot index. All summarize events share index 3.
    pub fn index(&self) -> usize {
        match self {
            Stage::Reading => 0,
            Stage::Sanitizing => 1,
            Stage::Chunking => 2,
            Stage::Summarizing => 3,
            Stage::Merging => 4,
            Stage::Complete => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Reading => "reading",
            Stage::Sanitizing => "sanitizing",
            Stage::Chunking => "chunking",
            Stage::Summarizing => "summarizing",
            Stage::Merging => "merging",
            Stage::Complete => "complete",
        }
    }
}

/// One step of pipeline execution.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ProgressReport {
    pub stage: Stage,
    pub stage_index: usize,
    pub total_stages: usize,
    pub label: String,
}

impl ProgressReport {
    pub fn new(stage: Stage, label: impl Into<String>) -> Self {
        Self {
            stage,
            stage_index: stage.index(),
            total_stages: TOTAL_STAGES,
            label: label.into(),
        }
    }
}

/// An event on a run's progress stream.
#[derive(Debug)]
pub enum RunEvent {
    /// A stage is about to start.
    Progress(ProgressReport),
    /// The report was produced and persisted. Always the last event of a
    /// successful run.
    Completed {
        report: ProgressReport,
        result: AnalysisResult,
    },
    /// The run stopped with an error.
    Failed(DigestError),
    /// The caller cancelled the run. Nothing was persisted.
    Cancelled,
}

impl RunEvent {
    /// The progress payload, when the event has one.
    pub fn report(&self) -> Option<&ProgressReport> {
        match self {
            RunEvent::Progress(report) | RunEvent::Completed { report, .. } => Some(report),
            RunEvent::Failed(_) | RunEvent::Cancelled => None,
        }
    }
}

/// Renders progress for a user. Implementations write to stderr.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, report: &ProgressReport);
}

/// Human-friendly progress on stderr: "[4/6] summarizing  chunk 2/5".
pub struct StderrProgress;

impl ProgressReporter for StderrProgress {
    fn report(&self, report: &ProgressReport) {
        let line = format!(
            "[{}/{}] {:<12} {}\n",
            report.stage_index + 1,
            report.total_stages,
            report.stage.name(),
            report.label
        );
        let mut err = std::io::stderr().lock();
        let _ = err.write_all(line.as_bytes());
        let _ = err.flush();
    }
}

/// Machine-readable progress: one JSON object per line on stderr.
pub struct JsonProgress;

impl ProgressReporter for JsonProgress {
    fn report(&self, report: &ProgressReport) {
        let obj = serde_json::json!({
            "event": "progress",
            "stage": report.stage.name(),
            "index": report.stage_index,
            "total": report.total_stages,
            "label": report.label,
        });
        if let Ok(line) = serde_json::to_string(&obj) {
            let mut err = std::io::stderr().lock();
            let _ = writeln!(err, "{}", line);
            let _ = err.flush();
        }
    }
}

/// No-op reporter when progress is disabled.
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&self, _report: &ProgressReport) {}
}

/// Progress mode for the CLI: off, human (stderr), or JSON (stderr).
#[derive(Clone, Copy, Debug, Eq, PartialEq, clap::ValueEnum)]
pub enum ProgressMode {
    Off,
    Human,
    Json,
}

impl ProgressMode {
    /// Default: human progress when stderr is a TTY, otherwise off.
    pub fn default_for_tty() -> Self {
        if atty::is(atty::Stream::Stderr) {
            ProgressMode::Human
        } else {
            ProgressMode::Off
        }
    }

    pub fn reporter(&self) -> Box<dyn ProgressReporter> {
        match self {
            ProgressMode::Off => Box::new(NoProgress),
            ProgressMode::Human => Box::new(StderrProgress),
            ProgressMode::Json => Box::new(JsonProgress),
        }
    }
}
