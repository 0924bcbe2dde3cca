//! Analysis orchestration.
//!
//! Runs one day of logs through the stages in order:
//!
//! ```text
//! read ─▶ sanitize ─▶ chunk ─▶ summarize ×N ─▶ merge ─▶ persist
//!  (0)      (1)        (2)        (3)          (4)     ─▶ complete (5)
//! ```
//!
//! A [`RunEvent::Progress`] is sent before each stage starts; every
//! summarize call shares index 3 and is labelled with its chunk number.
//! The stream ends with exactly one terminal event: `Completed` (the only
//! event carrying a report), `Failed`, or `Cancelled`.
//!
//! Per-run state (the partial-summary buffer) lives in a [`RunContext`]
//! created for each run, so one [`Analyzer`] can serve concurrent runs.
//! Chunks are still summarized strictly one after another within a run.
//!
//! Cancellation is checked between stages and raced against reading and
//! every provider call. It is checked once more right before the report is
//! saved; the save is never interrupted. A cancelled run persists nothing
//! and ends with [`RunEvent::Cancelled`] rather than a failure.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::Instrument;
use uuid::Uuid;

use crate::cancel::CancelToken;
use crate::chunk::chunk_text;
use crate::config::Config;
use crate::error::{require_date, require_non_blank, DigestError, DigestResult};
use crate::logs::read_logs;
use crate::models::{AnalysisResult, PartialSummary};
use crate::progress::{ProgressReport, ProgressReporter, RunEvent, Stage};
use crate::provider::ChatProvider;
use crate::sanitize::{sanitize_counted, RedactionCounts};
use crate::store;
use crate::summarize::{ContextHeader, Summarizer};

/// Capacity of a run's event channel.
const EVENT_BUFFER: usize = 32;

/// What to analyse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub service: String,
    pub environment: String,
    pub date: String,
    /// Overrides the analyzer's default logs root for this run.
    pub logs_root: Option<PathBuf>,
}

impl AnalysisRequest {
    pub fn new(
        service: impl Into<String>,
        environment: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
            date: date.into(),
            logs_root: None,
        }
    }

    pub fn with_logs_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.logs_root = Some(root.into());
        self
    }

    /// Entry validation; runs before any stage and performs no I/O.
    pub fn validate(&self) -> DigestResult<()> {
        require_non_blank("service", &self.service)?;
        require_non_blank("environment", &self.environment)?;
        require_date(&self.date)?;
        Ok(())
    }

    fn header(&self) -> ContextHeader {
        ContextHeader::new(&self.service, &self.environment, &self.date)
    }
}

/// State owned by a single run and dropped with it.
#[derive(Debug, Default)]
struct RunContext {
    partials: Vec<PartialSummary>,
}

/// Sequences the analysis stages for any number of runs.
#[derive(Clone)]
pub struct Analyzer {
    provider: Arc<dyn ChatProvider>,
    logs_root: PathBuf,
    max_chunk_chars: usize,
    temperature: f32,
}

impl Analyzer {
    pub fn new(provider: Arc<dyn ChatProvider>, config: &Config) -> Self {
        Self {
            provider,
            logs_root: config.logs.root.clone(),
            max_chunk_chars: config.chunking.max_chars,
            temperature: config.provider.temperature,
        }
    }

    /// An analyzer with built-in defaults and the given logs root.
    pub fn with_root(provider: Arc<dyn ChatProvider>, logs_root: impl Into<PathBuf>) -> Self {
        let mut analyzer = Self::new(provider, &Config::minimal());
        analyzer.logs_root = logs_root.into();
        analyzer
    }

    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    fn root_for(&self, request: &AnalysisRequest) -> PathBuf {
        request
            .logs_root
            .clone()
            .unwrap_or_else(|| self.logs_root.clone())
    }

    /// Start a run on a background task and return its event stream.
    pub fn start(&self, request: AnalysisRequest, cancel: CancelToken) -> mpsc::Receiver<RunEvent> {
        let (tx, rx) = mpsc::channel(EVENT_BUFFER);
        let analyzer = self.clone();
        tokio::spawn(async move { analyzer.run(request, &cancel, &tx).await });
        rx
    }

    /// Drive one run on the current task, sending every event to `events`.
    ///
    /// If the receiver goes away the run stops at the next event, as if
    /// it had been cancelled.
    pub async fn run(
        &self,
        request: AnalysisRequest,
        cancel: &CancelToken,
        events: &mpsc::Sender<RunEvent>,
    ) {
        let span = tracing::info_span!(
            "analysis",
            run_id = %Uuid::new_v4(),
            service = %request.service,
            environment = %request.environment,
            date = %request.date,
        );

        let terminal = match self
            .execute(&request, cancel, events)
            .instrument(span.clone())
            .await
        {
            Ok(result) => RunEvent::Completed {
                report: ProgressReport::new(Stage::Complete, "analysis complete"),
                result,
            },
            Err(DigestError::Cancelled) => {
                span.in_scope(|| tracing::info!("analysis cancelled"));
                RunEvent::Cancelled
            }
            Err(e) => {
                span.in_scope(|| tracing::warn!(error = %e, "analysis failed"));
                RunEvent::Failed(e)
            }
        };
        let _ = events.send(terminal).await;
    }

    /// Run to completion, forwarding progress to `reporter`.
    ///
    /// A cancelled run returns [`DigestError::Cancelled`].
    pub async fn analyze(
        &self,
        request: AnalysisRequest,
        cancel: CancelToken,
        reporter: &dyn ProgressReporter,
    ) -> DigestResult<AnalysisResult> {
        let mut events = self.start(request, cancel);
        while let Some(event) = events.recv().await {
            match event {
                RunEvent::Progress(report) => reporter.report(&report),
                RunEvent::Completed { report, result } => {
                    reporter.report(&report);
                    return Ok(result);
                }
                RunEvent::Failed(e) => return Err(e),
                RunEvent::Cancelled => return Err(DigestError::Cancelled),
            }
        }
        Err(DigestError::Cancelled)
    }

    async fn execute(
        &self,
        request: &AnalysisRequest,
        cancel: &CancelToken,
        events: &mpsc::Sender<RunEvent>,
    ) -> DigestResult<AnalysisResult> {
        request.validate()?;
        let started = Instant::now();
        let header = request.header();
        let root = self.root_for(request);
        let date = request.date.as_str();
        let mut run = RunContext::default();

        emit(events, cancel, Stage::Reading, format!("reading logs for {}", date)).await?;
        let logs = cancel.guard(read_logs(&root, date)).await?;
        if logs.is_blank() {
            return Err(DigestError::NotFound {
                date: date.to_string(),
                root,
            });
        }
        tracing::info!(
            files = logs.files.len(),
            bytes = logs.text.len(),
            "read log files"
        );

        emit(events, cancel, Stage::Sanitizing, "redacting sensitive data").await?;
        let (sanitized, redactions) = sanitize_counted(&logs.text);
        drop(logs);
        tracing::info!(
            emails = redactions.emails,
            tokens = redactions.tokens,
            ips = redactions.ips,
            "sanitized logs"
        );

        emit(events, cancel, Stage::Chunking, "splitting logs into chunks").await?;
        let chunks: Vec<&str> = chunk_text(&sanitized, self.max_chunk_chars)?.collect();
        let total = chunks.len();
        tracing::info!(chunks = total, max_chars = self.max_chunk_chars, "chunked logs");

        let summarizer = Summarizer::new(self.provider.as_ref()).with_temperature(self.temperature);
        for (i, chunk) in chunks.iter().enumerate() {
            emit(
                events,
                cancel,
                Stage::Summarizing,
                format!("summarizing chunk {}/{}", i + 1, total),
            )
            .await?;
            let partial = cancel
                .guard(summarizer.summarize_chunk(&header, chunk))
                .await?;
            run.partials.push(partial);
            tracing::debug!(chunk = i + 1, model = self.provider.model_name(), "chunk summarized");
        }
        debug_assert_eq!(run.partials.len(), total);

        emit(
            events,
            cancel,
            Stage::Merging,
            format!("merging {} partial summaries", run.partials.len()),
        )
        .await?;
        let result = cancel.guard(summarizer.merge(&header, &run.partials)).await?;

        // Last point at which the run can stop. The save itself is not raced
        // against cancellation: once started it runs to completion.
        cancel.check()?;
        if events.is_closed() {
            return Err(DigestError::Cancelled);
        }
        store::save(&result, date, &root).await?;

        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            top_events = result.top_events.len(),
            actions = result.actions.len(),
            "analysis complete"
        );
        Ok(result)
    }
}

/// Send a progress event for `stage`, stopping the run if it was
/// cancelled or nobody is listening any more.
async fn emit(
    events: &mpsc::Sender<RunEvent>,
    cancel: &CancelToken,
    stage: Stage,
    label: impl Into<String>,
) -> DigestResult<()> {
    cancel.check()?;
    let report = ProgressReport::new(stage, label);
    tracing::debug!(stage = stage.name(), label = %report.label, "stage started");
    events
        .send(RunEvent::Progress(report))
        .await
        .map_err(|_| DigestError::Cancelled)
}

/// What a run would process, computed without calling the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preview {
    pub files: Vec<PathBuf>,
    pub lines: usize,
    pub chars: usize,
    pub chunks: usize,
    pub redactions: RedactionCounts,
}

/// Read, sanitize and chunk the logs for `date` without summarizing.
///
/// # Errors
///
/// [`DigestError::NotFound`] when there is no log text for the date.
pub async fn preview(root: &Path, date: &str, max_chunk_chars: usize) -> DigestResult<Preview> {
    require_date(date)?;
    let logs = read_logs(root, date).await?;
    if logs.is_blank() {
        return Err(DigestError::NotFound {
            date: date.to_string(),
            root: root.to_path_buf(),
        });
    }
    let lines = logs.line_count();
    let (sanitized, redactions) = sanitize_counted(&logs.text);
    let chunks = chunk_text(&sanitized, max_chunk_chars)?.count();
    Ok(Preview {
        files: logs.files,
        lines,
        chars: sanitized.chars().count(),
        chunks,
        redactions,
    })
}
