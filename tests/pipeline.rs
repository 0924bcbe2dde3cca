//! End-to-end tests for the analysis pipeline.
//!
//! These drive [`Analyzer`] against real log directories on disk with a
//! scripted provider standing in for the language model.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use incident_digest::cancel::CancelToken;
use incident_digest::pipeline::{AnalysisRequest, Analyzer};
use incident_digest::progress::{NoProgress, RunEvent, Stage, TOTAL_STAGES};
use incident_digest::provider::{ChatProvider, ChatRequest};
use incident_digest::sanitize::sanitize;
use incident_digest::summarize::{CHUNK_SCHEMA, FINAL_SCHEMA};
use incident_digest::{store, DigestError, DigestResult};
use tempfile::TempDir;
use tokio::sync::mpsc;

// ─── Scripted Provider ──────────────────────────────────────────────

type Script = dyn Fn(&ChatRequest) -> DigestResult<String> + Send + Sync;

/// Answers chunk and merge requests from closures and records every prompt.
struct ScriptedProvider {
    script: Box<Script>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(script: impl Fn(&ChatRequest) -> DigestResult<String> + Send + Sync + 'static) -> Self {
        Self {
            script: Box::new(script),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn counting() -> Self {
        Self::new(counting_reply)
    }

    fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatProvider for ScriptedProvider {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: &ChatRequest) -> DigestResult<String> {
        self.prompts
            .lock()
            .unwrap()
            .push(user_prompt(request).to_string());
        (self.script)(request)
    }
}

/// Cancels the run from inside the first provider call, then hangs.
struct CancellingProvider {
    token: CancelToken,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatProvider for CancellingProvider {
    fn model_name(&self) -> &str {
        "cancelling"
    }

    async fn complete(&self, _request: &ChatRequest) -> DigestResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok("{}".to_string())
    }
}

/// Chunk calls get a small partial; merge calls report how many partials
/// they were given in `overview`.
fn counting_reply(request: &ChatRequest) -> DigestResult<String> {
    if is_merge(request) {
        let partials = user_prompt(request).matches("--- CHUNK ").count();
        Ok(format!(
            r#"{{"overview":"merged {}","kpis":{{"totalLines":{}}},
               "topEvents":[{{"type":"Timeout","count":2,"examples":["[IP_REDACTED] timed out"]}}],
               "actions":[{{"priority":"High","title":"Raise timeout","why":"spikes","ownerHint":"api"}}]}}"#,
            partials, partials
        ))
    } else {
        Ok(r#"{"lines": 1, "errors": 0}"#.to_string())
    }
}

fn user_prompt(request: &ChatRequest) -> &str {
    &request.messages[1].content
}

fn is_merge(request: &ChatRequest) -> bool {
    user_prompt(request).contains(FINAL_SCHEMA)
}

// ─── Helpers ────────────────────────────────────────────────────────

fn write_logs(root: &Path, date: &str, files: &[(&str, &str)]) {
    let dir = root.join(date);
    std::fs::create_dir_all(&dir).unwrap();
    for (name, body) in files {
        std::fs::write(dir.join(name), body).unwrap();
    }
}

/// Lines of identical width, before and after redaction.
fn sample_logs(lines: usize) -> String {
    (0..lines)
        .map(|i| {
            format!(
                "2025-10-01T09:{:02}:00Z [ERROR] user{:03}@example.com call to 10.0.{:03}.1 failed with Bearer tok{:03}==\n",
                i % 60,
                i,
                i % 256,
                i
            )
        })
        .collect()
}

/// Width of one sanitized sample line, newline included.
fn sanitized_line_len() -> usize {
    sanitize(&sample_logs(1)).chars().count()
}

async fn collect_events(
    analyzer: &Analyzer,
    request: AnalysisRequest,
    cancel: CancelToken,
) -> Vec<RunEvent> {
    let mut rx = analyzer.start(request, cancel);
    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events
}

fn stage_indices(events: &[RunEvent]) -> Vec<usize> {
    events
        .iter()
        .filter_map(|e| e.report().map(|r| r.stage_index))
        .collect()
}

// ─── Tests ──────────────────────────────────────────────────────────

#[tokio::test]
async fn progress_follows_stage_order_and_only_completion_has_result() {
    let tmp = TempDir::new().unwrap();
    let logs = sample_logs(30);
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &logs)]);

    let provider = Arc::new(ScriptedProvider::counting());
    let line_len = sanitized_line_len();
    // Ten lines per chunk => three chunks.
    let analyzer =
        Analyzer::with_root(provider.clone(), tmp.path()).with_max_chunk_chars(line_len * 10);

    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-10-01"),
        CancelToken::new(),
    )
    .await;

    assert_eq!(stage_indices(&events), vec![0, 1, 2, 3, 3, 3, 4, 5]);
    for event in &events {
        if let Some(report) = event.report() {
            assert_eq!(report.total_stages, TOTAL_STAGES);
        }
    }

    let labels: Vec<&str> = events
        .iter()
        .filter_map(|e| e.report())
        .filter(|r| r.stage == Stage::Summarizing)
        .map(|r| r.label.as_str())
        .collect();
    assert_eq!(
        labels,
        vec![
            "summarizing chunk 1/3",
            "summarizing chunk 2/3",
            "summarizing chunk 3/3"
        ]
    );

    let (last, rest) = events.split_last().unwrap();
    assert!(rest.iter().all(|e| matches!(e, RunEvent::Progress(_))));
    let result = match last {
        RunEvent::Completed { result, .. } => result.clone(),
        other => panic!("expected completion, got {:?}", other),
    };

    assert_eq!(result.overview, "merged 3");
    assert_eq!(result.date, "2025-10-01");
    assert_eq!(provider.calls(), 4);

    let persisted = store::load("2025-10-01", tmp.path()).await.unwrap();
    assert_eq!(persisted, Some(result));
}

#[tokio::test]
async fn provider_only_sees_sanitized_text() {
    let tmp = TempDir::new().unwrap();
    write_logs(
        tmp.path(),
        "2025-10-01",
        &[(
            "app.log",
            "2025-10-01 [ERROR] a@b.com failed from 10.0.0.5 with Bearer abc123==",
        )],
    );
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();

    let prompts = provider.prompts();
    assert!(prompts[0].contains(CHUNK_SCHEMA));
    assert!(prompts[0].contains(
        "2025-10-01 [ERROR] [EMAIL_REDACTED] failed from [IP_REDACTED] with Bearer [TOKEN_REDACTED]"
    ));
    for prompt in &prompts {
        assert!(!prompt.contains("a@b.com"));
        assert!(!prompt.contains("10.0.0.5"));
        assert!(!prompt.contains("abc123"));
    }
}

#[tokio::test]
async fn log_files_are_read_in_name_order() {
    let tmp = TempDir::new().unwrap();
    write_logs(
        tmp.path(),
        "2025-10-01",
        &[("b.log", "second file"), ("a.log", "first file")],
    );
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());
    analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();
    assert!(provider.prompts()[0].ends_with("first file\nsecond file"));
}

#[tokio::test]
async fn empty_day_fails_not_found_before_any_provider_call() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-12-31"),
        CancelToken::new(),
    )
    .await;

    assert_eq!(stage_indices(&events), vec![0]);
    assert!(matches!(
        events.last(),
        Some(RunEvent::Failed(DigestError::NotFound { .. }))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn whitespace_only_logs_are_not_found() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("a.log", "\n\n"), ("b.log", "  \t\n")]);
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-10-01"),
        CancelToken::new(),
    )
    .await;

    assert_eq!(stage_indices(&events), vec![0]);
    assert!(matches!(
        events.last(),
        Some(RunEvent::Failed(DigestError::NotFound { .. }))
    ));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn invalid_request_fails_without_any_stage() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    for request in [
        AnalysisRequest::new("", "prod", "2025-10-01"),
        AnalysisRequest::new("checkout", "", "2025-10-01"),
        AnalysisRequest::new("checkout", "prod", "  "),
    ] {
        let events = collect_events(&analyzer, request, CancelToken::new()).await;
        assert_eq!(events.len(), 1);
        assert!(matches!(
            events[0],
            RunEvent::Failed(DigestError::Validation(_))
        ));
    }
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn unparseable_chunk_response_fails_and_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &sample_logs(5))]);
    let provider = Arc::new(ScriptedProvider::new(|_| {
        Ok("I could not find any errors.".to_string())
    }));
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let err = analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DigestError::ProviderResponse { stage: "chunk", .. }
    ));
    assert_eq!(provider.calls(), 1);
    assert_eq!(store::load("2025-10-01", tmp.path()).await.unwrap(), None);
}

#[tokio::test]
async fn transport_failure_is_surfaced_unchanged() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &sample_logs(5))]);
    let provider = Arc::new(ScriptedProvider::new(|request| {
        if is_merge(request) {
            Err(DigestError::ProviderTransport {
                status: Some(502),
                message: "bad gateway".to_string(),
            })
        } else {
            Ok("{}".to_string())
        }
    }));
    let analyzer = Analyzer::with_root(provider, tmp.path());

    let err = analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(store::load("2025-10-01", tmp.path()).await.unwrap(), None);
}

#[tokio::test]
async fn cancellation_during_summarize_stops_the_run() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &sample_logs(20))]);

    let cancel = CancelToken::new();
    let provider = Arc::new(CancellingProvider {
        token: cancel.clone(),
        calls: AtomicUsize::new(0),
    });
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path()).with_max_chunk_chars(200);

    let events = tokio::time::timeout(
        Duration::from_secs(10),
        collect_events(
            &analyzer,
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            cancel,
        ),
    )
    .await
    .expect("cancelled run should finish promptly");

    assert_eq!(stage_indices(&events), vec![0, 1, 2, 3]);
    assert!(matches!(events.last(), Some(RunEvent::Cancelled)));
    assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
    assert_eq!(store::load("2025-10-01", tmp.path()).await.unwrap(), None);
}

#[tokio::test]
async fn cancellation_during_merge_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &sample_logs(5))]);

    let cancel = CancelToken::new();
    let on_merge = cancel.clone();
    // The merge answer arrives, but the caller cancelled while waiting for it.
    let provider = Arc::new(ScriptedProvider::new(move |request| {
        if is_merge(request) {
            on_merge.cancel();
        }
        counting_reply(request)
    }));
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-10-01"),
        cancel,
    )
    .await;

    assert_eq!(stage_indices(&events), vec![0, 1, 2, 3, 4]);
    assert!(matches!(events.last(), Some(RunEvent::Cancelled)));
    assert_eq!(store::load("2025-10-01", tmp.path()).await.unwrap(), None);
    let day = tmp.path().join("2025-10-01");
    assert!(!day.join("summary.json.tmp").exists());
}

#[tokio::test]
async fn dropped_receiver_during_merge_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &sample_logs(5))]);

    let (tx, rx) = mpsc::channel(64);
    let receiver = Mutex::new(Some(rx));
    let provider = Arc::new(ScriptedProvider::new(move |request| {
        if is_merge(request) {
            drop(receiver.lock().unwrap().take());
        }
        counting_reply(request)
    }));
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    analyzer
        .run(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            &CancelToken::new(),
            &tx,
        )
        .await;

    assert_eq!(provider.calls(), 2);
    assert_eq!(store::load("2025-10-01", tmp.path()).await.unwrap(), None);
}

#[tokio::test]
async fn cancelled_before_start_emits_nothing_but_cancelled() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", "line\n")]);
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let cancel = CancelToken::new();
    cancel.cancel();
    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-10-01"),
        cancel,
    )
    .await;

    assert_eq!(events.len(), 1);
    assert!(matches!(events[0], RunEvent::Cancelled));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn persistence_failure_fails_the_run() {
    let tmp = TempDir::new().unwrap();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", "line\n")]);
    // A directory where the report file should go makes the final rename fail.
    std::fs::create_dir_all(tmp.path().join("2025-10-01").join("summary.json")).unwrap();

    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());
    let events = collect_events(
        &analyzer,
        AnalysisRequest::new("checkout", "prod", "2025-10-01"),
        CancelToken::new(),
    )
    .await;

    assert_eq!(stage_indices(&events), vec![0, 1, 2, 3, 4]);
    assert!(matches!(
        events.last(),
        Some(RunEvent::Failed(DigestError::Persistence { .. }))
    ));
}

#[tokio::test]
async fn concurrent_runs_keep_their_partials_apart() {
    let tmp = TempDir::new().unwrap();
    let logs = sample_logs(40);
    let line_len = sanitized_line_len();
    write_logs(tmp.path(), "2025-10-01", &[("app.log", &logs)]);
    write_logs(tmp.path(), "2025-10-02", &[("app.log", &sample_logs(10))]);

    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer =
        Analyzer::with_root(provider.clone(), tmp.path()).with_max_chunk_chars(line_len * 10);

    let (a, b) = tokio::join!(
        analyzer.analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        ),
        analyzer.analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-02"),
            CancelToken::new(),
            &NoProgress,
        ),
    );

    let (a, b) = (a.unwrap(), b.unwrap());
    assert_eq!(a.overview, "merged 4");
    assert_eq!(a.date, "2025-10-01");
    assert_eq!(b.overview, "merged 1");
    assert_eq!(b.date, "2025-10-02");
}

#[tokio::test]
async fn analyzer_is_reusable_after_a_failure() {
    let tmp = TempDir::new().unwrap();
    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider.clone(), tmp.path());

    let first = analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await;
    assert!(matches!(first, Err(DigestError::NotFound { .. })));

    write_logs(tmp.path(), "2025-10-01", &[("app.log", "now there are logs\n")]);
    let second = analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01"),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();
    assert_eq!(second.overview, "merged 1");
}

#[tokio::test]
async fn per_request_root_overrides_default() {
    let default_root = TempDir::new().unwrap();
    let other_root = TempDir::new().unwrap();
    write_logs(other_root.path(), "2025-10-01", &[("app.log", "elsewhere\n")]);

    let provider = Arc::new(ScriptedProvider::counting());
    let analyzer = Analyzer::with_root(provider, default_root.path());
    analyzer
        .analyze(
            AnalysisRequest::new("checkout", "prod", "2025-10-01").with_logs_root(other_root.path()),
            CancelToken::new(),
            &NoProgress,
        )
        .await
        .unwrap();

    assert!(store::load("2025-10-01", other_root.path())
        .await
        .unwrap()
        .is_some());
    assert!(store::load("2025-10-01", default_root.path())
        .await
        .unwrap()
        .is_none());
}
