//! Chunk summarization and final merge.
//!
//! Both operations send one request to the [`ChatProvider`]: a system
//! message with the analyst persona and the JSON-only requirement, then a
//! user message made of the [`ContextHeader`], a schema description and
//! the payload (one chunk, or every partial summary).
//!
//! Chunk responses are only checked for being valid JSON and are kept as
//! opaque [`PartialSummary`] values. The merge response is decoded into an
//! [`AnalysisResult`] with lenient, case-insensitive field matching.

use crate::error::{require_non_blank, DigestError, DigestResult};
use crate::models::{AnalysisResult, PartialSummary};
use crate::provider::{ChatMessage, ChatProvider, ChatRequest};

pub const SYSTEM_PROMPT: &str = "You are a senior site reliability engineer analysing \
application logs for an incident review. Be factual and concise, never invent events \
that are not in the logs, and always answer with a single syntactically valid JSON \
object and nothing else.";

pub const CHUNK_SCHEMA: &str = r#"Return JSON with this shape:
{
  "lines": <number of log lines in this excerpt>,
  "errors": <number of ERROR lines>,
  "warnings": <number of WARN lines>,
  "events": [ { "type": "<short error or event type>", "count": <n>, "examples": ["<verbatim line>", "..."] } ],
  "notes": "<anything unusual: bursts, restarts, dependency failures>"
}"#;

pub const FINAL_SCHEMA: &str = r#"Combine the partial analyses into one report. Return JSON with this shape:
{
  "date": "YYYY-MM-DD",
  "overview": "<3-5 sentence summary of the day>",
  "kpis": { "totalLines": <n>, "errorCount": <n>, "warnCount": <n>, "uniqueErrorTypes": <n> },
  "topEvents": [ { "type": "<event type>", "count": <n>, "examples": ["<line>", "..."] } ],
  "rootCauses": [ { "errorType": "<event type>", "hypothesis": "<likely cause>" } ],
  "actions": [ { "priority": "high|medium|low", "title": "<action>", "why": "<reason>", "ownerHint": "<team or role>" } ]
}
Sum counts across partials, order topEvents by count descending and keep at most 10."#;

/// Temperature for both stages.
pub const DEFAULT_TEMPERATURE: f32 = 0.2;

/// Which service, environment and day a request is about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextHeader {
    pub service: String,
    pub environment: String,
    pub date: String,
}

impl ContextHeader {
    pub fn new(
        service: impl Into<String>,
        environment: impl Into<String>,
        date: impl Into<String>,
    ) -> Self {
        Self {
            service: service.into(),
            environment: environment.into(),
            date: date.into(),
        }
    }

    pub fn render(&self) -> String {
        format!(
            "Service: {}\nDate: {}\nEnvironment: {}",
            self.service, self.date, self.environment
        )
    }
}

/// Summarizes chunks and merges partials through one provider.
pub struct Summarizer<'a> {
    provider: &'a dyn ChatProvider,
    temperature: f32,
}

impl<'a> Summarizer<'a> {
    pub fn new(provider: &'a dyn ChatProvider) -> Self {
        Self {
            provider,
            temperature: DEFAULT_TEMPERATURE,
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    fn request(&self, user: String) -> ChatRequest {
        ChatRequest {
            messages: vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)],
            temperature: self.temperature,
            json_object: true,
        }
    }

    /// Summarize one chunk into an opaque partial result.
    ///
    /// # Errors
    ///
    /// - [`DigestError::Validation`] if the rendered header or the chunk is blank
    /// - [`DigestError::ProviderResponse`] if the answer is not valid JSON
    /// - any transport error from the provider
    pub async fn summarize_chunk(
        &self,
        header: &ContextHeader,
        chunk: &str,
    ) -> DigestResult<PartialSummary> {
        let rendered = render_checked(header)?;
        require_non_blank("chunk", chunk)?;

        let user = format!(
            "{}\n\n{}\n\nLog excerpt:\n{}",
            rendered, CHUNK_SCHEMA, chunk
        );
        let raw = self.provider.complete(&self.request(user)).await?;
        let value: serde_json::Value =
            serde_json::from_str(strip_code_fence(&raw)).map_err(DigestError::chunk_response)?;
        Ok(PartialSummary::new(value))
    }

    /// Merge every partial into the final report.
    ///
    /// The returned report's `date` is always the header date.
    ///
    /// # Errors
    ///
    /// - [`DigestError::MergePrecondition`] if `partials` is empty (no provider call is made)
    /// - [`DigestError::Validation`] if the header is blank
    /// - [`DigestError::ProviderResponse`] if the answer cannot be decoded as a report
    /// - any transport error from the provider
    pub async fn merge(
        &self,
        header: &ContextHeader,
        partials: &[PartialSummary],
    ) -> DigestResult<AnalysisResult> {
        if partials.is_empty() {
            return Err(DigestError::MergePrecondition);
        }
        let rendered = render_checked(header)?;

        let user = format!(
            "{}\n\n{}\n\nPartial analyses:{}",
            rendered,
            FINAL_SCHEMA,
            join_partials(partials)
        );
        let raw = self.provider.complete(&self.request(user)).await?;
        let value: serde_json::Value =
            serde_json::from_str(strip_code_fence(&raw)).map_err(DigestError::merge_response)?;
        if value.is_null() {
            return Err(DigestError::merge_response("provider returned null"));
        }

        let mut result = AnalysisResult::from_value(value).map_err(DigestError::merge_response)?;
        result.date = header.date.clone();
        Ok(result)
    }
}

fn render_checked(header: &ContextHeader) -> DigestResult<String> {
    require_non_blank("header.service", &header.service)?;
    require_non_blank("header.environment", &header.environment)?;
    require_non_blank("header.date", &header.date)?;
    Ok(header.render())
}

/// Partials separated by numbered markers so the merger can tell them apart.
fn join_partials(partials: &[PartialSummary]) -> String {
    partials
        .iter()
        .enumerate()
        .map(|(i, p)| format!("\n\n--- CHUNK {} ---\n{}", i + 1, p.to_json()))
        .collect()
}

/// Unwrap a Markdown code fence (```json ... ```) if the model added one.
fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return trimmed;
    };
    // Drop the info string (e.g. `json`) on the opening line.
    match body.find('\n') {
        Some(nl) => body[nl + 1..].trim(),
        None => body.trim(),
    }
}
