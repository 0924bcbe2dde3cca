//! # Incident Digest
//!
//! Turns a day of raw application logs into a structured incident report:
//! overview, KPIs, top events, root-cause hypotheses and prioritized
//! actions.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────┐   ┌─────────┐   ┌────────────┐   ┌────────┐   ┌──────────────┐
//! │ *.log    │──▶│ Sanitize │──▶│  Chunk  │──▶│ Summarize  │──▶│ Merge  │──▶│ summary.json │
//! │ per date │   │ redact   │   │ by line │   │ per chunk  │   │ report │   │ per date     │
//! └──────────┘   └──────────┘   └─────────┘   └─────┬──────┘   └───┬────┘   └──────┬───────┘
//!                                                   └──── LLM ─────┘               │
//!                                                                     offline fallback
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! digest analyze --service checkout --env prod --date 2025-10-01
//! digest analyze --service checkout --env prod --date 2025-10-01 --dry-run
//! digest show --date 2025-10-01
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`pipeline`] | Orchestrator: stage sequencing, progress stream, cancellation |
//! | [`sanitize`] | Email, bearer-token and IPv4 redaction |
//! | [`chunk`] | Line-aligned text chunking |
//! | [`summarize`] | Per-chunk summaries and the final merge |
//! | [`provider`] | Language-model provider trait and HTTP client |
//! | [`models`] | Report types and lenient decoding |
//! | [`logs`] | Log source reader |
//! | [`store`] | Persisted reports and offline fallback |
//! | [`progress`] | Stage events and progress reporters |
//! | [`cancel`] | Cancellation token |
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Error taxonomy |

pub mod cancel;
pub mod chunk;
pub mod config;
pub mod error;
pub mod logs;
pub mod models;
pub mod pipeline;
pub mod progress;
pub mod provider;
pub mod sanitize;
pub mod store;
pub mod summarize;

pub use error::{DigestError, DigestResult};
