//! Pattern-based redaction of PII and secrets.
//!
//! Three rules run over the full text in a fixed order:
//!
//! 1. email addresses → [`EMAIL_MARKER`]
//! 2. `Bearer <token>` (any casing, same line) → `Bearer` + [`TOKEN_MARKER`]
//! 3. dotted quads → [`IP_MARKER`]
//!
//! The IPv4 rule does not check octet ranges, so `999.1.2.3` is redacted
//! too. The markers themselves never match any rule, which makes
//! [`sanitize`] idempotent.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const EMAIL_MARKER: &str = "[EMAIL_REDACTED]";
pub const TOKEN_MARKER: &str = "[TOKEN_REDACTED]";
pub const IP_MARKER: &str = "[IP_REDACTED]";

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9.\-]+\.[A-Za-z]{2,}").expect("valid email regex")
});

static BEARER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(bearer)[ \t]+[A-Za-z0-9\-._~+/]+=*").expect("valid bearer regex")
});

static IPV4: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").expect("valid ipv4 regex")
});

/// How many substitutions each rule made.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionCounts {
    pub emails: usize,
    pub tokens: usize,
    pub ips: usize,
}

impl RedactionCounts {
    pub fn total(&self) -> usize {
        self.emails + self.tokens + self.ips
    }
}

/// Redact emails, bearer tokens and IPv4 addresses. Never fails.
pub fn sanitize(text: &str) -> String {
    sanitize_counted(text).0
}

/// Like [`sanitize`], also reporting how many matches each rule replaced.
pub fn sanitize_counted(text: &str) -> (String, RedactionCounts) {
    let mut counts = RedactionCounts::default();
    if text.trim().is_empty() {
        return (text.to_string(), counts);
    }

    let step = EMAIL.replace_all(text, |_: &Captures| {
        counts.emails += 1;
        EMAIL_MARKER
    });
    let step = replace_owned(&BEARER, step, |caps: &Captures| {
        counts.tokens += 1;
        format!("{} {}", &caps[1], TOKEN_MARKER)
    });
    let step = replace_owned(&IPV4, step, |_: &Captures| {
        counts.ips += 1;
        IP_MARKER.to_string()
    });

    (step.into_owned(), counts)
}

/// Apply a rule to the output of the previous one without copying when
/// nothing matched.
fn replace_owned<'a>(
    re: &Regex,
    input: Cow<'a, str>,
    rep: impl FnMut(&Captures) -> String,
) -> Cow<'a, str> {
    match input {
        Cow::Borrowed(s) => re.replace_all(s, rep),
        Cow::Owned(s) => Cow::Owned(re.replace_all(&s, rep).into_owned()),
    }
}
