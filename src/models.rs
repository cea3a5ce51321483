use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Timeout,
    Connect,
    InvalidUrl,
    Request,
}

/// Classification of a single probe. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ProbeOutcome {
    Healthy,
    UnexpectedStatus { code: u16 },
    Unreachable { kind: FailureKind, detail: String },
}

impl ProbeOutcome {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ProbeOutcome::Healthy)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeResult {
    pub target: Target,
    pub outcome: ProbeOutcome,
    pub latency_ms: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn emoji(self) -> &'static str {
        match self {
            Severity::Info => "\u{2705}",
            Severity::Warning => "\u{26a0}\u{fe0f}",
            Severity::Critical => "\u{274c}",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub severity: Severity,
    pub target_name: String,
    pub detail: String,
    pub url: String,
}

impl AlertMessage {
    /// Builds the alert for a failed probe. Returns `None` for healthy results.
    pub fn from_result(result: &ProbeResult) -> Option<Self> {
        let (severity, detail) = match &result.outcome {
            ProbeOutcome::Healthy => return None,
            ProbeOutcome::UnexpectedStatus { code } => {
                (Severity::Warning, format!("responded with error {}", code))
            }
            ProbeOutcome::Unreachable { detail, .. } => (Severity::Critical, detail.clone()),
        };
        Some(Self {
            severity,
            target_name: result.target.name.clone(),
            detail,
            url: result.target.url.clone(),
        })
    }

    pub fn recovered(target: &Target) -> Self {
        Self {
            severity: Severity::Info,
            target_name: target.name.clone(),
            detail: "is healthy again".into(),
            url: target.url.clone(),
        }
    }

    /// Telegram Markdown rendering. The URL is kept verbatim so it stays copyable.
    pub fn render(&self) -> String {
        let name = escape_markdown(&self.target_name);
        let url = &self.url;
        match self.severity {
            Severity::Critical => format!(
                "{} *{}* is not responding.\nError: `{}`\nURL: {}",
                self.severity.emoji(),
                name,
                self.detail.replace('`', "'"),
                url
            ),
            _ => format!(
                "{} *{}* {}. URL: {}",
                self.severity.emoji(),
                name,
                escape_markdown(&self.detail),
                url
            ),
        }
    }
}

/// Escapes the characters legacy Telegram Markdown treats as entity markers.
pub fn escape_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(c, '_' | '*' | '`' | '[') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepTrigger {
    Startup,
    Timer,
    Manual,
}

impl fmt::Display for SweepTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SweepTrigger::Startup => write!(f, "startup"),
            SweepTrigger::Timer => write!(f, "timer"),
            SweepTrigger::Manual => write!(f, "manual"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweepReport {
    pub trigger: SweepTrigger,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub results: Vec<ProbeResult>,
    /// Alerts that reached the operator channel.
    pub alerts_sent: usize,
    pub skipped: bool,
}

impl SweepReport {
    pub fn skipped(trigger: SweepTrigger) -> Self {
        Self {
            trigger,
            started_at: Utc::now(),
            duration_ms: 0,
            results: Vec::new(),
            alerts_sent: 0,
            skipped: true,
        }
    }

    pub fn unhealthy_count(&self) -> usize {
        self.results.iter().filter(|r| !r.outcome.is_healthy()).count()
    }
}
