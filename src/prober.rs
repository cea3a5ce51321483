use chrono::Utc;
use reqwest::{redirect, StatusCode, Url};
use std::error::Error as StdError;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::models::{FailureKind, ProbeOutcome, ProbeResult, Target};

pub struct Prober {
    client: reqwest::Client,
    timeout: Duration,
}

impl Prober {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(redirect::Policy::none())
            .user_agent(concat!("sentinel/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, timeout })
    }

    /// Single GET against the target. Every failure mode is folded into the outcome.
    pub async fn check(&self, target: &Target) -> ProbeResult {
        let timestamp = Utc::now();

        let (outcome, latency_ms) = match parse_target_url(&target.url) {
            Err(detail) => (
                ProbeOutcome::Unreachable {
                    kind: FailureKind::InvalidUrl,
                    detail,
                },
                None,
            ),
            Ok(url) => {
                let start = Instant::now();
                match self.client.get(url).send().await {
                    Ok(resp) => {
                        let latency = start.elapsed().as_secs_f64() * 1000.0;
                        let status = resp.status();
                        let outcome = if status == StatusCode::OK {
                            ProbeOutcome::Healthy
                        } else {
                            ProbeOutcome::UnexpectedStatus { code: status.as_u16() }
                        };
                        (outcome, Some(latency))
                    }
                    Err(e) => (self.classify(&e), None),
                }
            }
        };

        debug!(target_name = %target.name, outcome = ?outcome, "probe finished");

        ProbeResult {
            target: target.clone(),
            outcome,
            latency_ms,
            timestamp,
        }
    }

    fn classify(&self, err: &reqwest::Error) -> ProbeOutcome {
        let chain = error_chain(err);
        if err.is_timeout() {
            ProbeOutcome::Unreachable {
                kind: FailureKind::Timeout,
                detail: format!("timed out after {}s: {}", self.timeout.as_secs_f64(), chain),
            }
        } else if err.is_connect() {
            ProbeOutcome::Unreachable {
                kind: FailureKind::Connect,
                detail: chain,
            }
        } else if err.is_builder() {
            ProbeOutcome::Unreachable {
                kind: FailureKind::InvalidUrl,
                detail: chain,
            }
        } else {
            ProbeOutcome::Unreachable {
                kind: FailureKind::Request,
                detail: chain,
            }
        }
    }
}

fn parse_target_url(raw: &str) -> Result<Url, String> {
    let url = Url::parse(raw).map_err(|e| format!("invalid url {:?}: {}", raw, e))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        other => Err(format!("unsupported scheme {:?} in {}", other, raw)),
    }
}

fn error_chain(err: &dyn StdError) -> String {
    let mut text = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let cause_text = cause.to_string();
        if !text.contains(&cause_text) {
            text.push_str(": ");
            text.push_str(&cause_text);
        }
        source = cause.source();
    }
    text
}
