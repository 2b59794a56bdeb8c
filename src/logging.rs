//! Structured logging.
//!
//! [`init`] installs the global `tracing` subscriber from `[logging]`
//! (pretty or JSON lines, written to stderr). `RUST_LOG` overrides the
//! configured filter.
//!
//! [`log_answer`] emits the one record written per completed answer, under
//! the target `policy_assistant::chat`. Question and answer text pass
//! through [`redact`] first.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::models::Domain;

/// Default cap for free text in log records.
pub const REDACT_DEFAULT: usize = 500;

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.filter));

    let (pretty, json) = match config.format {
        LogFormat::Pretty => (
            Some(fmt::layer().with_writer(std::io::stderr).with_target(true)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                fmt::layer()
                    .json()
                    .flatten_event(true)
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(pretty)
        .with(json)
        .try_init()
        .is_ok()
}

/// Trim `text` and cap it at `max` characters, marking the cut with `…`.
pub fn redact(text: &str, max: usize) -> String {
    let t = text.trim();
    match t.char_indices().nth(max) {
        Some((cut, _)) => format!("{}…", &t[..cut]),
        None => t.to_string(),
    }
}

/// Fields of the per-answer log record. Text fields are raw; [`log_answer`]
/// redacts them.
#[derive(Debug)]
pub struct AnswerRecord<'a> {
    pub request_id: &'a str,
    pub caller: &'a str,
    pub question: &'a str,
    pub answer: &'a str,
    pub latency_ms: u64,
    pub domain: Domain,
    pub confidence: f64,
    pub top_score: f64,
    pub retrieved_k: usize,
    pub final_top_k: usize,
}

pub const LOG_QUESTION_CHARS: usize = 300;
pub const LOG_ANSWER_CHARS: usize = 800;

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub fn log_answer(record: &AnswerRecord<'_>) {
    tracing::info!(
        target: "policy_assistant::chat",
        request_id = record.request_id,
        caller = record.caller,
        question = %redact(record.question, LOG_QUESTION_CHARS),
        answer = %redact(record.answer, LOG_ANSWER_CHARS),
        latency_ms = record.latency_ms,
        domain = %record.domain,
        confidence = round_to(record.confidence, 3),
        top_score = round_to(record.top_score, 4),
        retrieved_k = record.retrieved_k,
        final_top_k = record.final_top_k,
        status = "success",
        "chat answered"
    );
}
