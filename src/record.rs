use std::fmt;
use thiserror::Error;

use crate::client::GenerateResponse;

/// String values longer than this are shortened when a record is displayed.
const MAX_STR_PRINT_LENGTH: usize = 30;

const NANOS_PER_SEC: f64 = 1e9;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("{field} is zero, cannot compute {rate}")]
    ZeroDuration {
        field: &'static str,
        rate: &'static str,
    },
}

/// One generation result with durations in seconds and derived token rates.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseRecord {
    pub model: String,
    pub prompt: String,
    pub created_at: String,
    pub response: String,
    pub done_reason: Option<String>,
    pub total_duration: f64,
    pub load_duration: f64,
    pub prompt_eval_duration: f64,
    pub eval_duration: f64,
    pub prompt_eval_count: u64,
    pub eval_count: u64,
    /// Output tokens per second
    pub eval_rate: f64,
    /// Prompt tokens per second
    pub prompt_eval_rate: f64,
}

pub fn nanos_to_secs(nanos: u64) -> f64 {
    nanos as f64 / NANOS_PER_SEC
}

fn rate(
    count: u64,
    duration_secs: f64,
    field: &'static str,
    rate_name: &'static str,
) -> Result<f64, RecordError> {
    if duration_secs == 0.0 {
        return Err(RecordError::ZeroDuration {
            field,
            rate: rate_name,
        });
    }
    Ok(count as f64 / duration_secs)
}

impl ResponseRecord {
    /// Builds a record from a server response and the prompt that produced it.
    ///
    /// Durations are converted from nanoseconds before the rates are computed.
    /// A zero `eval_duration` or `prompt_eval_duration` is rejected.
    pub fn new(response: GenerateResponse, prompt: impl Into<String>) -> Result<Self, RecordError> {
        let total_duration = nanos_to_secs(response.total_duration);
        let load_duration = nanos_to_secs(response.load_duration);
        let prompt_eval_duration = nanos_to_secs(response.prompt_eval_duration);
        let eval_duration = nanos_to_secs(response.eval_duration);

        let eval_rate = rate(
            response.eval_count,
            eval_duration,
            "eval_duration",
            "eval_rate",
        )?;
        let prompt_eval_rate = rate(
            response.prompt_eval_count,
            prompt_eval_duration,
            "prompt_eval_duration",
            "prompt_eval_rate",
        )?;

        Ok(Self {
            model: response.model,
            prompt: prompt.into(),
            created_at: response.created_at,
            response: response.response,
            done_reason: response.done_reason,
            total_duration,
            load_duration,
            prompt_eval_duration,
            eval_duration,
            prompt_eval_count: response.prompt_eval_count,
            eval_count: response.eval_count,
            eval_rate,
            prompt_eval_rate,
        })
    }
}

fn truncate(value: &str) -> String {
    match value.char_indices().nth(MAX_STR_PRINT_LENGTH) {
        Some((idx, _)) => format!("{}...", &value[..idx]),
        None => value.to_string(),
    }
}

impl fmt::Display for ResponseRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ResponseRecord(model={}, prompt={}, created_at={}, response={}, ",
            truncate(&self.model),
            truncate(&self.prompt),
            truncate(&self.created_at),
            truncate(&self.response),
        )?;
        if let Some(reason) = &self.done_reason {
            write!(f, "done_reason={}, ", truncate(reason))?;
        }
        write!(
            f,
            "total_duration={}, load_duration={}, prompt_eval_count={}, prompt_eval_duration={}, \
             eval_count={}, eval_duration={}, eval_rate={}, prompt_eval_rate={})",
            self.total_duration,
            self.load_duration,
            self.prompt_eval_count,
            self.prompt_eval_duration,
            self.eval_count,
            self.eval_duration,
            self.eval_rate,
            self.prompt_eval_rate,
        )
    }
}
