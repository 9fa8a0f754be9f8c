use metriken::{Counter, LazyCounter, metric};

#[metric(
    name = "requests",
    description = "Generate requests sent",
    metadata = { status = "sent" }
)]
pub static REQUESTS_SENT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "requests",
    description = "Generate requests that produced a record",
    metadata = { status = "success" }
)]
pub static REQUESTS_SUCCESS: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "requests",
    description = "Generate requests that failed",
    metadata = { status = "failed" }
)]
pub static REQUESTS_FAILED: LazyCounter = LazyCounter::new(Counter::default);

// Token metrics, as reported by the server
#[metric(
    name = "tokens",
    description = "Prompt tokens evaluated",
    metadata = { direction = "input" }
)]
pub static TOKENS_INPUT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(
    name = "tokens",
    description = "Output tokens generated",
    metadata = { direction = "output" }
)]
pub static TOKENS_OUTPUT: LazyCounter = LazyCounter::new(Counter::default);

#[metric(name = "models_unloaded", description = "Running models evicted before the run")]
pub static MODELS_UNLOADED: LazyCounter = LazyCounter::new(Counter::default);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
    Success,
    Failed,
}

pub struct Metrics;

impl Metrics {
    pub fn record_request_sent() {
        REQUESTS_SENT.increment();
    }

    pub fn record_request_complete(status: RequestStatus) {
        match status {
            RequestStatus::Success => REQUESTS_SUCCESS.increment(),
            RequestStatus::Failed => REQUESTS_FAILED.increment(),
        };
    }

    pub fn record_tokens(input: u64, output: u64) {
        TOKENS_INPUT.add(input);
        TOKENS_OUTPUT.add(output);
    }

    pub fn record_models_unloaded(count: usize) {
        MODELS_UNLOADED.add(count as u64);
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterSnapshot {
    pub requests_sent: u64,
    pub requests_success: u64,
    pub requests_failed: u64,
    pub tokens_input: u64,
    pub tokens_output: u64,
    pub models_unloaded: u64,
}

impl CounterSnapshot {
    pub fn now() -> Self {
        Self {
            requests_sent: REQUESTS_SENT.value(),
            requests_success: REQUESTS_SUCCESS.value(),
            requests_failed: REQUESTS_FAILED.value(),
            tokens_input: TOKENS_INPUT.value(),
            tokens_output: TOKENS_OUTPUT.value(),
            models_unloaded: MODELS_UNLOADED.value(),
        }
    }

    /// Counter growth since `earlier`.
    pub fn since(&self, earlier: &CounterSnapshot) -> CounterSnapshot {
        CounterSnapshot {
            requests_sent: self.requests_sent - earlier.requests_sent,
            requests_success: self.requests_success - earlier.requests_success,
            requests_failed: self.requests_failed - earlier.requests_failed,
            tokens_input: self.tokens_input - earlier.tokens_input,
            tokens_output: self.tokens_output - earlier.tokens_output,
            models_unloaded: self.models_unloaded - earlier.models_unloaded,
        }
    }
}
