use chrono::{DateTime, Utc};
use outreach_core::types::{DispatchResult, DispatchRun, RunOutcome};
use uuid::Uuid;

const SESSION_LOST_MESSAGE: &str = "La sesión se interrumpió durante el proceso";

/// Append-only accumulator of per-target outcomes.
#[derive(Debug, Default)]
pub struct ResultCollector {
    results: Vec<DispatchResult>,
    successes: usize,
    failures: usize,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, result: DispatchResult) {
        if result.is_success() {
            self.successes += 1;
        } else {
            self.failures += 1;
        }
        self.results.push(result);
    }

    pub fn successes(&self) -> usize {
        self.successes
    }

    pub fn failures(&self) -> usize {
        self.failures
    }

    pub fn results(&self) -> &[DispatchResult] {
        &self.results
    }

    pub fn finish(
        self,
        run_id: Uuid,
        sender: String,
        outcome: RunOutcome,
        session_lost: bool,
        message_label: String,
        started_at: DateTime<Utc>,
    ) -> DispatchRun {
        DispatchRun {
            run_id,
            sender,
            results: self.results,
            successful_sends: self.successes,
            failed_sends: self.failures,
            session_lost,
            session_message: session_lost.then(|| SESSION_LOST_MESSAGE.to_string()),
            outcome,
            message_label,
            started_at,
            finished_at: Utc::now(),
        }
    }
}
