//! Bulk dispatch engine: drives one run from validated request to
//! [`DispatchRun`], strictly one target at a time.
//!
//! Per target: periodic session check → resolve handle → select message →
//! send with retry → pace. A failed session check aborts the run and keeps
//! the results collected so far.

use crate::clock::{Sleeper, TokioSleeper};
use crate::collector::ResultCollector;
use crate::request::{DispatchInput, DispatchRequest};
use crate::retry::{RetryPolicy, SendFailure};
use crate::selector::MessageSelector;
use crate::session::SessionManager;
use crate::state_machine::{DispatchState, DispatchStateMachine};
use crate::throttle::ThrottleController;
use chrono::Utc;
use outreach_core::config::AppConfig;
use outreach_core::event_bus::{make_event, noop_sink, DispatchEventType, EventSink};
use outreach_core::services::{AccountService, LeadStore, TextGenerator};
use outreach_core::types::{
    DispatchAttempt, DispatchResult, DispatchRun, RunOutcome, Session, TargetAccount, ALL_TARGETS,
    UNKNOWN_SENDER,
};
use outreach_core::{OutreachResult, ServiceErrorKind};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

const INVALID_SESSION_REASON: &str = "SessionID inválido o expirado";

pub struct DispatchEngine {
    config: AppConfig,
    account: Arc<dyn AccountService>,
    sessions: SessionManager,
    selector: MessageSelector,
    retry: RetryPolicy,
    throttle: ThrottleController,
    sleeper: Arc<dyn Sleeper>,
    event_sink: Arc<dyn EventSink>,
    lead_store: Option<Arc<dyn LeadStore>>,
    seed: Option<u64>,
}

impl DispatchEngine {
    pub fn new(config: AppConfig, account: Arc<dyn AccountService>) -> Self {
        info!(
            verify_every = config.dispatch.verify_every,
            max_attempts = config.retry.max_attempts,
            max_delay_ms = config.throttle.max_delay_ms,
            "Dispatch engine initialized"
        );
        Self {
            sessions: SessionManager::new(account.clone(), config.dispatch.verify_every),
            selector: MessageSelector::new(&config.personalization, config.dispatch.max_message_chars),
            retry: RetryPolicy::new(&config.retry),
            throttle: ThrottleController::new(config.throttle.clone()),
            sleeper: Arc::new(TokioSleeper),
            event_sink: noop_sink(),
            lead_store: None,
            seed: None,
            account,
            config,
        }
    }

    pub fn with_text_generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.selector = self.selector.with_generator(generator);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Attach an event sink for the run's audit trail.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.event_sink = sink;
        self
    }

    /// Successful targets are marked as used in this store after each run.
    pub fn with_lead_store(mut self, store: Arc<dyn LeadStore>) -> Self {
        self.lead_store = Some(store);
        self
    }

    /// Seed the per-run random source so variant choice and jitter repeat.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate raw input and run the batch. Only validation errors are
    /// returned as `Err`; every other failure is reported inside the run.
    pub async fn dispatch(&self, input: &DispatchInput) -> OutreachResult<DispatchRun> {
        let request = DispatchRequest::parse(input, &self.config)?;
        self.run(request).await
    }

    /// Run an already parsed request. It is re-checked against this engine's
    /// configuration first, so a rejected request makes no collaborator calls.
    pub async fn run(&self, request: DispatchRequest) -> OutreachResult<DispatchRun> {
        request.check(&self.config)?;

        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let message_label = request.source().summary_label();
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut machine = DispatchStateMachine::new();
        let mut collector = ResultCollector::new();

        metrics::counter!("dispatch.runs").increment(1);
        info!(run_id = %run_id, targets = request.targets().len(), "Dispatch run starting");
        self.emit(DispatchEventType::RunStarted, run_id, None, None);

        machine.transition(DispatchState::Authenticating)?;
        let (mut session, identity) = match self.sessions.establish(request.credential()).await {
            Ok(established) => established,
            Err(err) => {
                warn!(run_id = %run_id, error = %err, "Dispatch run aborted before sending");
                collector.record(DispatchResult::failure(
                    ALL_TARGETS,
                    INVALID_SESSION_REASON,
                    Some(ServiceErrorKind::Auth),
                    DispatchAttempt::failed(0, ServiceErrorKind::Auth),
                ));
                machine.transition(DispatchState::Aborted)?;
                self.emit(
                    DispatchEventType::AuthenticationFailed,
                    run_id,
                    None,
                    Some(err.to_string()),
                );
                self.emit(DispatchEventType::RunAborted, run_id, None, None);
                return Ok(collector.finish(
                    run_id,
                    UNKNOWN_SENDER.to_string(),
                    RunOutcome::Aborted,
                    false,
                    message_label,
                    started_at,
                ));
            }
        };
        machine.transition(DispatchState::Dispatching)?;
        self.emit(
            DispatchEventType::SessionEstablished,
            run_id,
            None,
            Some(identity.username.clone()),
        );

        let total = request.targets().len();
        let mut session_lost = None;

        for (index, target) in request.targets().iter().enumerate() {
            if self.sessions.is_due(index) {
                if let Err(err) = self.sessions.ensure_valid(&mut session).await {
                    session_lost = Some(err);
                    break;
                }
            }
            let is_last = index + 1 == total;

            machine.transition(DispatchState::Selecting)?;
            let outcome = match self
                .prepare(&session, &identity.username, &request, target, &mut rng)
                .await
            {
                Ok((user_id, text)) => {
                    machine.transition(DispatchState::Sending)?;
                    let sent = self
                        .retry
                        .attempt(self.sleeper.as_ref(), || {
                            self.account.send_direct_message(&session, &user_id, &text)
                        })
                        .await;
                    sent.map(|attempt| (text, attempt))
                }
                Err(failure) => Err(failure),
            };
            machine.transition(DispatchState::Throttling)?;

            match outcome {
                Ok((text, attempt)) => {
                    collector.record(DispatchResult::success(target.as_str(), text, attempt));
                    metrics::counter!("dispatch.sent").increment(1);
                    self.emit(
                        DispatchEventType::MessageSent,
                        run_id,
                        Some(target.to_string()),
                        None,
                    );

                    if !is_last {
                        let delay = self.throttle.delay_after(index, collector.successes(), &mut rng);
                        info!(
                            run_id = %run_id,
                            target = %target,
                            delay_secs = delay.as_secs(),
                            "Message sent, pacing next send"
                        );
                        metrics::histogram!("dispatch.throttle_delay_ms")
                            .record(delay.as_millis() as f64);
                        self.sleeper.sleep(delay).await;
                    }
                }
                Err(failure) => {
                    let kind = failure.error.kind;
                    let reason = failure.error.reason();
                    warn!(
                        run_id = %run_id,
                        target = %target,
                        kind = kind.as_str(),
                        attempts = failure.attempts,
                        reason = %reason,
                        "Target failed"
                    );
                    collector.record(DispatchResult::failure(
                        target.as_str(),
                        reason.clone(),
                        Some(kind),
                        failure.attempt(),
                    ));
                    metrics::counter!("dispatch.failed", "kind" => kind.as_str()).increment(1);
                    self.emit(
                        DispatchEventType::MessageFailed,
                        run_id,
                        Some(target.to_string()),
                        Some(reason),
                    );

                    if !is_last {
                        self.sleeper.sleep(self.throttle.failure_cooldown(kind)).await;
                    }
                    if let Err(err) = self.sessions.ensure_valid(&mut session).await {
                        session_lost = Some(err);
                        break;
                    }
                }
            }
            machine.transition(DispatchState::Dispatching)?;
        }

        let outcome = if let Some(err) = &session_lost {
            machine.transition(DispatchState::Aborted)?;
            metrics::counter!("dispatch.session_lost").increment(1);
            warn!(
                run_id = %run_id,
                reached = collector.results().len(),
                total,
                error = %err,
                "Session lost, remaining targets skipped"
            );
            self.emit(
                DispatchEventType::SessionLost,
                run_id,
                None,
                Some(err.to_string()),
            );
            self.emit(DispatchEventType::RunAborted, run_id, None, None);
            RunOutcome::Aborted
        } else {
            machine.transition(DispatchState::Completed)?;
            self.emit(DispatchEventType::RunCompleted, run_id, None, None);
            RunOutcome::Completed
        };
        drop(session);

        let run = collector.finish(
            run_id,
            identity.username,
            outcome,
            session_lost.is_some(),
            message_label,
            started_at,
        );
        info!(
            run_id = %run_id,
            sent = run.successful_sends,
            failed = run.failed_sends,
            outcome = ?run.outcome,
            "Dispatch run finished"
        );

        self.mark_leads_used(&run).await;
        Ok(run)
    }

    /// Resolve the target and select its text. Lookup failures count zero
    /// send attempts.
    async fn prepare(
        &self,
        session: &Session,
        sender: &str,
        request: &DispatchRequest,
        target: &TargetAccount,
        rng: &mut StdRng,
    ) -> Result<(String, String), SendFailure> {
        let (user_id, _) = self
            .retry
            .execute(self.sleeper.as_ref(), || {
                self.account.resolve_handle(session, target.as_str())
            })
            .await
            .map_err(|failure| SendFailure {
                attempts: 0,
                error: failure.error,
            })?;
        let text = self
            .selector
            .select(request.source(), target, sender, request.context(), rng)
            .await;
        Ok((user_id, text))
    }

    async fn mark_leads_used(&self, run: &DispatchRun) {
        let Some(store) = &self.lead_store else {
            return;
        };
        let handles = run.successful_targets();
        if handles.is_empty() {
            return;
        }
        match store.mark_used(&handles).await {
            Ok(updated) => info!(run_id = %run.run_id, updated, "Leads marked as used"),
            Err(err) => warn!(run_id = %run.run_id, error = %err, "Failed to mark leads as used"),
        }
    }

    fn emit(
        &self,
        event_type: DispatchEventType,
        run_id: Uuid,
        target: Option<String>,
        detail: Option<String>,
    ) {
        self.event_sink
            .emit(make_event(event_type, run_id, target, detail));
    }
}
