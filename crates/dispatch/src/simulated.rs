//! Simulated platform account service for dry runs and tests.
//!
//! Behaves like the real adapter at the trait boundary: resolves handles to
//! numeric ids, records sent messages, and returns structured failures that
//! can be scripted per handle.

use async_trait::async_trait;
use outreach_core::services::AccountService;
use outreach_core::types::{Identity, Session};
use outreach_core::ServiceError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

const FIRST_USER_ID: u64 = 17_841_400_000_000_000;

/// A message accepted by the simulated platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SentMessage {
    pub user_id: String,
    pub handle: String,
    pub text: String,
}

pub struct SimulatedAccountService {
    identity: Identity,
    accepted_credential: Option<String>,
    unknown_handles: HashSet<String>,
    send_failures: Mutex<HashMap<String, VecDeque<ServiceError>>>,
    resolve_failures: Mutex<HashMap<String, VecDeque<ServiceError>>>,
    expire_after_checks: Option<usize>,
    user_ids: Mutex<HashMap<String, String>>,
    sent: Mutex<Vec<SentMessage>>,
    current_user_calls: AtomicUsize,
    total_calls: AtomicUsize,
}

impl SimulatedAccountService {
    pub fn new(sender_username: impl Into<String>) -> Self {
        let username = sender_username.into();
        info!(sender = %username, "Simulated account service initialized");
        Self {
            identity: Identity {
                user_id: FIRST_USER_ID.to_string(),
                username,
            },
            accepted_credential: None,
            unknown_handles: HashSet::new(),
            send_failures: Mutex::new(HashMap::new()),
            resolve_failures: Mutex::new(HashMap::new()),
            expire_after_checks: None,
            user_ids: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
            current_user_calls: AtomicUsize::new(0),
            total_calls: AtomicUsize::new(0),
        }
    }

    /// Only this credential authenticates; any other fails the session check.
    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.accepted_credential = Some(credential.into());
        self
    }

    /// Handles that do not resolve.
    pub fn with_unknown_handle(mut self, handle: impl Into<String>) -> Self {
        self.unknown_handles.insert(handle.into());
        self
    }

    /// Script send failures for a handle, consumed one per send attempt.
    pub fn with_send_failures(self, handle: impl Into<String>, errors: Vec<ServiceError>) -> Self {
        self.send_failures
            .lock()
            .insert(handle.into(), errors.into_iter().collect());
        self
    }

    /// Script lookup failures for a handle, consumed one per lookup.
    pub fn with_resolve_failures(self, handle: impl Into<String>, errors: Vec<ServiceError>) -> Self {
        self.resolve_failures
            .lock()
            .insert(handle.into(), errors.into_iter().collect());
        self
    }

    /// The session check fails once it has succeeded `checks` times.
    pub fn expire_after_checks(mut self, checks: usize) -> Self {
        self.expire_after_checks = Some(checks);
        self
    }

    pub fn sent_messages(&self) -> Vec<SentMessage> {
        self.sent.lock().clone()
    }

    pub fn current_user_calls(&self) -> usize {
        self.current_user_calls.load(Ordering::SeqCst)
    }

    /// Every collaborator call made so far.
    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn handle_for(&self, user_id: &str) -> Option<String> {
        self.user_ids
            .lock()
            .iter()
            .find(|(_, id)| id.as_str() == user_id)
            .map(|(handle, _)| handle.clone())
    }
}

#[async_trait]
impl AccountService for SimulatedAccountService {
    async fn current_user(&self, session: &Session) -> Result<Identity, ServiceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let check = self.current_user_calls.fetch_add(1, Ordering::SeqCst) + 1;

        if let Some(expected) = &self.accepted_credential {
            if session.credential() != expected {
                return Err(ServiceError::auth("login_required"));
            }
        }
        if let Some(limit) = self.expire_after_checks {
            if check > limit {
                return Err(ServiceError::auth("login_required: session expired"));
            }
        }
        Ok(self.identity.clone())
    }

    async fn resolve_handle(&self, _session: &Session, handle: &str) -> Result<String, ServiceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        if self.unknown_handles.contains(handle) {
            return Err(ServiceError::not_found(format!("User \"{}\" not found", handle)));
        }
        let scripted = self
            .resolve_failures
            .lock()
            .get_mut(handle)
            .and_then(|queue| queue.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        let mut ids = self.user_ids.lock();
        let next = FIRST_USER_ID + ids.len() as u64 + 1;
        let id = ids
            .entry(handle.to_string())
            .or_insert_with(|| next.to_string())
            .clone();
        debug!(handle = %handle, user_id = %id, "Handle resolved");
        Ok(id)
    }

    async fn send_direct_message(
        &self,
        _session: &Session,
        user_id: &str,
        text: &str,
    ) -> Result<(), ServiceError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let handle = self.handle_for(user_id).unwrap_or_else(|| user_id.to_string());

        let scripted = self
            .send_failures
            .lock()
            .get_mut(&handle)
            .and_then(|queue| queue.pop_front());
        if let Some(err) = scripted {
            return Err(err);
        }

        info!(
            to = %handle,
            user_id = %user_id,
            body_len = text.len(),
            "Direct message sent"
        );
        self.sent.lock().push(SentMessage {
            user_id: user_id.to_string(),
            handle,
            text: text.to_string(),
        });
        Ok(())
    }
}
