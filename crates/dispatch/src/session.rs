//! Session lifecycle for a dispatch run: establish once, re-verify on a
//! fixed cadence, never re-establish after a failed check.

use outreach_core::services::AccountService;
use outreach_core::types::{Identity, Session, SessionValidity};
use outreach_core::{OutreachError, OutreachResult};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct SessionManager {
    account: Arc<dyn AccountService>,
    verify_every: usize,
}

impl SessionManager {
    pub fn new(account: Arc<dyn AccountService>, verify_every: usize) -> Self {
        Self {
            account,
            verify_every: verify_every.max(1),
        }
    }

    /// Build a session from the credential and confirm it resolves to an
    /// identity with one round trip.
    pub async fn establish(&self, credential: &str) -> OutreachResult<(Session, Identity)> {
        let mut session = Session::new(credential);
        match self.account.current_user(&session).await {
            Ok(identity) => {
                session.mark_valid();
                info!(
                    session_id = %session.id(),
                    device_id = %session.device_id(),
                    sender = %identity.username,
                    "Session established"
                );
                Ok((session, identity))
            }
            Err(err) => {
                session.mark_invalid();
                warn!(
                    session_id = %session.id(),
                    kind = err.kind.as_str(),
                    error = %err.message,
                    "Session could not be established"
                );
                Err(OutreachError::Authentication(err.message))
            }
        }
    }

    /// Re-check the session. Failures are reported as `false` and mark the
    /// session invalid for the rest of the run.
    pub async fn verify(&self, session: &mut Session) -> bool {
        if session.validity() == SessionValidity::Invalid {
            return false;
        }
        match self.account.current_user(session).await {
            Ok(_) => {
                session.mark_valid();
                debug!(session_id = %session.id(), "Session verified");
                true
            }
            Err(err) => {
                session.mark_invalid();
                warn!(
                    session_id = %session.id(),
                    kind = err.kind.as_str(),
                    error = %err.message,
                    "Session check failed, marking invalid"
                );
                false
            }
        }
    }

    /// [`verify`](Self::verify) for the dispatch loop: a failed check becomes
    /// `SessionExpired`.
    pub async fn ensure_valid(&self, session: &mut Session) -> OutreachResult<()> {
        if self.verify(session).await {
            Ok(())
        } else {
            Err(OutreachError::SessionExpired)
        }
    }

    /// Whether the periodic check runs before the target at `index`.
    pub fn is_due(&self, index: usize) -> bool {
        index % self.verify_every == 0
    }
}
