use crate::error::ServiceErrorKind;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

/// Target label used for the synthetic entry of a run that never authenticated.
pub const ALL_TARGETS: &str = "Todos";

/// Sender label reported when the session never resolved an identity.
pub const UNKNOWN_SENDER: &str = "Desconocido";

const DEVICE_SEED: &str = "direct-sender";

// ─── Session ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionValidity {
    Unknown,
    Valid,
    Invalid,
}

/// Authenticated platform session owned by exactly one dispatch run.
///
/// The credential is never logged and the session is dropped with the run.
#[derive(Debug)]
pub struct Session {
    id: Uuid,
    credential: SecretString,
    device_id: String,
    validity: SessionValidity,
}

impl Session {
    pub fn new(credential: impl Into<String>) -> Self {
        let credential = credential.into();
        let device_id = device_fingerprint(&credential);
        Self {
            id: Uuid::new_v4(),
            credential: SecretString::new(credential),
            device_id,
            validity: SessionValidity::Unknown,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn credential(&self) -> &str {
        self.credential.expose_secret()
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn validity(&self) -> SessionValidity {
        self.validity
    }

    pub fn is_valid(&self) -> bool {
        self.validity == SessionValidity::Valid
    }

    pub fn mark_valid(&mut self) {
        // Invalid is terminal for the lifetime of the run.
        if self.validity != SessionValidity::Invalid {
            self.validity = SessionValidity::Valid;
        }
    }

    pub fn mark_invalid(&mut self) {
        self.validity = SessionValidity::Invalid;
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        tracing::debug!(session_id = %self.id, validity = ?self.validity, "Session released");
    }
}

/// Stable device identifier derived from the credential, so the platform
/// sees one device per session.
pub fn device_fingerprint(credential: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(DEVICE_SEED.as_bytes());
    hasher.update(b":");
    hasher.update(credential.as_bytes());
    let digest = hex::encode(hasher.finalize());
    format!("android-{}", &digest[..16])
}

/// Identity behind a session as reported by the account service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: String,
    pub username: String,
}

// ─── Targets ────────────────────────────────────────────────────────────────

/// A normalized platform handle to be messaged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TargetAccount(String);

impl TargetAccount {
    /// Strip surrounding whitespace and every leading `@`, then reject empty
    /// values or URLs. Applying it to an already-normalized handle returns
    /// the same handle.
    pub fn normalize(raw: &str) -> Option<Self> {
        let handle = raw
            .trim_start_matches(|c: char| c == '@' || c.is_whitespace())
            .trim_end();
        if handle.is_empty() || looks_like_url(handle) {
            return None;
        }
        Some(Self(handle.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TargetAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn looks_like_url(handle: &str) -> bool {
    let lower = handle.to_ascii_lowercase();
    lower.contains("://") || lower.starts_with("www.")
}

// ─── Messages ───────────────────────────────────────────────────────────────

/// Where the text for each send comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "text", rename_all = "snake_case")]
pub enum MessageSource {
    Single(String),
    Variants(Vec<String>),
}

impl MessageSource {
    pub fn is_empty(&self) -> bool {
        match self {
            MessageSource::Single(text) => text.trim().is_empty(),
            MessageSource::Variants(variants) => variants.iter().all(|v| v.trim().is_empty()),
        }
    }

    /// Label shown to the caller describing what was sent.
    pub fn summary_label(&self) -> String {
        match self {
            MessageSource::Single(text) => text.clone(),
            MessageSource::Variants(_) => "Variaciones de mensaje".to_string(),
        }
    }
}

// ─── Attempts & results ─────────────────────────────────────────────────────

/// How the tries for one target ended. `TransientFailure` means the retry
/// budget ran out on a retryable error, so the target can go into a later run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    Success,
    TransientFailure,
    TerminalFailure,
}

/// Outcome of sending to a single target, after retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchAttempt {
    pub attempts: u32,
    pub outcome: AttemptOutcome,
}

impl DispatchAttempt {
    pub fn succeeded(attempts: u32) -> Self {
        Self {
            attempts,
            outcome: AttemptOutcome::Success,
        }
    }

    /// Final failure after `attempts` tries, classified by the last error.
    pub fn failed(attempts: u32, kind: ServiceErrorKind) -> Self {
        let outcome = if kind.is_transient() {
            AttemptOutcome::TransientFailure
        } else {
            AttemptOutcome::TerminalFailure
        };
        Self { attempts, outcome }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    Success,
    Error,
}

/// One entry per target reached by the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    pub target: String,
    pub status: DispatchStatus,
    /// Human-readable reason ("Mensaje enviado", "Usuario no encontrado", ...).
    #[serde(rename = "message")]
    pub reason: String,
    /// Exact text transmitted; empty on failure.
    pub sent_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ServiceErrorKind>,
    pub attempts: u32,
    pub outcome: AttemptOutcome,
}

impl DispatchResult {
    pub fn success(
        target: impl Into<String>,
        sent_message: impl Into<String>,
        attempt: DispatchAttempt,
    ) -> Self {
        Self {
            target: target.into(),
            status: DispatchStatus::Success,
            reason: "Mensaje enviado".to_string(),
            sent_message: sent_message.into(),
            error_kind: None,
            attempts: attempt.attempts,
            outcome: attempt.outcome,
        }
    }

    pub fn failure(
        target: impl Into<String>,
        reason: impl Into<String>,
        error_kind: Option<ServiceErrorKind>,
        attempt: DispatchAttempt,
    ) -> Self {
        Self {
            target: target.into(),
            status: DispatchStatus::Error,
            reason: reason.into(),
            sent_message: String::new(),
            error_kind,
            attempts: attempt.attempts,
            outcome: attempt.outcome,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DispatchStatus::Success
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Aborted,
}

/// Aggregate result of one batch dispatch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRun {
    pub run_id: Uuid,
    pub sender: String,
    pub results: Vec<DispatchResult>,
    pub successful_sends: usize,
    pub failed_sends: usize,
    pub session_lost: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_message: Option<String>,
    pub outcome: RunOutcome,
    pub message_label: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl DispatchRun {
    /// Handles that were messaged successfully, in dispatch order.
    pub fn successful_targets(&self) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.is_success())
            .map(|r| r.target.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_marker_and_whitespace() {
        let t = TargetAccount::normalize("  @alice  ").unwrap();
        assert_eq!(t.as_str(), "alice");
        assert_eq!(TargetAccount::normalize("@@bob").unwrap().as_str(), "bob");
        assert_eq!(TargetAccount::normalize("@ carol").unwrap().as_str(), "carol");
        assert_eq!(TargetAccount::normalize("@ @bob").unwrap().as_str(), "bob");
        assert_eq!(TargetAccount::normalize(" @ @ x ").unwrap().as_str(), "x");
    }

    #[test]
    fn test_normalize_rejects_empty_and_urls() {
        assert!(TargetAccount::normalize("").is_none());
        assert!(TargetAccount::normalize("   @  ").is_none());
        assert!(TargetAccount::normalize("https://instagram.com/alice").is_none());
        assert!(TargetAccount::normalize("www.instagram.com/alice").is_none());
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["@alice", " bob ", "@@ carol", "dave.e_f", "@ @bob", " @ @ x"] {
            let once = TargetAccount::normalize(raw).unwrap();
            let twice = TargetAccount::normalize(once.as_str()).unwrap();
            assert_eq!(once, twice);
        }
    }

    #[test]
    fn test_session_validity_is_sticky() {
        let mut session = Session::new("abc123");
        assert_eq!(session.validity(), SessionValidity::Unknown);
        session.mark_valid();
        assert!(session.is_valid());
        session.mark_invalid();
        session.mark_valid();
        assert_eq!(session.validity(), SessionValidity::Invalid);
    }

    #[test]
    fn test_session_debug_redacts_credential() {
        let session = Session::new("super-secret-token");
        let debug = format!("{:?}", session);
        assert!(!debug.contains("super-secret-token"));
        assert_eq!(session.credential(), "super-secret-token");
    }

    #[test]
    fn test_device_fingerprint_is_stable() {
        let a = device_fingerprint("token-1");
        assert_eq!(a, device_fingerprint("token-1"));
        assert_ne!(a, device_fingerprint("token-2"));
        assert!(a.starts_with("android-"));
        assert_eq!(a.len(), "android-".len() + 16);
        assert_eq!(Session::new("token-1").device_id(), a);
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        assert_ne!(Session::new("t").id(), Session::new("t").id());
    }

    #[test]
    fn test_message_source_helpers() {
        assert!(MessageSource::Single("  ".into()).is_empty());
        assert!(MessageSource::Variants(vec!["".into(), " ".into()]).is_empty());
        assert!(!MessageSource::Variants(vec!["hola".into()]).is_empty());
        assert_eq!(
            MessageSource::Variants(vec!["a".into()]).summary_label(),
            "Variaciones de mensaje"
        );
        assert_eq!(MessageSource::Single("hola".into()).summary_label(), "hola");
    }

    #[test]
    fn test_result_serializes_reason_as_message() {
        let r = DispatchResult::failure(
            "ghost",
            "Usuario no encontrado",
            Some(ServiceErrorKind::NotFound),
            DispatchAttempt::failed(0, ServiceErrorKind::NotFound),
        );
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["message"], "Usuario no encontrado");
        assert_eq!(json["status"], "error");
        assert_eq!(json["sent_message"], "");
        assert_eq!(json["error_kind"], "not_found");
        assert_eq!(json["outcome"], "terminal_failure");
    }

    #[test]
    fn test_failed_attempt_classified_by_kind() {
        assert_eq!(
            DispatchAttempt::failed(2, ServiceErrorKind::RateLimited).outcome,
            AttemptOutcome::TransientFailure
        );
        assert_eq!(
            DispatchAttempt::failed(2, ServiceErrorKind::Network).outcome,
            AttemptOutcome::TransientFailure
        );
        assert_eq!(
            DispatchAttempt::failed(1, ServiceErrorKind::Auth).outcome,
            AttemptOutcome::TerminalFailure
        );
        assert_eq!(DispatchAttempt::succeeded(1).outcome, AttemptOutcome::Success);
    }
}
