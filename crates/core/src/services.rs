//! Collaborator interfaces consumed by the dispatch engine.
//!
//! Adapters for the real platform, the text-generation backend and the lead
//! database implement these traits and attach a [`ServiceErrorKind`] to every
//! failure at the boundary.
//!
//! [`ServiceErrorKind`]: crate::error::ServiceErrorKind

use crate::error::ServiceError;
use crate::types::{Identity, Session};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform account operations performed on behalf of a session.
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Resolve the identity behind the session ("current user" check).
    async fn current_user(&self, session: &Session) -> Result<Identity, ServiceError>;

    /// Resolve a handle to the platform-internal numeric id.
    async fn resolve_handle(&self, session: &Session, handle: &str) -> Result<String, ServiceError>;

    /// Send a direct message to a resolved user id.
    async fn send_direct_message(
        &self,
        session: &Session,
        user_id: &str,
        text: &str,
    ) -> Result<(), ServiceError>;
}

/// Optional generative text backend used for message personalization.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, ServiceError>;
}

/// A prospect discovered by an external crawler and stored for outreach.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeadRecord {
    /// Profile handle, used as the dispatch target.
    pub profile: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub full_name: Option<String>,
    pub keyword: String,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub found_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub used: bool,
    #[serde(default)]
    pub used_at: Option<DateTime<Utc>>,
}

/// External store of candidate targets.
#[async_trait]
pub trait LeadStore: Send + Sync {
    /// Distinct keywords that still have unused leads.
    async fn keywords(&self) -> anyhow::Result<Vec<String>>;

    /// Unused leads for a keyword, at most `limit`.
    async fn candidates(&self, keyword: &str, limit: usize) -> anyhow::Result<Vec<LeadRecord>>;

    /// Flag the given handles as used. Returns how many leads were updated.
    async fn mark_used(&self, handles: &[String]) -> anyhow::Result<usize>;
}
