//! Process-wide server state.

use crate::types::capabilities::ClientCapabilities;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgUser {
    pub id: String,
    pub name: String,
    pub profile_name: String,
    pub role_name: Option<String>,
}

/// Sensitive field: never logged, never written to a resource unsanitized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrgIdentity {
    pub alias: Option<String>,
    pub username: String,
    pub instance_url: String,
    pub access_token: String,
    pub api_version: String,
    pub id: String,
    pub user: Option<OrgUser>,
    pub company_details: Option<Value>,
}

impl OrgIdentity {
    pub fn is_identified(&self) -> bool {
        !self.username.is_empty() && self.username.to_lowercase() != "unknown"
    }
}

#[derive(Debug, Clone)]
pub struct ClientDescriptor {
    pub name: String,
    pub version: String,
    pub capabilities: ClientCapabilities,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    Created,
    AwaitingInitialize,
    ClientBound,
    WorkspaceResolved,
    OrgIdentified,
    PermissionsValidated,
    Ready,
}

#[derive(Debug, Clone)]
pub struct ServerState {
    pub init: InitState,
    pub failed: Option<String>,
    pub org: OrgIdentity,
    pub started_at: DateTime<Utc>,
    pub current_log_level: crate::cli::LogLevel,
    pub workspace_path: Option<String>,
    pub user_permissions_validated: bool,
    pub handshake_validated: bool,
    pub initialization_complete: bool,
    /// The username identified on the previous successful org-identification
    /// pass, used to detect a genuine org switch (as opposed to the
    /// just-identified user's display name, which is a different field).
    pub last_identified_username: Option<String>,
}

impl ServerState {
    pub fn new(log_level: crate::cli::LogLevel) -> Self {
        Self {
            init: InitState::Created,
            failed: None,
            org: OrgIdentity::default(),
            started_at: Utc::now(),
            current_log_level: log_level,
            workspace_path: None,
            user_permissions_validated: false,
            handshake_validated: false,
            initialization_complete: false,
            last_identified_username: None,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.initialization_complete && self.init == InitState::Ready
    }

    pub fn mark_failed(&mut self, reason: impl Into<String>) {
        self.failed = Some(reason.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_not_ready() {
        let state = ServerState::new(crate::cli::LogLevel::Info);
        assert!(!state.is_ready());
        assert_eq!(state.init, InitState::Created);
    }

    #[test]
    fn org_identity_rejects_unknown_username() {
        let mut org = OrgIdentity::default();
        assert!(!org.is_identified());
        org.username = "unknown".into();
        assert!(!org.is_identified());
        org.username = "alice@example.com".into();
        assert!(org.is_identified());
    }
}
