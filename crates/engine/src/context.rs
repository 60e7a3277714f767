//! Explicit acting-context for state-mutating operations.
//!
//! The actor, source IP, and user agent are threaded through every call as
//! parameters -- there is no ambient session state to pull them from at
//! audit-write time.

use sgdea_core::types::DbId;

/// Who (and from where) is performing an operation.
#[derive(Debug, Clone, Default)]
pub struct ActionContext {
    /// Acting user; `None` for system-initiated operations (sweeps).
    pub actor_id: Option<DbId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
}

impl ActionContext {
    /// Context for a user-invoked operation.
    pub fn user(actor_id: DbId) -> Self {
        Self {
            actor_id: Some(actor_id),
            ..Self::default()
        }
    }

    /// Context for scheduler-initiated operations.
    pub fn system() -> Self {
        Self::default()
    }

    pub fn with_request_info(
        mut self,
        ip_address: Option<String>,
        user_agent: Option<String>,
    ) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent;
        self
    }
}
