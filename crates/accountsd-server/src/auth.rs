//! Authorization gate in front of every privileged method.

use crate::sys::peer::Subject;
use async_trait::async_trait;
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("not authorized for {0}")]
    NotAuthorized(String),

    #[error("authorization check failed: {0}")]
    CheckFailed(String),
}

/// Asynchronous permission check. Resolves exactly once; nothing privileged
/// may run before it resolves `Ok`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Authority: Send + Sync {
    async fn check(
        &self,
        subject: &Subject,
        action_id: &str,
        allow_interactive: bool,
    ) -> Result<(), AuthError>;
}

/// Grants root and a fixed set of administrator uids, denies everyone else.
#[derive(Debug, Clone, Default)]
pub struct StaticPolicy {
    admin_uids: HashSet<u32>,
}

impl StaticPolicy {
    pub fn new<I: IntoIterator<Item = u32>>(admin_uids: I) -> Self {
        Self {
            admin_uids: admin_uids.into_iter().collect(),
        }
    }
}

#[async_trait]
impl Authority for StaticPolicy {
    async fn check(
        &self,
        subject: &Subject,
        action_id: &str,
        allow_interactive: bool,
    ) -> Result<(), AuthError> {
        if subject.uid == 0 || self.admin_uids.contains(&subject.uid) {
            return Ok(());
        }
        // no agent to challenge, so interactive callers are refused like the rest
        tracing::debug!(uid = subject.uid, action_id, allow_interactive, "authorization refused");
        Err(AuthError::NotAuthorized(action_id.to_string()))
    }
}
