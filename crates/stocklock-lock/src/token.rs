//! Lock tokens and execution context identifiers.
//!
//! A token is `<attempt-id>:<context-id>` and a context id is
//! `<client-id>:<local-context>`. The attempt id is a fresh UUID per
//! acquisition attempt; the client id is a UUID per lock client, so contexts
//! in different processes never compare equal; the local context is the tokio
//! task when there is one, else the OS thread.

use std::fmt::{Display, Formatter};

use uuid::Uuid;

/// Identifies one lock client (normally one per process).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClientId(String);

impl ClientId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClientId {
    fn default() -> Self {
        Self::generate()
    }
}

impl Display for ClientId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies the calling execution context within a client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextId(String);

impl ContextId {
    /// The context of the caller: the current tokio task if called from one,
    /// otherwise the current thread.
    pub fn current(client: &ClientId) -> Self {
        let local = match tokio::task::try_id() {
            Some(task) => format!("task-{}", task),
            None => format!("thread-{:?}", std::thread::current().id()),
        };
        Self(format!("{}:{}", client, local))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContextId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Proof of ownership for one acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken {
    attempt: String,
    context: ContextId,
}

impl LockToken {
    /// Fresh token for an acquisition attempt by `context`.
    pub fn generate(context: &ContextId) -> Self {
        Self {
            attempt: Uuid::new_v4().simple().to_string(),
            context: context.clone(),
        }
    }

    /// Parse a token as stored in the lock record. Returns `None` for values
    /// this crate did not produce.
    pub fn parse(raw: &str) -> Option<Self> {
        let (attempt, context) = raw.split_once(':')?;
        if attempt.is_empty() || context.is_empty() {
            return None;
        }
        Some(Self {
            attempt: attempt.to_string(),
            context: ContextId(context.to_string()),
        })
    }

    pub fn context(&self) -> &ContextId {
        &self.context
    }

    pub fn is_owned_by(&self, context: &ContextId) -> bool {
        &self.context == context
    }
}

impl Display for LockToken {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.attempt, self.context)
    }
}
