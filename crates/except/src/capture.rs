use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A traceback captured at the point an exception was recorded, preserved
/// across serialization the way `__cause__` preserves it across a process
/// boundary in languages with exception chaining.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{0}")]
pub struct RemoteTraceback(pub String);

/// A transport-safe record of an error that occurred while applying a chain
/// (or inside a worker's target function): the original type's name, its
/// message, and a synthetic traceback referencing the capture site.
///
/// This is the record stored in [`LocalExcept`](crate::LocalExcept) groups,
/// and the payload queued by [`Except`](crate::Except) over its channel —
/// the two concerns the design notes flag as conflated. We keep them
/// conflated here too, for the same reason: splitting result and error
/// transport onto separate channels would change observable ordering
/// between `recv()` calls, and that's a correctness-relevant behavior
/// change, not a cleanup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteException {
    type_name: String,
    message: String,
    cause: Option<RemoteTraceback>,
    caught_by: Option<String>,
}

impl RemoteException {
    /// Wrap a live error, formatting a traceback that names the capture
    /// site (the scope name, if any) the way a stack frame would.
    pub fn capture<E: std::error::Error>(err: &E, scope: Option<&str>) -> Self {
        let type_name = std::any::type_name::<E>().to_string();
        let message = err.to_string();
        let frame = scope.unwrap_or("<default>");
        let mut tb = format!(
            "Traceback (most recent call last):\n  in scope \"{frame}\"\n{type_name}: {message}"
        );
        let mut source = err.source();
        while let Some(s) = source {
            tb.push_str(&format!("\ncaused by: {s}"));
            source = s.source();
        }
        Self { type_name, message, cause: Some(RemoteTraceback(tb)), caught_by: None }
    }

    /// Build a record directly, without an originating `E` — used when
    /// reconstituting one that arrived over the wire.
    pub fn new(type_name: impl Into<String>, message: impl Into<String>, traceback: Option<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            cause: traceback.map(RemoteTraceback),
            caught_by: None,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn remote_traceback(&self) -> Option<&str> {
        self.cause.as_ref().map(|c| c.0.as_str())
    }

    pub fn caught_by(&self) -> Option<&str> {
        self.caught_by.as_deref()
    }

    pub(crate) fn tag(&mut self, group: Option<&str>) {
        self.caught_by = group.map(str::to_string);
    }
}

impl fmt::Display for RemoteException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}

impl std::error::Error for RemoteException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_ref().map(|c| c as &(dyn std::error::Error + 'static))
    }
}

impl PartialEq for RemoteException {
    /// Compares the way the test fixtures do: same exception type, same
    /// stringified message. Tracebacks and group tags are provenance, not
    /// identity.
    fn eq(&self, other: &Self) -> bool {
        self.type_name == other.type_name && self.message == other.message
    }
}
