use serde::{Deserialize, Serialize};

use chain::{Chain, Value};
use except::RemoteException;

/// What a proxy sends the listener: the chain to apply, plus the handful
/// of options that vary per-call rather than per-proxy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub chain: Chain,
    /// Whether the caller wants the chain's value resolved right away
    /// (true for every operation in this redesign — the builder API always
    /// resolves explicitly rather than leaving an implicit "still
    /// chaining" state on the wire).
    pub get_now: bool,
    /// Substituted for the result when the listener turns out not to be
    /// listening by the time this envelope would have been sent. Carried
    /// here, rather than applied purely proxy-side, so a future transport
    /// that can race sends against a listener shutting down mid-flight
    /// has somewhere to put it.
    pub default: Option<Value>,
    /// Count of `Super` steps at the head of `chain`, informational only:
    /// the listener's execution engine derives super depth from the chain
    /// itself, but wire observers (logs, the relay CLI) read this instead
    /// of re-walking the chain.
    pub super_depth: u32,
}

/// What the listener sends back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Status {
    Ok(Value),
    SelfRef,
    Error(RemoteException),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub status: Status,
}
