use thiserror::Error;

use except::RemoteException;

/// Errors surfaced to a caller driving a [`crate::Proxy`].
#[derive(Debug, Error)]
pub enum ProxyError {
    /// The chain was applied on the listener side and the target raised.
    /// Carries the original error's type name, message, and a synthetic
    /// traceback (see [`RemoteException`]).
    #[error("remote execution failed: {0}")]
    RemoteExecution(#[source] RemoteException),

    /// The operation has no `default` and the listener is not currently
    /// polling for requests.
    #[error("listener is not running")]
    ListenerNotRunning,

    /// The duplex channel backing this proxy broke mid-exchange.
    #[error(transparent)]
    ChannelClosed(#[from] duplex::ChannelClosed),

    /// A response did not arrive within the proxy's configured timeout.
    #[error("timed out waiting for a response")]
    Timeout,
}

impl ProxyError {
    pub fn remote(exc: RemoteException) -> Self {
        Self::RemoteExecution(exc)
    }
}
