use thiserror::Error;

use except::RemoteException;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker raised: {0}")]
    Remote(#[source] RemoteException),

    #[error("join timed out")]
    JoinTimeout,

    #[error("exception injection is only supported for thread-mode workers")]
    ThrowUnsupported,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<RemoteException> for WorkerError {
    fn from(exc: RemoteException) -> Self {
        WorkerError::Remote(exc)
    }
}
