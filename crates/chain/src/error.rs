use thiserror::Error;

/// Errors raised while applying a [`Chain`](crate::Chain) against a
/// [`RemoteTarget`](crate::RemoteTarget).
///
/// These are the errors that travel back to the caller wrapped as a
/// `RemoteException` (see the `except` crate); they are never swallowed by
/// the listener.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ChainError {
    #[error("no such attribute: {0}")]
    NoSuchAttr(String),
    #[error("value is not indexable")]
    NotIndexable,
    #[error("index out of range")]
    IndexOutOfRange,
    #[error("value is not callable")]
    NotCallable,
    #[error("type mismatch applying operation")]
    TypeMismatch,
    #[error("cannot mutate a value detached from the root target")]
    ImmutableValue,
    #[error("`super` may only follow the root or another `super`")]
    SuperNotAtRoot,
    #[error("requested superclass depth {0} exceeds the target's inheritance chain")]
    SuperDepthExceeded(u32),
    #[error("no passto function registered under name '{0}'")]
    UnknownPassTo(String),
    #[error("{0}")]
    Failed(String),
}
