use async_trait::async_trait;

use crate::error::ChainError;
use crate::value::{Kwargs, Value};

/// The result of dispatching an operation against the root (or a
/// superclass view of it): either a plain value, or an indication that the
/// operation returned the root's own identity (the caller substitutes its
/// own proxy handle rather than receiving the root back over the wire).
#[derive(Debug, Clone)]
pub enum Outcome {
    SelfRef,
    Value(Value),
}

/// The object a [`Listener`](../proxy/struct.Listener.html) owns and applies
/// chains against.
///
/// Implementors provide one Rust method per [`Step`](crate::Step) variant
/// that can dispatch to the root (GetAttr, SetAttr, ... Call), plus
/// `as_value` (used when a chain ends, or when `passto` is applied, while
/// still bound to the root) and `max_super_depth` (how many `super` steps
/// are legal, mirroring the target's inheritance chain).
///
/// `depth` is 0 for the target itself, and N for the view obtained after N
/// consecutive `Super` steps.
#[async_trait]
pub trait RemoteTarget: Send + Sync {
    async fn get_attr(&self, depth: u32, name: &str) -> Result<Value, ChainError>;
    async fn set_attr(&mut self, depth: u32, name: &str, value: Value) -> Result<(), ChainError>;
    async fn del_attr(&mut self, depth: u32, name: &str) -> Result<(), ChainError>;
    async fn call(
        &mut self,
        depth: u32,
        member: Option<&str>,
        args: Vec<Value>,
        kwargs: Kwargs,
    ) -> Result<Outcome, ChainError>;
    async fn get_item(&self, depth: u32, key: Value) -> Result<Value, ChainError>;
    async fn set_item(&mut self, depth: u32, key: Value, value: Value) -> Result<(), ChainError>;
    async fn del_item(&mut self, depth: u32, key: Value) -> Result<(), ChainError>;

    /// A snapshot of the root (or its superclass view), used as the
    /// argument to `passto` when the chain has not fallen off the root yet.
    fn as_value(&self, depth: u32) -> Value;

    /// How many consecutive `Super` steps this target supports. 0 means
    /// the target has no modeled base class.
    fn max_super_depth(&self) -> u32 {
        0
    }

    /// Apply a named, listener-registered callable to `current`. The
    /// default rejects every name; targets that want `passto` support
    /// override this to dispatch into their own function table.
    fn passto(
        &self,
        name: &str,
        _current: Value,
        _extra_args: Vec<Value>,
        _extra_kwargs: Kwargs,
    ) -> Result<Value, ChainError> {
        Err(ChainError::UnknownPassTo(name.to_string()))
    }
}
