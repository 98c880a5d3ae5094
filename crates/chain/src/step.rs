use serde::{Deserialize, Serialize};

use crate::value::{Kwargs, Value};

/// A single deferred operation recorded while a caller builds an expression
/// through the proxy builder API (`proxy.attr("x").call(..)`, etc).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Step {
    GetAttr(String),
    SetAttr(String, Value),
    DelAttr(String),
    Call(Vec<Value>, Kwargs),
    GetItem(Value),
    SetItem(Value, Value),
    DelItem(Value),
    /// Apply a registered callable, named on the listener side, to the
    /// current value: `passto(f, *extra_args, **extra_kwargs)`.
    PassTo(String, Vec<Value>, Kwargs),
    /// Rebind the current value to the superclass view of the root, one
    /// level up. Consecutive `Super` steps stack.
    Super,
}

/// An ordered sequence of [`Step`]s, always applied against the listener's
/// root target from scratch — intermediate values never outlive a single
/// chain's execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Chain {
    steps: Vec<Step>,
}

impl Chain {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    pub fn single(step: Step) -> Self {
        Self { steps: vec![step] }
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn push(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
