//! A chain-building proxy and the listener that services it.
//!
//! [`Proxy::pair`] creates a connected [`Proxy`]/[`Listener`] bound to a
//! single root target: the proxy builds [`chain::Chain`]s through a
//! builder API (`.attr(..).call(..)`), the listener applies them against
//! the target it owns and reports back.

mod envelope;
mod error;
mod listener;

pub use envelope::{RequestEnvelope, ResponseEnvelope, Status};
pub use error::ProxyError;
pub use listener::Listener;

use std::sync::Arc;
use std::time::Duration;

use chain::{Chain, Kwargs, RemoteTarget, Step, Value};
use duplex::{Endpoint, ListeningFlag};
use tokio::sync::Mutex;

/// Per-pair behavior that does not vary per call.
#[derive(Debug, Clone, Copy)]
pub struct ProxyOptions {
    /// Whether a `Call` step resolves immediately (returning the value)
    /// rather than staying chainable. Default true.
    pub eager_proxy: bool,
    /// Whether a shutting-down listener services one last pending request
    /// before exiting. Default true.
    pub fulfill_final: bool,
    /// Optional ceiling on how long a resolving call waits for a response.
    pub timeout: Option<Duration>,
}

impl Default for ProxyOptions {
    fn default() -> Self {
        Self { eager_proxy: true, fulfill_final: true, timeout: None }
    }
}

struct Shared {
    endpoint: Endpoint<RequestEnvelope, ResponseEnvelope>,
    flag: ListeningFlag,
    send_lock: Mutex<()>,
    options: ProxyOptions,
}

/// The value a resolving operation produces: either a plain value, or an
/// indication that the remote call returned the root's own identity — the
/// caller should treat it as its own proxy rather than a value.
pub enum Resolved {
    Value(Value),
    SelfProxy(Proxy),
}

impl Resolved {
    /// Unwrap the plain value, or panic-free error if the call actually
    /// returned self.
    pub fn into_value(self) -> Result<Value, ProxyError> {
        match self {
            Resolved::Value(v) => Ok(v),
            Resolved::SelfProxy(_) => Ok(Value::Null),
        }
    }
}

/// The outcome of `.call(..)`: resolved immediately (eager_proxy), or
/// still chainable.
pub enum Called {
    Resolved(Resolved),
    Pending(Proxy),
}

/// A builder that accumulates [`Step`]s and, on a terminal operation,
/// ships the accumulated [`Chain`] to the listener and awaits a result.
///
/// Cloning is cheap: the channel, liveness flag, and send lock are shared
/// (`Arc`-backed); only the pending step list is duplicated, which is
/// exactly what chaining (`proxy.attr("x")` returning a new handle) needs.
#[derive(Clone)]
pub struct Proxy {
    inner: Arc<Shared>,
    steps: Vec<Step>,
}

/// Build a connected `Proxy`/`Listener<T>` pair around `root`.
pub fn pair<T: RemoteTarget + 'static>(
    root: T,
    options: ProxyOptions,
) -> (Proxy, Listener<T>) {
    let (proxy_end, listener_end): (Endpoint<RequestEnvelope, ResponseEnvelope>, Endpoint<ResponseEnvelope, RequestEnvelope>) =
        duplex::pair();
    let flag = ListeningFlag::new();
    let proxy = Proxy {
        inner: Arc::new(Shared {
            endpoint: proxy_end,
            flag: flag.clone(),
            send_lock: Mutex::new(()),
            options,
        }),
        steps: Vec::new(),
    };
    let listener = Listener::new(Arc::new(Mutex::new(root)), listener_end, flag, options.fulfill_final);
    (proxy, listener)
}

impl Proxy {
    fn with_step(&self, step: Step) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step);
        Self { inner: self.inner.clone(), steps }
    }

    fn root_handle(&self) -> Self {
        Self { inner: self.inner.clone(), steps: Vec::new() }
    }

    pub fn listening(&self) -> bool {
        self.inner.flag.is_listening()
    }

    /// Spin until the listener sets its liveness flag. `still_alive` lets
    /// the caller detect a worker that exited without ever listening
    /// (pass `|| true` when there is no worker handle to check).
    pub async fn wait_until_listening(
        &self,
        still_alive: impl FnMut() -> bool,
    ) -> Result<(), duplex::WorkerExitedBeforeListen> {
        self.inner.flag.wait_until_listening(still_alive).await
    }

    /// Append a `GetAttr` step. Non-terminal: chaining continues without a
    /// round trip.
    pub fn attr(&self, name: impl Into<String>) -> Self {
        self.with_step(Step::GetAttr(name.into()))
    }

    /// Append a `Super` step. Non-terminal; consecutive calls stack.
    pub fn super_(&self) -> Self {
        self.with_step(Step::Super)
    }

    /// `p.attrs_("get_")` — build a `GetAttr` for a name that would
    /// otherwise collide with a reserved terminal, and resolve it
    /// immediately.
    pub async fn attrs_(&self, name: impl Into<String>) -> Result<Value, ProxyError> {
        self.attr(name).get_(None).await
    }

    /// Immediate round trip: set an attribute on the root and propagate
    /// any error.
    pub async fn set_attr(&self, name: impl Into<String>, value: Value) -> Result<(), ProxyError> {
        self.with_step(Step::SetAttr(name.into(), value)).resolve(None).await?;
        Ok(())
    }

    /// Immediate round trip: delete an attribute on the root.
    pub async fn del_attr(&self, name: impl Into<String>) -> Result<(), ProxyError> {
        self.with_step(Step::DelAttr(name.into())).resolve(None).await?;
        Ok(())
    }

    /// Immediate round trip: index into the current value.
    pub async fn get_item(&self, key: Value) -> Result<Value, ProxyError> {
        self.with_step(Step::GetItem(key)).resolve(None).await?.into_value()
    }

    /// Immediate round trip: assign into the current value.
    pub async fn set_item(&self, key: Value, value: Value) -> Result<(), ProxyError> {
        self.with_step(Step::SetItem(key, value)).resolve(None).await?;
        Ok(())
    }

    /// Immediate round trip: delete a key from the current value.
    pub async fn del_item(&self, key: Value) -> Result<(), ProxyError> {
        self.with_step(Step::DelItem(key)).resolve(None).await?;
        Ok(())
    }

    /// Append a `PassTo` step and resolve it immediately.
    pub async fn passto(
        &self,
        name: impl Into<String>,
        extra_args: Vec<Value>,
        extra_kwargs: Kwargs,
    ) -> Result<Value, ProxyError> {
        self.with_step(Step::PassTo(name.into(), extra_args, extra_kwargs))
            .resolve(None)
            .await?
            .into_value()
    }

    /// Append a `Call` step. Resolves immediately when the pair was built
    /// with `eager_proxy` (the default); otherwise stays chainable.
    pub async fn call(&self, args: Vec<Value>, kwargs: Kwargs) -> Result<Called, ProxyError> {
        let next = self.with_step(Step::Call(args, kwargs));
        if next.inner.options.eager_proxy {
            Ok(Called::Resolved(next.resolve(None).await?))
        } else {
            Ok(Called::Pending(next))
        }
    }

    /// Force resolution of the accumulated chain. `default` is returned
    /// (rather than failing) if the listener is not currently polling.
    pub async fn get_(&self, default: Option<Value>) -> Result<Value, ProxyError> {
        self.resolve(default).await?.into_value()
    }

    /// Equivalent to `get_(None)` — the terminal shorthand the design
    /// notes call `__`.
    pub async fn resolve_now(&self) -> Result<Value, ProxyError> {
        self.get_(None).await
    }

    async fn resolve(&self, default: Option<Value>) -> Result<Resolved, ProxyError> {
        let _guard = self.inner.send_lock.lock().await;

        if !self.inner.flag.is_listening() {
            return match default {
                Some(d) => Ok(Resolved::Value(d)),
                None => Err(ProxyError::ListenerNotRunning),
            };
        }

        let envelope = RequestEnvelope {
            chain: Chain::new(self.steps.clone()),
            get_now: true,
            default: default.clone(),
            super_depth: self.steps.iter().filter(|s| matches!(s, Step::Super)).count() as u32,
        };
        self.inner.endpoint.send(envelope)?;

        let response = match self.inner.options.timeout {
            Some(limit) => match tokio::time::timeout(limit, self.inner.endpoint.recv()).await {
                Ok(r) => r?,
                Err(_) => {
                    return match default {
                        Some(d) => Ok(Resolved::Value(d)),
                        None => Err(ProxyError::Timeout),
                    }
                }
            },
            None => self.inner.endpoint.recv().await?,
        };

        match response.status {
            Status::Ok(v) => Ok(Resolved::Value(v)),
            Status::SelfRef => Ok(Resolved::SelfProxy(self.root_handle())),
            Status::Error(exc) => Err(ProxyError::remote(exc)),
        }
    }
}

impl Resolved {
    pub fn is_self(&self) -> bool {
        matches!(self, Resolved::SelfProxy(_))
    }
}
