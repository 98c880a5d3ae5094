use std::sync::Arc;
use std::time::Duration;

use chain::{Outcome, RemoteTarget};
use duplex::{ChannelClosed, Endpoint, ListeningFlag};
use except::RemoteException;
use tokio::sync::Mutex;

use crate::envelope::{RequestEnvelope, ResponseEnvelope, Status};

/// Runs in the process that owns the root target. Services chains sent by
/// a [`crate::Proxy`] against the root, wrapping failures as
/// [`RemoteException`] rather than ever letting them unwind past a single
/// request.
pub struct Listener<T: ?Sized> {
    root: Arc<Mutex<T>>,
    endpoint: Endpoint<ResponseEnvelope, RequestEnvelope>,
    flag: ListeningFlag,
    fulfill_final: bool,
}

impl<T: RemoteTarget + ?Sized> Listener<T> {
    pub fn new(
        root: Arc<Mutex<T>>,
        endpoint: Endpoint<ResponseEnvelope, RequestEnvelope>,
        flag: ListeningFlag,
        fulfill_final: bool,
    ) -> Self {
        Self { root, endpoint, flag, fulfill_final }
    }

    pub fn flag(&self) -> &ListeningFlag {
        &self.flag
    }

    /// Service at most one pending request. Returns `Ok(false)` if none was
    /// waiting.
    pub async fn poll(&self) -> Result<bool, ChannelClosed> {
        if !self.endpoint.poll().await {
            return Ok(false);
        }
        let request = self.endpoint.recv().await?;
        self.service(request).await
    }

    async fn service(&self, request: RequestEnvelope) -> Result<bool, ChannelClosed> {
        let mut root = self.root.lock().await;
        let status = match chain::execute(&request.chain, &mut *root).await {
            Ok(Outcome::SelfRef) => Status::SelfRef,
            Ok(Outcome::Value(v)) => Status::Ok(v),
            Err(e) => {
                tracing::debug!(error = %e, "chain execution failed");
                Status::Error(RemoteException::capture(&e, None))
            }
        };
        drop(root);
        self.endpoint.send(ResponseEnvelope { status })?;
        Ok(true)
    }

    /// Cooperative poll loop: flips the liveness flag on entry, services
    /// requests until `should_stop` reports true, then — if
    /// `fulfill_final` — drains one last pending request before flipping
    /// the flag back off.
    pub async fn listen_loop(&self, mut should_stop: impl FnMut() -> bool, idle_delay: Duration) {
        self.flag.set(true);
        loop {
            if should_stop() {
                break;
            }
            match self.poll().await {
                Ok(true) => {}
                Ok(false) => tokio::time::sleep(idle_delay).await,
                Err(_) => {
                    tracing::debug!("listener channel closed, stopping");
                    break;
                }
            }
        }
        if self.fulfill_final {
            let _ = self.poll().await;
        }
        self.flag.set(false);
    }
}

impl<T: RemoteTarget + 'static> Listener<T> {
    /// Spawn `listen_loop` on a background task. Awaiting the returned
    /// handle waits for the loop to notice `should_stop` and drain.
    pub fn background_listen(
        self: Arc<Self>,
        mut should_stop: impl FnMut() -> bool + Send + 'static,
        idle_delay: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move { self.listen_loop(&mut should_stop, idle_delay).await })
    }
}
