use std::ops::Deref;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capture::RemoteException;
use crate::local::LocalExcept;

/// What crosses the wire between the two ends of an [`Except`] pair. The
/// worker side pushes one of these per event inside a wrapped call; the
/// parent side folds them into its own `LocalExcept` state via `pull()`.
///
/// Results and errors share this one channel rather than two, on purpose:
/// keeping them interleaved preserves the order a caller observes them in
/// relative to each other, which splitting onto separate channels would
/// not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ChannelMessage<T> {
    Return(T),
    Yield(T),
    YieldEnd,
    Error { group: Option<String>, exc: RemoteException },
}

/// An exception/result facility shared between two ends of a channel — a
/// worker and whoever supervises it. Both ends hold an `Except<T>` of the
/// same type, created together by [`channel`]; each wraps its own
/// [`LocalExcept`] for synchronous, in-process bookkeeping, plus the
/// transport that ferries events to the far side.
pub struct Except<T = serde_json::Value> {
    local: LocalExcept<T>,
    endpoint: duplex::Endpoint<ChannelMessage<T>, ChannelMessage<T>>,
}

/// Create a connected pair. `raises`/`catch_once` set the default scope
/// behavior each side's `LocalExcept` is constructed with.
pub fn channel<T>(raises: bool, catch_once: bool) -> (Except<T>, Except<T>) {
    let (a, b) = duplex::pair();
    (
        Except { local: LocalExcept::new(raises, catch_once), endpoint: a },
        Except { local: LocalExcept::new(raises, catch_once), endpoint: b },
    )
}

impl<T> Deref for Except<T> {
    type Target = LocalExcept<T>;

    fn deref(&self) -> &Self::Target {
        &self.local
    }
}

impl<T: Clone + Send + 'static> Except<T> {
    /// As [`LocalExcept::wrap_value`], and additionally ships the outcome
    /// to the far side.
    pub fn wrap_value<E>(&self, f: impl FnOnce() -> Result<T, E>) -> Option<T>
    where
        E: std::error::Error + 'static,
    {
        match self.local.scope().raises(false).catch_once(true).run(f) {
            Ok(Some(v)) => {
                self.local.set_result(v.clone());
                let _ = self.endpoint.send(ChannelMessage::Return(v.clone()));
                Some(v)
            }
            Ok(None) => {
                self.ship_last_error();
                None
            }
            Err(_) => unreachable!("raises(false).catch_once(true) scopes never propagate"),
        }
    }

    pub fn push_yield(&self, value: T) {
        self.local.push_yield(value.clone());
        let _ = self.endpoint.send(ChannelMessage::Yield(value));
    }

    pub fn close_yield(&self) {
        self.local.close_yield();
        let _ = self.endpoint.send(ChannelMessage::YieldEnd);
    }

    pub fn wrap_iter<I: Iterator<Item = T>>(&self, f: impl FnOnce() -> I) {
        for item in f() {
            self.push_yield(item);
        }
        self.close_yield();
    }

    pub fn wrap_try_iter<I, E>(&self, f: impl FnOnce() -> Result<I, E>) -> Option<()>
    where
        I: Iterator<Item = T>,
        E: std::error::Error + 'static,
    {
        let result = self.local.scope().raises(false).catch_once(true).run(|| -> Result<(), E> {
            for item in f()? {
                self.push_yield(item);
            }
            Ok(())
        });
        self.close_yield();
        match result {
            Ok(v) => {
                if v.is_none() {
                    self.ship_last_error();
                }
                v
            }
            Err(_) => unreachable!("raises(false).catch_once(true) scopes never propagate"),
        }
    }

    fn ship_last_error(&self) {
        if let Some(exc) = self.local.last() {
            let group = exc.caught_by().map(str::to_string);
            let _ = self.endpoint.send(ChannelMessage::Error { group, exc });
        }
    }

    /// Drain every event currently waiting on the channel into this side's
    /// `LocalExcept`. Non-blocking: returns once nothing more is pending.
    /// A closed channel (the far side exited) is logged and treated as
    /// simply having nothing left to drain.
    pub async fn pull(&self) {
        while self.endpoint.poll().await {
            match self.endpoint.recv().await {
                Ok(msg) => self.apply(msg),
                Err(_) => {
                    debug!("except channel closed while pulling");
                    break;
                }
            }
        }
    }

    fn apply(&self, msg: ChannelMessage<T>) {
        match msg {
            ChannelMessage::Return(v) => self.local.set_result(v),
            ChannelMessage::Yield(v) => self.local.push_yield(v),
            ChannelMessage::YieldEnd => self.local.close_yield(),
            ChannelMessage::Error { group, exc } => self.local.set(exc, group),
        }
    }
}
