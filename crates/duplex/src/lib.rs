//! A duplex channel pair and the shared liveness flag a [`Listener`] uses to
//! advertise "I am polling right now".
//!
//! `pair::<A, B>()` hands back two [`Endpoint`]s: the near side can send `A`
//! and receive `B`, the far side the reverse. Both directions are backed by
//! an unbounded `tokio::sync::mpsc` channel; `recv`/`poll` additionally keep
//! a one-slot buffer so that a non-blocking `poll()` can look ahead without
//! losing the message it peeked at.

mod flag;

pub use flag::{ListeningFlag, WorkerExitedBeforeListen};

use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// The channel endpoint, or the process on the other end of it, has gone
/// away. Mirrors the taxonomy's `ChannelClosedError`: callers treat this as
/// a hard failure, while the exception reader tolerates and logs it.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("channel is closed")]
pub struct ChannelClosed;

/// One side of a duplex channel: sends messages of type `Out`, receives
/// messages of type `In`.
pub struct Endpoint<Out, In> {
    tx: mpsc::UnboundedSender<Out>,
    rx: Mutex<mpsc::UnboundedReceiver<In>>,
    buffered: Mutex<Option<In>>,
}

impl<Out, In> Endpoint<Out, In> {
    /// Send a message. Ordered with respect to other sends from this
    /// endpoint; never blocks (the underlying queue is unbounded).
    pub fn send(&self, msg: Out) -> Result<(), ChannelClosed> {
        self.tx.send(msg).map_err(|_| {
            tracing::trace!("send on a closed duplex endpoint");
            ChannelClosed
        })
    }

    /// Receive the next message, waiting for one to arrive. Returns
    /// messages in send order.
    pub async fn recv(&self) -> Result<In, ChannelClosed> {
        if let Some(msg) = self.buffered.lock().await.take() {
            return Ok(msg);
        }
        let mut rx = self.rx.lock().await;
        rx.recv().await.ok_or(ChannelClosed)
    }

    /// Non-blocking: is there a message waiting? If one is found it is
    /// buffered so a following `recv()` returns it rather than re-polling
    /// the underlying queue.
    pub async fn poll(&self) -> bool {
        let mut buffered = self.buffered.lock().await;
        if buffered.is_some() {
            return true;
        }
        let mut rx = self.rx.lock().await;
        match rx.try_recv() {
            Ok(msg) => {
                *buffered = Some(msg);
                true
            }
            Err(_) => false,
        }
    }
}

/// Create a new duplex pair. The near endpoint sends `A` and receives `B`;
/// the far endpoint sends `B` and receives `A`.
pub fn pair<A, B>() -> (Endpoint<A, B>, Endpoint<B, A>) {
    let (tx_a, rx_a) = mpsc::unbounded_channel();
    let (tx_b, rx_b) = mpsc::unbounded_channel();
    let near = Endpoint { tx: tx_a, rx: Mutex::new(rx_b), buffered: Mutex::new(None) };
    let far = Endpoint { tx: tx_b, rx: Mutex::new(rx_a), buffered: Mutex::new(None) };
    (near, far)
}

/// A one-directional channel: the only flow is `send`r → `recv`r. Used by
/// the exception facility, which only ever pushes worker-side records to
/// the parent.
pub fn one_way<T>() -> (Endpoint<T, std::convert::Infallible>, Endpoint<std::convert::Infallible, T>) {
    pair()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn send_recv_round_trip() {
        let (near, far): (Endpoint<i32, i32>, Endpoint<i32, i32>) = pair();
        near.send(7).unwrap();
        assert_eq!(far.recv().await.unwrap(), 7);
        far.send(8).unwrap();
        assert_eq!(near.recv().await.unwrap(), 8);
    }

    #[tokio::test]
    async fn poll_then_recv_sees_the_same_message() {
        let (near, far): (Endpoint<&str, &str>, Endpoint<&str, &str>) = pair();
        near.send("hi").unwrap();
        assert!(far.poll().await);
        assert!(far.poll().await); // idempotent
        assert_eq!(far.recv().await.unwrap(), "hi");
    }

    #[tokio::test]
    async fn poll_is_false_with_nothing_pending() {
        let (_near, far): (Endpoint<&str, &str>, Endpoint<&str, &str>) = pair();
        assert!(!far.poll().await);
    }

    #[tokio::test]
    async fn dropping_the_far_side_surfaces_as_channel_closed() {
        let (near, far): (Endpoint<i32, i32>, Endpoint<i32, i32>) = pair();
        drop(far);
        assert_eq!(near.send(1), Err(ChannelClosed));
        let (near, far): (Endpoint<i32, i32>, Endpoint<i32, i32>) = pair();
        drop(near);
        assert_eq!(far.recv().await, Err(ChannelClosed));
    }
}
