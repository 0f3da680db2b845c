//! The outbound message stream.
//!
//! The stream is created on first subscription and can be taken exactly
//! once. It never ends while the engine is alive. Messages emitted before
//! anyone subscribed are dropped; the operations among them stay pending in
//! the log.

use crate::error::{EngineError, Result};
use crate::message::Message;
use futures::Stream;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::trace;

/// Receiving half handed to the transport.
#[derive(Debug)]
pub struct Outbound {
    rx: mpsc::UnboundedReceiver<Message>,
}

impl Outbound {
    /// Next message if one is queued, without waiting.
    pub fn try_next(&mut self) -> Option<Message> {
        self.rx.try_recv().ok()
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<Message> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

impl Stream for Outbound {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.rx.poll_recv(cx)
    }
}

#[derive(Debug)]
enum SinkState {
    Unsubscribed,
    Live(mpsc::UnboundedSender<Message>),
    Closed,
}

/// Sending half owned by the engine.
#[derive(Debug)]
pub(crate) struct OutboundSink {
    state: SinkState,
    dropped: u64,
}

impl OutboundSink {
    pub(crate) fn new() -> Self {
        Self {
            state: SinkState::Unsubscribed,
            dropped: 0,
        }
    }

    pub(crate) fn subscribe(&mut self) -> Result<Outbound> {
        match self.state {
            SinkState::Unsubscribed => {
                let (tx, rx) = mpsc::unbounded_channel();
                self.state = SinkState::Live(tx);
                Ok(Outbound { rx })
            }
            SinkState::Live(_) | SinkState::Closed => Err(EngineError::OutboundTaken),
        }
    }

    pub(crate) fn emit(&mut self, message: Message) {
        let SinkState::Live(tx) = &self.state else {
            trace!(kind = message.kind(), "no outbound subscriber, dropping");
            self.dropped += 1;
            return;
        };
        if tx.send(message).is_err() {
            // The receiver is gone; the stream cannot be restarted.
            self.state = SinkState::Closed;
            self.dropped += 1;
        }
    }

    pub(crate) fn is_subscribed(&self) -> bool {
        matches!(self.state, SinkState::Live(_))
    }

    pub(crate) fn dropped(&self) -> u64 {
        self.dropped
    }
}
