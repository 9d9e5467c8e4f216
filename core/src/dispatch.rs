//! Handles a process hook uses to feed its dispatch queue.
//!
//! Both handles write into the same ordered queue; the runtime drains it in
//! submission order until a [`QueueMessage::Complete`] arrives, every handle
//! is dropped, or the instance is cancelled.

use crate::effect::Effect;
use tokio::sync::mpsc;

/// Message on an instance's dispatch queue.
#[derive(Debug)]
pub enum QueueMessage {
    /// Something to dispatch.
    Effect(Effect),

    /// No more effects follow.
    Complete,
}

/// Sending half of a dispatch queue.
pub type QueueSender = mpsc::UnboundedSender<QueueMessage>;

/// Receiving half of a dispatch queue.
pub type QueueReceiver = mpsc::UnboundedReceiver<QueueMessage>;

/// Create an empty dispatch queue.
#[must_use]
pub fn queue() -> (QueueSender, QueueReceiver) {
    mpsc::unbounded_channel()
}

/// Options for a single `dispatch` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchOptions {
    /// In single-callback mode, keep the queue open after this dispatch.
    pub allow_more: bool,
}

impl DispatchOptions {
    /// Keep the queue open after this dispatch.
    #[must_use]
    pub const fn allow_more() -> Self {
        Self { allow_more: true }
    }
}

/// Dispatch callback given to process hooks.
#[derive(Debug, Clone)]
pub struct Dispatch {
    tx: QueueSender,
    single_shot: bool,
}

impl Dispatch {
    /// Wrap a queue sender. With `single_shot`, the first dispatch completes
    /// the queue unless [`DispatchOptions::allow_more`] is set.
    #[must_use]
    pub const fn new(tx: QueueSender, single_shot: bool) -> Self {
        Self { tx, single_shot }
    }

    /// Queue an effect. Returns `false` once the instance stopped listening.
    pub fn dispatch(&self, effect: impl Into<Effect>) -> bool {
        self.dispatch_with(effect, DispatchOptions::default())
    }

    /// Queue an effect with options.
    pub fn dispatch_with(&self, effect: impl Into<Effect>, options: DispatchOptions) -> bool {
        let sent = self.tx.send(QueueMessage::Effect(effect.into())).is_ok();
        if self.single_shot && !options.allow_more {
            let _ = self.tx.send(QueueMessage::Complete);
        }
        sent
    }

    /// Whether the instance stopped listening (completed or cancelled).
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Completion callback given to multi-dispatch process hooks.
#[derive(Debug)]
pub struct Done {
    tx: QueueSender,
}

impl Done {
    /// Wrap a queue sender.
    #[must_use]
    pub const fn new(tx: QueueSender) -> Self {
        Self { tx }
    }

    /// Signal that no more dispatches follow.
    pub fn done(self) {
        let _ = self.tx.send(QueueMessage::Complete);
    }
}
