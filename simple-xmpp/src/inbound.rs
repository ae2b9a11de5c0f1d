// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Delivery path for incoming messages.
//!
//! The transport holds an [`Inbound`] and calls [`Inbound::deliver`] from
//! whatever task or thread it receives on. Each message goes to the
//! registered listener if there is one, and into the client's FIFO
//! [`Mailbox`] otherwise.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;

use crate::IncomingMessage;

/// Callback invoked for every incoming message.
pub type Listener = Arc<dyn Fn(IncomingMessage) + Send + Sync>;

/// The single listener slot shared between a client and its transport.
#[derive(Clone, Default)]
pub(crate) struct ListenerSlot(Arc<Mutex<Option<Listener>>>);

impl ListenerSlot {
    pub(crate) fn replace(&self, listener: Option<Listener>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = listener;
    }

    fn current(&self) -> Option<Listener> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Producer side of a client's delivery path, handed to the transport.
#[derive(Clone)]
pub struct Inbound {
    queue: mpsc::UnboundedSender<IncomingMessage>,
    listener: ListenerSlot,
}

impl Inbound {
    pub(crate) fn channel(listener: ListenerSlot) -> (Inbound, Mailbox) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Inbound { queue: tx, listener }, Mailbox { rx })
    }

    /// Hand a message to the client.
    ///
    /// Returns `false` if the client is gone and the message was dropped.
    pub fn deliver(&self, message: IncomingMessage) -> bool {
        // The lock is released before calling out, so the listener may
        // replace itself.
        if let Some(listener) = self.listener.current() {
            listener(message);
            return true;
        }
        match self.queue.send(message) {
            Ok(()) => true,
            Err(mpsc::error::SendError(message)) => {
                debug!("Dropping message from {}, client is gone", message.from);
                false
            }
        }
    }

    /// Whether the client side has gone away.
    pub fn is_closed(&self) -> bool {
        self.queue.is_closed()
    }
}

/// Consumer side of the delivery path, owned by the client.
pub(crate) struct Mailbox {
    rx: mpsc::UnboundedReceiver<IncomingMessage>,
}

impl Mailbox {
    /// Wait for the next queued message, `None` once every [`Inbound`] is
    /// dropped and the queue is drained.
    ///
    /// Cancel safe: dropping the future never loses a message.
    pub(crate) async fn recv(&mut self) -> Option<IncomingMessage> {
        self.rx.recv().await
    }

    pub(crate) fn try_recv(&mut self) -> Result<Option<IncomingMessage>, ()> {
        match self.rx.try_recv() {
            Ok(message) => Ok(Some(message)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(()),
        }
    }

    pub(crate) fn close(&mut self) {
        self.rx.close();
    }
}
