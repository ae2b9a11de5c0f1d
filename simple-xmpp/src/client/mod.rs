// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::fmt;
use core::str::FromStr;
use std::sync::Arc;

use crate::inbound::{Inbound, ListenerSlot, Mailbox};
use crate::jid::{BareJid, Jid};
use crate::muc::{GroupConversation, RoomState, Rooms};
use crate::transport::Transport;
use crate::{Error, Identity, IncomingMessage, TransportError};


/// Lifecycle of a [`MessagingClient`].
///
/// `Disconnected → Connecting → Authenticated → Ready → Closed`, with any
/// failure on the way leading to `Failed`. `Failed` and `Closed` are
/// terminal: a client is never reconnected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClientState {
    /// Configured, nothing sent yet.
    Disconnected,
    Connecting,
    /// Logged in, rooms not joined yet.
    Authenticated,
    /// Logged in and every requested room joined.
    Ready,
    Failed,
    /// Ended by [`MessagingClient::disconnect`].
    Closed,
}

impl fmt::Display for ClientState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClientState::Disconnected => "disconnected",
            ClientState::Connecting => "connecting",
            ClientState::Authenticated => "authenticated",
            ClientState::Ready => "ready",
            ClientState::Failed => "failed",
            ClientState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// One connection to a messaging server, with the chatrooms it takes part in.
///
/// Incoming messages are either pulled with
/// [`next_message`](Self::next_message) or pushed to a callback set with
/// [`register_listener`](Self::register_listener).
///
/// Built through [`ClientBuilder`](crate::ClientBuilder).
pub struct MessagingClient<T: Transport> {
    identity: Identity,
    credential: String,
    nick: String,
    rooms: Rooms,
    state: ClientState,
    transport: T,
    listener: ListenerSlot,
    mailbox: Option<Mailbox>,
}

impl<T: Transport> MessagingClient<T> {
    pub(crate) fn new(
        identity: Identity,
        credential: String,
        rooms: Rooms,
        nick: String,
        transport: T,
    ) -> Self {
        MessagingClient {
            identity,
            credential,
            nick,
            rooms,
            state: ClientState::Disconnected,
            transport,
            listener: ListenerSlot::default(),
            mailbox: None,
        }
    }

    /// Connect, log in and join every configured room.
    ///
    /// Joining is all-or-nothing: every room is tried, and if any of them
    /// fails the ones that succeeded are left again, the session is closed
    /// and [`Error::Join`] lists each failing room. On any error the client
    /// ends up [`Failed`](ClientState::Failed).
    pub async fn connect(&mut self) -> Result<(), Error> {
        if self.state != ClientState::Disconnected {
            return Err(Error::InvalidState(self.state));
        }
        self.state = ClientState::Connecting;

        let (inbound, mailbox) = Inbound::channel(self.listener.clone());
        self.transport.subscribe(inbound);
        self.mailbox = Some(mailbox);

        info!("Connecting to {}...", self.identity.domain());
        if let Err(source) = self.transport.connect(self.identity.domain()).await {
            error!("Impossible to connect to {}: {}", self.identity.domain(), source);
            self.fail().await;
            return Err(Error::Connect {
                domain: self.identity.domain().to_owned(),
                source,
            });
        }

        if let Err(source) = self
            .transport
            .authenticate(self.identity.local(), &self.credential)
            .await
        {
            error!("Impossible to log in as {}: {}", self.identity, source);
            self.fail().await;
            return Err(if source.is_network() {
                Error::Connect {
                    domain: self.identity.domain().to_owned(),
                    source,
                }
            } else {
                // Libraries disagree on how to reject e.g. an empty username,
                // report all of it as an authentication failure.
                Error::Auth {
                    identity: self.identity.to_string(),
                    source,
                }
            });
        }
        self.state = ClientState::Authenticated;
        info!("Logged in as {}.", self.identity);

        let requested: Vec<BareJid> = self.rooms.iter().map(|c| c.room.clone()).collect();
        let mut failed = Vec::new();
        for room in requested {
            info!("Joining room {} as {}...", room, self.nick);
            match self.transport.join_room(&room, &self.nick).await {
                Ok(()) => self.rooms.set_state(&room, RoomState::Joined),
                Err(e) => {
                    error!("Impossible to join room {}: {}", room, e);
                    failed.push((room, e));
                }
            }
        }
        if !failed.is_empty() {
            self.fail().await;
            return Err(Error::Join { rooms: failed });
        }

        self.state = ClientState::Ready;
        Ok(())
    }

    /// Undo a partial connection and mark the client failed.
    async fn fail(&mut self) {
        self.leave_joined_rooms().await;
        if let Err(e) = self.transport.close().await {
            warn!("Failed to close session after error: {}", e);
        }
        self.close_mailbox();
        self.state = ClientState::Failed;
    }

    async fn leave_joined_rooms(&mut self) {
        let joined: Vec<BareJid> = self.rooms.joined().cloned().collect();
        for room in joined {
            if let Err(e) = self.transport.leave_room(&room).await {
                warn!("Failed to leave room {}: {}", room, e);
            }
            self.rooms.set_state(&room, RoomState::Left);
        }
    }

    fn close_mailbox(&mut self) {
        if let Some(mailbox) = self.mailbox.as_mut() {
            mailbox.close();
        }
        self.listener.replace(None);
    }

    /// Map a transport failure on a live session. Losing the connection
    /// fails the client.
    async fn transport_error(&mut self, e: TransportError) -> Error {
        if !e.is_network() {
            return Error::Transport(e);
        }
        error!("Connection of {} lost: {}", self.identity, e);
        self.fail().await;
        Error::NotConnected
    }

    fn ensure_ready(&self) -> Result<(), Error> {
        match self.state {
            ClientState::Ready => Ok(()),
            _ => Err(Error::NotConnected),
        }
    }

    /// Wait for the next incoming message, in arrival order.
    ///
    /// There is no timeout: this waits for as long as nothing arrives. To
    /// give up early, drop the future, e.g. by racing it in
    /// `tokio::select!` or wrapping it in `tokio::time::timeout`. A message
    /// is only taken off the queue when this returns it, so cancelling
    /// loses nothing.
    ///
    /// Messages handed to a registered listener never show up here.
    pub async fn next_message(&mut self) -> Result<IncomingMessage, Error> {
        self.ensure_ready()?;
        let mailbox = self.mailbox.as_mut().ok_or(Error::NotConnected)?;
        match mailbox.recv().await {
            Some(message) => Ok(message),
            None => Err(self.transport_error(TransportError::Disconnected).await),
        }
    }

    /// Take the next queued message, if any, without waiting.
    ///
    /// Finding the session gone marks the client
    /// [`Failed`](ClientState::Failed); call
    /// [`disconnect`](Self::disconnect) to release the transport.
    pub fn try_next_message(&mut self) -> Result<Option<IncomingMessage>, Error> {
        self.ensure_ready()?;
        let mailbox = self.mailbox.as_mut().ok_or(Error::NotConnected)?;
        mailbox.try_recv().map_err(|()| {
            warn!("Connection of {} lost", self.identity);
            self.close_mailbox();
            self.state = ClientState::Failed;
            Error::NotConnected
        })
    }

    /// Call `listener` for every message received from now on, instead of
    /// queueing it for [`next_message`](Self::next_message).
    ///
    /// Replaces any listener registered before. Messages already queued stay
    /// queued.
    ///
    /// The listener runs on the transport's delivery task or thread, never
    /// on the caller's, concurrently with whatever the caller is doing. If it
    /// needs to reach back into the client, e.g. to reply, the caller has to
    /// share the client behind its own lock.
    pub fn register_listener<F>(&self, listener: F)
    where
        F: Fn(IncomingMessage) + Send + Sync + 'static,
    {
        self.listener.replace(Some(Arc::new(listener)));
    }

    /// Go back to queueing messages for [`next_message`](Self::next_message).
    pub fn clear_listener(&self) {
        self.listener.replace(None);
    }

    /// Send a one-to-one message to `to`.
    ///
    /// This returns once the message has been handed to the transport;
    /// there is no delivery confirmation.
    pub async fn send(&mut self, to: &str, body: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        if to.is_empty() {
            return Err(Error::InvalidAddress {
                address: String::new(),
                reason: "empty recipient".to_owned(),
            });
        }
        let to = Jid::from_str(to).map_err(|e| Error::InvalidAddress {
            address: to.to_owned(),
            reason: e.to_string(),
        })?;
        if let Err(e) = self.transport.send_direct(&to, body).await {
            return Err(self.transport_error(e).await);
        }
        Ok(())
    }

    /// Send a message to the only joined room.
    ///
    /// Fails with [`Error::AmbiguousTarget`] unless exactly one room is
    /// joined.
    pub async fn send_to_group(&mut self, body: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        let room = self
            .rooms
            .single_joined()
            .map_err(|joined| Error::AmbiguousTarget { joined })?
            .clone();
        if let Err(e) = self.transport.send_to_room(&room, body).await {
            return Err(self.transport_error(e).await);
        }
        Ok(())
    }

    /// Send a message to `room`, which must be one of the joined rooms.
    pub async fn send_to_room(&mut self, room: &str, body: &str) -> Result<(), Error> {
        self.ensure_ready()?;
        let target = BareJid::from_str(room)
            .ok()
            .and_then(|jid| self.rooms.joined_room(&jid).cloned())
            .ok_or_else(|| Error::UnknownRoom(room.to_owned()))?;
        if let Err(e) = self.transport.send_to_room(&target, body).await {
            return Err(self.transport_error(e).await);
        }
        Ok(())
    }

    /// Leave every joined room and end the session.
    ///
    /// Never fails: problems while leaving are logged and otherwise
    /// ignored. Calling this again, or on a client that never connected,
    /// does nothing. A failed client only releases its transport. Afterwards every operation fails with
    /// [`Error::NotConnected`].
    pub async fn disconnect(&mut self) {
        match self.state {
            ClientState::Closed => return,
            ClientState::Disconnected => {}
            // The session may already be gone.
            ClientState::Failed => {
                if let Err(e) = self.transport.close().await {
                    debug!("Closing failed session: {}", e);
                }
                return;
            }
            // Connecting only remains if a connect() future was dropped halfway.
            ClientState::Connecting | ClientState::Authenticated | ClientState::Ready => {
                self.leave_joined_rooms().await;
                if let Err(e) = self.transport.close().await {
                    warn!("Failed to close session cleanly: {}", e);
                }
                info!("Disconnected {}.", self.identity);
            }
        }
        self.close_mailbox();
        self.state = ClientState::Closed;
    }

    pub fn state(&self) -> ClientState {
        self.state
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// The username, without `@domain`.
    pub fn username(&self) -> &str {
        self.identity.local()
    }

    /// Nickname used in chatrooms.
    pub fn nick(&self) -> &str {
        &self.nick
    }

    /// Every configured room, in the order it was requested.
    pub fn rooms(&self) -> impl Iterator<Item = &GroupConversation> {
        self.rooms.iter()
    }

    pub fn joined_rooms(&self) -> impl Iterator<Item = &BareJid> {
        self.rooms.joined()
    }
}
