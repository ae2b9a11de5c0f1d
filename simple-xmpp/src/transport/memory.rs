// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! In-process server and transport.
//!
//! A [`MemoryServer`] plays the part of the XMPP server: it knows a set of
//! accounts, can be told to refuse some chatrooms, records everything clients
//! send, and lets the caller inject incoming messages from any thread.
//!
//! ```
//! # use simple_xmpp::transport::memory::MemoryServer;
//! # use simple_xmpp::ClientBuilder;
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let server = MemoryServer::new();
//! server.add_account("bot@example.org", "secret");
//!
//! let mut client = ClientBuilder::new("bot@example.org", "secret")
//!     .connect(server.transport())
//!     .await
//!     .unwrap();
//!
//! server.deliver_direct("alice@example.org", "hello");
//! assert_eq!(client.next_message().await.unwrap().body, "hello");
//! # }
//! ```

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::jid::{BareJid, Jid};
use crate::transport::Transport;
use crate::{Inbound, IncomingMessage, TransportError};

/// Something a client sent through a [`MemoryTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SentMessage {
    Direct { to: Jid, body: String },
    Group { room: BareJid, body: String },
}

#[derive(Default)]
struct ServerState {
    // Bare address -> credential
    accounts: HashMap<String, String>,
    unreachable: HashSet<String>,
    refused_rooms: HashSet<BareJid>,
    refused_leaves: HashSet<BareJid>,
    // Room -> nick, in join order
    occupied: Vec<(BareJid, String)>,
    sent: Vec<SentMessage>,
    connection_attempts: usize,
    logged_in: bool,
    // Delivery sink of the logged-in client, if it subscribed
    session: Option<Inbound>,
}

/// Handle onto a shared in-process server. Clones refer to the same server.
#[derive(Clone, Default)]
pub struct MemoryServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryServer {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A transport connected to this server.
    pub fn transport(&self) -> MemoryTransport {
        MemoryTransport {
            server: self.clone(),
            inbound: None,
            domain: None,
            user: None,
        }
    }

    /// Allow `address` (`local@domain`) to log in with `credential`.
    pub fn add_account(&self, address: &str, credential: &str) {
        self.state()
            .accounts
            .insert(address.to_owned(), credential.to_owned());
    }

    /// Make connections to `domain` fail as if nothing was listening.
    pub fn set_unreachable(&self, domain: &str) {
        self.state().unreachable.insert(domain.to_owned());
    }

    /// Refuse entry to `room`.
    pub fn refuse_room(&self, room: &BareJid) {
        self.state().refused_rooms.insert(room.clone());
    }

    /// Fail attempts to leave `room`.
    pub fn refuse_leave(&self, room: &BareJid) {
        self.state().refused_leaves.insert(room.clone());
    }

    /// Push a message to the logged-in client.
    ///
    /// Returns `false` if no client is logged in or it went away.
    pub fn deliver(&self, message: IncomingMessage) -> bool {
        // Clone out so the client's listener runs without the server lock.
        let session = self.state().session.clone();
        match session {
            Some(inbound) => inbound.deliver(message),
            None => {
                debug!("No session, dropping message from {}", message.from);
                false
            }
        }
    }

    /// Push a one-to-one message from `from`.
    pub fn deliver_direct(&self, from: &str, body: &str) -> bool {
        match Jid::new(from) {
            Ok(from) => self.deliver(IncomingMessage::direct(from, body)),
            Err(e) => {
                warn!("Not delivering message from invalid JID {from}: {e}");
                false
            }
        }
    }

    /// Push a message from occupant `nick` of `room`.
    pub fn deliver_group(&self, room: &str, nick: &str, body: &str) -> bool {
        let parsed = BareJid::new(room)
            .and_then(|room| Ok((room.clone(), Jid::from(room.with_resource_str(nick)?))));
        match parsed {
            Ok((room, from)) => self.deliver(IncomingMessage::group(room, from, body)),
            Err(e) => {
                warn!("Not delivering message from invalid occupant {room}/{nick}: {e}");
                false
            }
        }
    }

    /// Everything sent so far, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        self.state().sent.clone()
    }

    /// Rooms currently occupied, in join order.
    pub fn joined_rooms(&self) -> Vec<BareJid> {
        self.state()
            .occupied
            .iter()
            .map(|(room, _)| room.clone())
            .collect()
    }

    /// Nickname used in `room`, if occupied.
    pub fn nick_in(&self, room: &BareJid) -> Option<String> {
        self.state()
            .occupied
            .iter()
            .find(|(r, _)| r == room)
            .map(|(_, nick)| nick.clone())
    }

    /// Cut the logged-in client off, as if the connection was lost.
    ///
    /// Its rooms are vacated and its delivery sink is dropped.
    pub fn drop_connection(&self) {
        let mut state = self.state();
        state.logged_in = false;
        state.occupied.clear();
        state.session = None;
    }

    /// How many times a transport tried to connect.
    pub fn connection_attempts(&self) -> usize {
        self.state().connection_attempts
    }

    /// Whether a client is currently logged in.
    pub fn is_open(&self) -> bool {
        self.state().logged_in
    }
}

/// Transport talking to a [`MemoryServer`].
pub struct MemoryTransport {
    server: MemoryServer,
    inbound: Option<Inbound>,
    domain: Option<String>,
    user: Option<BareJid>,
}

impl MemoryTransport {
    fn logged_in(&self) -> Result<&BareJid, TransportError> {
        let open = self.server.state().logged_in;
        match self.user {
            Some(ref user) if open => Ok(user),
            _ => Err(TransportError::Disconnected),
        }
    }
}

impl Transport for MemoryTransport {
    fn subscribe(&mut self, inbound: Inbound) {
        self.inbound = Some(inbound);
    }

    async fn connect(&mut self, domain: &str) -> Result<(), TransportError> {
        let mut state = self.server.state();
        state.connection_attempts += 1;
        if state.unreachable.contains(domain) {
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                format!("{domain} is unreachable"),
            )
            .into());
        }
        self.domain = Some(domain.to_owned());
        Ok(())
    }

    async fn authenticate(&mut self, local: &str, credential: &str) -> Result<(), TransportError> {
        let domain = self.domain.as_deref().ok_or(TransportError::Disconnected)?;
        if local.is_empty() || credential.is_empty() {
            return Err(TransportError::InvalidArgument(
                "username and password must not be empty".to_owned(),
            ));
        }

        let address = format!("{local}@{domain}");
        let mut state = self.server.state();
        if state.accounts.get(&address).map(String::as_str) != Some(credential) {
            return Err(TransportError::Rejected("not-authorized".to_owned()));
        }
        let user = BareJid::new(&address)
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;

        state.logged_in = true;
        state.session = self.inbound.take();
        self.user = Some(user);
        Ok(())
    }

    async fn join_room(&mut self, room: &BareJid, nick: &str) -> Result<(), TransportError> {
        self.logged_in()?;
        let mut state = self.server.state();
        if state.refused_rooms.contains(room) {
            return Err(TransportError::Rejected(format!("forbidden: {room}")));
        }
        if !state.occupied.iter().any(|(r, _)| r == room) {
            state.occupied.push((room.clone(), nick.to_owned()));
        }
        Ok(())
    }

    async fn leave_room(&mut self, room: &BareJid) -> Result<(), TransportError> {
        self.logged_in()?;
        let mut state = self.server.state();
        if state.refused_leaves.contains(room) {
            return Err(TransportError::Rejected(format!("cannot leave {room}")));
        }
        state.occupied.retain(|(r, _)| r != room);
        Ok(())
    }

    async fn send_direct(&mut self, to: &Jid, body: &str) -> Result<(), TransportError> {
        self.logged_in()?;
        self.server.state().sent.push(SentMessage::Direct {
            to: to.clone(),
            body: body.to_owned(),
        });
        Ok(())
    }

    async fn send_to_room(&mut self, room: &BareJid, body: &str) -> Result<(), TransportError> {
        self.logged_in()?;
        self.server.state().sent.push(SentMessage::Group {
            room: room.clone(),
            body: body.to_owned(),
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        if self.user.take().is_some() {
            let mut state = self.server.state();
            state.logged_in = false;
            state.session = None;
        }
        self.inbound = None;
        self.domain = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::ListenerSlot;

    #[tokio::test]
    async fn login_requires_known_account() {
        let server = MemoryServer::new();
        server.add_account("bot@example.org", "secret");

        let mut transport = server.transport();
        transport.connect("example.org").await.unwrap();
        assert!(matches!(
            transport.authenticate("bot", "wrong").await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            transport.authenticate("bot", "").await,
            Err(TransportError::InvalidArgument(_))
        ));
        transport.authenticate("bot", "secret").await.unwrap();
        assert!(server.is_open());

        transport.close().await.unwrap();
        assert!(!server.is_open());
    }

    #[tokio::test]
    async fn unreachable_domain() {
        let server = MemoryServer::new();
        server.set_unreachable("example.org");
        let err = server.transport().connect("example.org").await.unwrap_err();
        assert!(err.is_network());
        assert_eq!(server.connection_attempts(), 1);
    }

    #[tokio::test]
    async fn requires_login() {
        let server = MemoryServer::new();
        let mut transport = server.transport();
        let room: BareJid = "room@conf.example.org".parse().unwrap();
        assert!(matches!(
            transport.join_room(&room, "bot").await,
            Err(TransportError::Disconnected)
        ));
        assert!(matches!(
            transport.send_to_room(&room, "hi").await,
            Err(TransportError::Disconnected)
        ));
        assert!(server.sent().is_empty());
    }

    #[tokio::test]
    async fn dropped_connection_ends_session() {
        let server = MemoryServer::new();
        server.add_account("bot@example.org", "secret");
        let room: BareJid = "room@conf.example.org".parse().unwrap();

        let (inbound, mut mailbox) = Inbound::channel(ListenerSlot::default());
        let mut transport = server.transport();
        transport.subscribe(inbound);
        transport.connect("example.org").await.unwrap();
        transport.authenticate("bot", "secret").await.unwrap();
        transport.join_room(&room, "bot").await.unwrap();

        server.drop_connection();
        assert!(!server.is_open());
        assert!(server.joined_rooms().is_empty());
        assert!(mailbox.recv().await.is_none());
        assert!(matches!(
            transport.send_to_room(&room, "hi").await,
            Err(TransportError::Disconnected)
        ));
    }

    #[tokio::test]
    async fn delivers_to_session() {
        let server = MemoryServer::new();
        server.add_account("bot@example.org", "secret");
        assert!(!server.deliver_direct("alice@example.org", "too early"));

        let (inbound, mut mailbox) = Inbound::channel(ListenerSlot::default());
        let mut transport = server.transport();
        transport.subscribe(inbound);
        transport.connect("example.org").await.unwrap();
        transport.authenticate("bot", "secret").await.unwrap();

        assert!(server.deliver_group("room@conf.example.org", "alice", "hi all"));
        let message = mailbox.recv().await.unwrap();
        assert_eq!(message.body, "hi all");
        assert_eq!(message.from.to_string(), "room@conf.example.org/alice");
        assert_eq!(message.room.unwrap().to_string(), "room@conf.example.org");

        transport.close().await.unwrap();
        assert!(mailbox.recv().await.is_none());
    }
}
