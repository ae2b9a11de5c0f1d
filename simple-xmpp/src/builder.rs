// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::fmt;
use core::str::FromStr;

use crate::jid::BareJid;
use crate::muc::Rooms;
use crate::transport::Transport;
use crate::{Error, Identity, MessagingClient};

/// Configuration for a [`MessagingClient`].
///
/// ```no_run
/// # use simple_xmpp::{ClientBuilder, transport::memory::MemoryServer};
/// # async fn run(server: MemoryServer) -> Result<(), simple_xmpp::Error> {
/// let client = ClientBuilder::new("bot@example.org", "secret")
///     .join_rooms(["room1@conf.example.org", "room2@conf.example.org"])
///     .connect(server.transport())
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ClientBuilder {
    address: String,
    credential: String,
    rooms: Vec<String>,
    nick: Option<String>,
}

impl fmt::Debug for ClientBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientBuilder")
            .field("address", &self.address)
            .field("credential", &"<hidden>")
            .field("rooms", &self.rooms)
            .field("nick", &self.nick)
            .finish()
    }
}

impl ClientBuilder {
    pub fn new(address: impl Into<String>, credential: impl Into<String>) -> ClientBuilder {
        ClientBuilder {
            address: address.into(),
            credential: credential.into(),
            rooms: Vec::new(),
            nick: None,
        }
    }

    /// Join `room` once logged in. Rooms are joined in the order given.
    pub fn join_room(mut self, room: impl Into<String>) -> Self {
        self.rooms.push(room.into());
        self
    }

    pub fn join_rooms<I, S>(mut self, rooms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.rooms.extend(rooms.into_iter().map(Into::into));
        self
    }

    /// Nickname used in every room. Defaults to the client's own address.
    pub fn set_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Validate the configuration, without touching the network.
    ///
    /// The returned client is [`Disconnected`](crate::ClientState::Disconnected);
    /// call [`MessagingClient::connect`] to bring it online.
    pub fn build<T: Transport>(self, transport: T) -> Result<MessagingClient<T>, Error> {
        let identity = Identity::parse(&self.address)?;

        let mut rooms = Rooms::new();
        for room in &self.rooms {
            let jid = BareJid::from_str(room).map_err(|e| Error::InvalidAddress {
                address: room.clone(),
                reason: e.to_string(),
            })?;
            if jid.node().is_none() {
                return Err(Error::InvalidAddress {
                    address: room.clone(),
                    reason: "missing room name before '@'".to_owned(),
                });
            }
            if !rooms.insert(jid) {
                debug!("Room {room} requested twice, joining it once");
            }
        }

        let nick = self.nick.unwrap_or_else(|| identity.to_string());

        Ok(MessagingClient::new(
            identity,
            self.credential,
            rooms,
            nick,
            transport,
        ))
    }

    /// Validate, connect, log in and join every requested room.
    pub async fn connect<T: Transport>(self, transport: T) -> Result<MessagingClient<T>, Error> {
        let mut client = self.build(transport)?;
        client.connect().await?;
        Ok(client)
    }
}
