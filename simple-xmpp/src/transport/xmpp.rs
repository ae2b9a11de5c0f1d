// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Transport over a real XMPP connection, using `tokio-xmpp`.
//!
//! Once logged in, a worker task owns the `tokio-xmpp` client: it feeds
//! incoming stanzas to the [`Inbound`] and executes the commands sent by
//! [`XmppTransport`] methods.

use std::collections::HashMap;
use std::io;

use futures::StreamExt;
use tokio::sync::{mpsc, oneshot};
use tokio_xmpp::connect::ServerConnector;
use tokio_xmpp::minidom::Element;
use tokio_xmpp::parsers::{
    message::{Body, Message, MessageType},
    muc::{
        user::{MucUser, Status},
        Muc,
    },
    ns,
    presence::{Presence, Type as PresenceType},
};
use tokio_xmpp::{AsyncClient, AsyncConfig, Event};

use crate::jid::{BareJid, Jid};
use crate::transport::Transport;
use crate::{Inbound, IncomingMessage, TransportError};

type Reply = oneshot::Sender<Result<(), TransportError>>;
type ClientFactory<C> = Box<dyn FnOnce(Jid, String) -> AsyncClient<C> + Send>;

enum Command {
    Send(Element, Reply),
    Join {
        room: BareJid,
        presence: Element,
        reply: Reply,
    },
    Close(Reply),
}

/// A transport over StartTLS, resolving the server through DNS SRV records.
pub fn starttls() -> XmppTransport<impl ServerConnector> {
    XmppTransport::with_factory(|jid, password| AsyncClient::new(jid, password))
}

/// Connection to an XMPP server.
pub struct XmppTransport<C: ServerConnector> {
    factory: Option<ClientFactory<C>>,
    inbound: Option<Inbound>,
    domain: Option<String>,
    commands: Option<mpsc::UnboundedSender<Command>>,
    // Room -> nick, for leaving again
    occupied: HashMap<BareJid, String>,
}

impl<C: ServerConnector> XmppTransport<C> {
    /// Connect through `connector` instead of the default StartTLS one.
    pub fn with_connector(connector: C) -> Self {
        Self::with_factory(move |jid, password| {
            AsyncClient::new_with_config(AsyncConfig {
                jid,
                password,
                server: connector,
            })
        })
    }

    fn with_factory<F>(factory: F) -> Self
    where
        F: FnOnce(Jid, String) -> AsyncClient<C> + Send + 'static,
    {
        XmppTransport {
            factory: Some(Box::new(factory)),
            inbound: None,
            domain: None,
            commands: None,
            occupied: HashMap::new(),
        }
    }

    async fn request(&self, make: impl FnOnce(Reply) -> Command) -> Result<(), TransportError> {
        let commands = self.commands.as_ref().ok_or(TransportError::Disconnected)?;
        let (tx, rx) = oneshot::channel();
        commands
            .send(make(tx))
            .map_err(|_| TransportError::Disconnected)?;
        rx.await.map_err(|_| TransportError::Disconnected)?
    }

    async fn send_stanza(&self, stanza: Element) -> Result<(), TransportError> {
        self.request(|reply| Command::Send(stanza, reply)).await
    }
}

impl<C: ServerConnector> Transport for XmppTransport<C> {
    fn subscribe(&mut self, inbound: Inbound) {
        self.inbound = Some(inbound);
    }

    async fn connect(&mut self, domain: &str) -> Result<(), TransportError> {
        // tokio-xmpp opens the TCP connection and logs in in one go.
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
        let jid = BareJid::new(&format!("{local}@{domain}"))
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;
        let factory = self
            .factory
            .take()
            .ok_or_else(|| TransportError::InvalidArgument("already authenticated".to_owned()))?;
        // The worker holds the only sink, so the mailbox closes with it.
        let inbound = self.inbound.take().ok_or(TransportError::Disconnected)?;

        let mut client = factory(Jid::from(jid), credential.to_owned());
        client.set_reconnect(false);

        loop {
            match client.next().await {
                Some(Event::Online { bound_jid, .. }) => {
                    info!("Online as {}", bound_jid);
                    break;
                }
                Some(Event::Disconnected(e)) => return Err(e.into()),
                Some(Event::Stanza(stanza)) => {
                    debug!("Ignoring stanza received before going online: {:?}", stanza)
                }
                None => return Err(TransportError::Disconnected),
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run(client, rx, inbound));
        self.commands = Some(tx);
        Ok(())
    }

    async fn join_room(&mut self, room: &BareJid, nick: &str) -> Result<(), TransportError> {
        let occupant = room
            .with_resource_str(nick)
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;
        let mut presence = Presence::new(PresenceType::None).with_to(Jid::from(occupant));
        presence.add_payload(Muc::new());

        let room_jid = room.clone();
        self.request(|reply| Command::Join {
            room: room_jid,
            presence: presence.into(),
            reply,
        })
        .await?;
        self.occupied.insert(room.clone(), nick.to_owned());
        Ok(())
    }

    async fn leave_room(&mut self, room: &BareJid) -> Result<(), TransportError> {
        let nick = self
            .occupied
            .remove(room)
            .ok_or_else(|| TransportError::InvalidArgument(format!("not in room {room}")))?;
        let occupant = room
            .with_resource_str(&nick)
            .map_err(|e| TransportError::InvalidArgument(e.to_string()))?;
        let presence = Presence::new(PresenceType::Unavailable).with_to(Jid::from(occupant));
        self.send_stanza(presence.into()).await
    }

    async fn send_direct(&mut self, to: &Jid, body: &str) -> Result<(), TransportError> {
        let message = text_message(to.clone(), MessageType::Chat, body);
        self.send_stanza(message.into()).await
    }

    async fn send_to_room(&mut self, room: &BareJid, body: &str) -> Result<(), TransportError> {
        let message = text_message(Jid::from(room.clone()), MessageType::Groupchat, body);
        self.send_stanza(message.into()).await
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.occupied.clear();
        self.inbound = None;
        let result = match self.commands {
            Some(_) => self.request(Command::Close).await,
            None => Ok(()),
        };
        self.commands = None;
        result
    }
}

fn text_message(to: Jid, type_: MessageType, body: &str) -> Message {
    let mut message = Message::new(Some(to));
    message.type_ = type_;
    message
        .bodies
        .insert(String::new(), Body(body.to_owned()));
    message
}

/// Worker loop: owns the client until the session ends or is closed.
async fn run<C: ServerConnector>(
    mut client: AsyncClient<C>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    inbound: Inbound,
) {
    let mut joining: HashMap<BareJid, Reply> = HashMap::new();

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Send(stanza, reply)) => {
                    let result = client.send_stanza(stanza).await.map_err(TransportError::from);
                    let _ = reply.send(result);
                }
                Some(Command::Join { room, presence, reply }) => {
                    match client.send_stanza(presence).await {
                        Ok(()) => {
                            joining.insert(room, reply);
                        }
                        Err(e) => {
                            let _ = reply.send(Err(e.into()));
                        }
                    }
                }
                Some(Command::Close(reply)) => {
                    let _ = reply.send(client.send_end().await.map_err(TransportError::from));
                    break;
                }
                // Transport dropped without closing.
                None => {
                    let _ = client.send_end().await;
                    break;
                }
            },
            event = client.next() => match event {
                Some(Event::Stanza(stanza)) => handle_stanza(stanza, &inbound, &mut joining),
                Some(Event::Online { .. }) => {}
                Some(Event::Disconnected(e)) => {
                    warn!("Connection lost: {}", e);
                    break;
                }
                None => break,
            },
        }
    }
    // Dropping the pending replies fails every join still in flight.
    debug!("Session worker done, {} joins aborted", joining.len());
}

fn handle_stanza(stanza: Element, inbound: &Inbound, joining: &mut HashMap<BareJid, Reply>) {
    if stanza.is("message", ns::JABBER_CLIENT) {
        let id = stanza.attr("id").map(str::to_owned);
        match Message::try_from(stanza) {
            Ok(message) => {
                if let Some(message) = incoming_message(message, id) {
                    inbound.deliver(message);
                }
            }
            Err(e) => warn!("Failed to parse message: {}", e),
        }
    } else if stanza.is("presence", ns::JABBER_CLIENT) {
        match Presence::try_from(stanza) {
            Ok(presence) => handle_presence(presence, joining),
            Err(e) => warn!("Failed to parse presence: {}", e),
        }
    }
}

/// Resolve a pending join from the room's answer to our presence.
fn handle_presence(presence: Presence, joining: &mut HashMap<BareJid, Reply>) {
    let Some(room) = presence.from.as_ref().map(Jid::to_bare) else {
        return;
    };
    if !joining.contains_key(&room) {
        return;
    }

    let result = match presence.type_ {
        PresenceType::Error => {
            let condition = presence
                .payloads
                .iter()
                .find(|p| p.name() == "error")
                .and_then(|error| error.children().next())
                .map(|condition| condition.name().to_owned())
                .unwrap_or_else(|| "undefined-condition".to_owned());
            Err(TransportError::Rejected(condition))
        }
        PresenceType::None => {
            let is_self = presence
                .payloads
                .iter()
                .filter_map(|p| MucUser::try_from(p.clone()).ok())
                .any(|muc| muc.status.iter().any(|s| *s == Status::SelfPresence));
            if !is_self {
                // Presence of another occupant, sent before ours.
                return;
            }
            Ok(())
        }
        _ => return,
    };

    if let Some(reply) = joining.remove(&room) {
        match result {
            Ok(()) => info!("Joined room {}", room),
            Err(ref e) => warn!("Room {} refused entry: {}", room, e),
        }
        let _ = reply.send(result);
    }
}

fn incoming_message(message: Message, id: Option<String>) -> Option<IncomingMessage> {
    let Some(from) = message.from.clone() else {
        debug!("Dropping message without sender");
        return None;
    };
    if message.type_ == MessageType::Error {
        debug!("Dropping error message from {}", from);
        return None;
    }
    let body = match message.get_best_body(vec![]) {
        Some((_lang, body)) => body.0.clone(),
        // Chat states, receipts, subjects.
        None => return None,
    };

    let incoming = if message.type_ == MessageType::Groupchat {
        IncomingMessage::group(from.to_bare(), from, body)
    } else {
        IncomingMessage::direct(from, body)
    };
    Some(match id {
        Some(id) => incoming.with_id(id),
        None => incoming,
    })
}

impl From<tokio_xmpp::Error> for TransportError {
    fn from(e: tokio_xmpp::Error) -> Self {
        match e {
            tokio_xmpp::Error::Io(e) => TransportError::Io(e),
            tokio_xmpp::Error::Disconnected => TransportError::Disconnected,
            tokio_xmpp::Error::Auth(e) => TransportError::Rejected(e.to_string()),
            tokio_xmpp::Error::JidParse(e) => TransportError::InvalidArgument(e.to_string()),
            e @ (tokio_xmpp::Error::Protocol(_)
            | tokio_xmpp::Error::InvalidState
            | tokio_xmpp::Error::Fmt(_)
            | tokio_xmpp::Error::Utf8(_)) => TransportError::Library(Box::new(e)),
            // DNS, TLS and TCP failures.
            e => TransportError::Io(io::Error::new(io::ErrorKind::Other, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn convert(xml: &str) -> Option<IncomingMessage> {
        let stanza: Element = xml.parse().unwrap();
        let id = stanza.attr("id").map(str::to_owned);
        incoming_message(Message::try_from(stanza).unwrap(), id)
    }

    #[test]
    fn converts_chat_message() {
        let incoming = convert(
            "<message xmlns='jabber:client' from='alice@example.org/phone' id='m1' type='chat'><body>hi</body></message>",
        )
        .unwrap();
        assert_eq!(incoming.from.to_string(), "alice@example.org/phone");
        assert_eq!(incoming.body, "hi");
        assert_eq!(incoming.id.as_deref(), Some("m1"));
        assert!(!incoming.is_group());
    }

    #[test]
    fn converts_groupchat_message() {
        let incoming = convert(
            "<message xmlns='jabber:client' from='room@conf.example.org/carol' type='groupchat'><body>all</body></message>",
        )
        .unwrap();
        assert_eq!(incoming.room.unwrap().to_string(), "room@conf.example.org");
        assert_eq!(incoming.from.to_string(), "room@conf.example.org/carol");
    }

    #[test]
    fn drops_bodyless_and_error_messages() {
        assert!(convert(
            "<message xmlns='jabber:client' from='alice@example.org' type='chat'/>"
        )
        .is_none());
        assert!(convert(
            "<message xmlns='jabber:client' from='alice@example.org' type='error'><body>x</body></message>"
        )
        .is_none());
    }

    #[tokio::test]
    async fn self_presence_completes_join() {
        let room = BareJid::new("room@conf.example.org").unwrap();
        let mut joining = HashMap::new();
        let (tx, rx) = oneshot::channel();
        joining.insert(room.clone(), tx);

        let other: Element = "<presence xmlns='jabber:client' from='room@conf.example.org/carol'><x xmlns='http://jabber.org/protocol/muc#user'><item affiliation='member' role='participant'/></x></presence>".parse().unwrap();
        handle_presence(Presence::try_from(other).unwrap(), &mut joining);
        assert!(joining.contains_key(&room));

        let own: Element = "<presence xmlns='jabber:client' from='room@conf.example.org/bot'><x xmlns='http://jabber.org/protocol/muc#user'><item affiliation='none' role='participant'/><status code='110'/></x></presence>".parse().unwrap();
        handle_presence(Presence::try_from(own).unwrap(), &mut joining);
        assert!(joining.is_empty());
        assert!(rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn error_presence_fails_join() {
        let room = BareJid::new("room@conf.example.org").unwrap();
        let mut joining = HashMap::new();
        let (tx, rx) = oneshot::channel();
        joining.insert(room, tx);

        let refused: Element = "<presence xmlns='jabber:client' from='room@conf.example.org/bot' type='error'><error type='auth'><forbidden xmlns='urn:ietf:params:xml:ns:xmpp-stanzas'/></error></presence>".parse().unwrap();
        handle_presence(Presence::try_from(refused).unwrap(), &mut joining);
        match rx.await.unwrap() {
            Err(TransportError::Rejected(condition)) => assert_eq!(condition, "forbidden"),
            other => panic!("unexpected {other:?}"),
        }
    }
}
