// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use chrono::{DateTime, Utc};

use crate::jid::{BareJid, Jid};

/// A message received from the server.
///
/// - `id` is the stanza id, when the sender set one.
/// - `from` is the sender. For chatroom messages this is the occupant's
///   full JID (`room@service/nick`).
/// - `room` is set iff the message was sent to a chatroom.
/// - `received` is the local time at which the transport surfaced it.
#[derive(Clone, Debug, PartialEq)]
pub struct IncomingMessage {
    pub id: Option<String>,
    pub from: Jid,
    pub body: String,
    pub room: Option<BareJid>,
    pub received: DateTime<Utc>,
}

impl IncomingMessage {
    /// A one-to-one message.
    pub fn direct(from: Jid, body: impl Into<String>) -> Self {
        IncomingMessage {
            id: None,
            from,
            body: body.into(),
            room: None,
            received: Utc::now(),
        }
    }

    /// A message sent to `room`, as relayed by the room from occupant `from`.
    pub fn group(room: BareJid, from: Jid, body: impl Into<String>) -> Self {
        IncomingMessage {
            id: None,
            from,
            body: body.into(),
            room: Some(room),
            received: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_group(&self) -> bool {
        self.room.is_some()
    }
}
