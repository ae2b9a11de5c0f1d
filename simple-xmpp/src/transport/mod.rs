// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The messaging library a [`MessagingClient`](crate::MessagingClient)
//! drives.
//!
//! Everything protocol-related happens behind this trait: stream
//! negotiation, TLS, SASL, MUC presence handling. Two implementations are
//! provided:
//!
//! - [`memory::MemoryTransport`], an in-process server, always available.
//! - `xmpp::XmppTransport`, backed by `tokio-xmpp`, with the
//!   `starttls-rust` or `starttls-native` feature.

use crate::jid::{BareJid, Jid};
use crate::{Inbound, TransportError};

pub mod memory;
#[cfg(any(feature = "starttls-rust", feature = "starttls-native"))]
pub mod xmpp;

/// Connection to a messaging server.
///
/// A transport is used by exactly one client and is not reused once
/// [`close`](Transport::close) has been called.
pub trait Transport {
    /// Where to hand incoming `<message/>`s. Called once, before
    /// [`connect`](Transport::connect).
    ///
    /// Messages may be delivered from any task or thread.
    fn subscribe(&mut self, inbound: Inbound);

    /// Open a session to the server for `domain`.
    #[allow(async_fn_in_trait)]
    async fn connect(&mut self, domain: &str) -> Result<(), TransportError>;

    /// Log in on the open session.
    #[allow(async_fn_in_trait)]
    async fn authenticate(&mut self, local: &str, credential: &str)
        -> Result<(), TransportError>;

    /// Enter `room` as `nick`, resolving once the server confirmed it.
    #[allow(async_fn_in_trait)]
    async fn join_room(&mut self, room: &BareJid, nick: &str) -> Result<(), TransportError>;

    #[allow(async_fn_in_trait)]
    async fn leave_room(&mut self, room: &BareJid) -> Result<(), TransportError>;

    /// Send a one-to-one message. Resolves once written, not once received.
    #[allow(async_fn_in_trait)]
    async fn send_direct(&mut self, to: &Jid, body: &str) -> Result<(), TransportError>;

    /// Send a message to every occupant of `room`.
    #[allow(async_fn_in_trait)]
    async fn send_to_room(&mut self, room: &BareJid, body: &str) -> Result<(), TransportError>;

    /// End the session.
    #[allow(async_fn_in_trait)]
    async fn close(&mut self) -> Result<(), TransportError>;
}
