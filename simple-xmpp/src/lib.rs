// Copyright (c) 2019 Emmanuel Gil Peyrot <linkmauve@linkmauve.fr>
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! A small messaging client: log in to an XMPP server, join some chatrooms,
//! then send and receive messages.
//!
//! A [`MessagingClient`] is configured with a [`ClientBuilder`] and talks to
//! the server through a [`Transport`](transport::Transport). Incoming messages
//! are either pulled with [`MessagingClient::next_message`] or pushed to a
//! listener registered with [`MessagingClient::register_listener`].
//!
//! Enable the `starttls-rust` or `starttls-native` feature for
//! `transport::xmpp`, which connects to real servers through `tokio-xmpp`.

#![deny(bare_trait_objects)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

pub use jid;
#[cfg(any(feature = "starttls-rust", feature = "starttls-native"))]
pub use tokio_xmpp;

#[macro_use]
extern crate log;

pub mod builder;
pub mod client;
pub mod error;
pub mod event;
pub mod identity;
pub mod inbound;
pub mod muc;
pub mod transport;

pub use builder::ClientBuilder;
pub use client::{ClientState, MessagingClient};
pub use error::{Error, TransportError};
pub use event::IncomingMessage;
pub use identity::Identity;
pub use inbound::{Inbound, Listener};
pub use muc::{GroupConversation, RoomState, Rooms};

#[cfg(test)]
mod tests {
    #[test]
    fn reexports() {
        #[allow(unused_imports)]
        use crate::jid;
        #[allow(unused_imports)]
        use crate::{ClientBuilder, Error, IncomingMessage, MessagingClient};
    }
}
