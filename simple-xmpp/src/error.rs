// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::error::Error as StdError;
use std::fmt;
use std::io::Error as IoError;

use crate::client::ClientState;
use crate::jid::BareJid;

/// Top-level error type
#[derive(Debug)]
pub enum Error {
    /// The client's own address is not of the form `local@domain`
    InvalidIdentity {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: &'static str,
    },
    /// A room or recipient address could not be parsed
    InvalidAddress {
        /// The rejected address
        address: String,
        /// Why it was rejected
        reason: String,
    },
    /// The server for the identity's domain could not be reached
    Connect {
        /// Domain we tried to reach
        domain: String,
        /// Underlying transport failure
        source: TransportError,
    },
    /// The server refused our credentials
    Auth {
        /// Identity we tried to log in as
        identity: String,
        /// Underlying transport failure
        source: TransportError,
    },
    /// One or more chatrooms could not be joined
    Join {
        /// Every room that failed, with its cause, in request order
        rooms: Vec<(BareJid, TransportError)>,
    },
    /// The client is not connected (never connected, failed or disconnected)
    NotConnected,
    /// A group message without explicit room needs exactly one joined room
    AmbiguousTarget {
        /// Number of rooms currently joined
        joined: usize,
    },
    /// The room is not one of ours, or is not currently joined
    UnknownRoom(String),
    /// The operation is not valid in the client's current state
    InvalidState(ClientState),
    /// The transport failed while sending
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::InvalidIdentity { address, reason } => {
                write!(fmt, "{:?} is not a valid JID: {}", address, reason)
            }
            Error::InvalidAddress { address, reason } => {
                write!(fmt, "{:?} is not a valid address: {}", address, reason)
            }
            Error::Connect { domain, source } => {
                write!(fmt, "impossible to connect to {}: {}", domain, source)
            }
            Error::Auth { identity, source } => {
                write!(fmt, "impossible to log in as {}: {}", identity, source)
            }
            Error::Join { rooms } => {
                write!(fmt, "impossible to join ")?;
                for (i, (room, source)) in rooms.iter().enumerate() {
                    if i > 0 {
                        write!(fmt, ", ")?;
                    }
                    write!(fmt, "{} ({})", room, source)?;
                }
                Ok(())
            }
            Error::NotConnected => write!(fmt, "not connected"),
            Error::AmbiguousTarget { joined } => write!(
                fmt,
                "group message needs exactly one joined room, {} joined",
                joined
            ),
            Error::UnknownRoom(room) => write!(fmt, "room {} is not joined", room),
            Error::InvalidState(state) => write!(fmt, "invalid client state: {}", state),
            Error::Transport(e) => write!(fmt, "transport error: {}", e),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Error::Connect { source, .. } | Error::Auth { source, .. } => Some(source),
            Error::Join { rooms } => rooms.first().map(|(_, e)| e as &(dyn StdError + 'static)),
            Error::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Error::Transport(e)
    }
}

/// Failure reported by a [`Transport`](crate::transport::Transport)
#[derive(Debug)]
pub enum TransportError {
    /// I/O error
    Io(IoError),
    /// Connection closed
    Disconnected,
    /// The server rejected the request
    Rejected(String),
    /// The library refused an argument before talking to the server
    InvalidArgument(String),
    /// Error specific to the underlying XMPP library
    Library(Box<dyn StdError + Send + Sync>),
}

impl TransportError {
    /// Whether this failure is about reaching the server at all, as opposed
    /// to the server (or library) refusing something.
    pub fn is_network(&self) -> bool {
        matches!(self, TransportError::Io(_) | TransportError::Disconnected)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::Io(e) => write!(fmt, "IO error: {}", e),
            TransportError::Disconnected => write!(fmt, "disconnected"),
            TransportError::Rejected(reason) => write!(fmt, "rejected: {}", reason),
            TransportError::InvalidArgument(reason) => write!(fmt, "invalid argument: {}", reason),
            TransportError::Library(e) => write!(fmt, "{}", e),
        }
    }
}

impl StdError for TransportError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            TransportError::Io(e) => Some(e),
            TransportError::Library(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}

impl From<IoError> for TransportError {
    fn from(e: IoError) -> Self {
        TransportError::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_error_names_every_room() {
        let err = Error::Join {
            rooms: vec![
                (
                    "room1@conf.example.org".parse().unwrap(),
                    TransportError::Rejected("forbidden".into()),
                ),
                (
                    "room2@conf.example.org".parse().unwrap(),
                    TransportError::Disconnected,
                ),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("room1@conf.example.org (rejected: forbidden)"));
        assert!(text.contains("room2@conf.example.org (disconnected)"));
        assert!(err.source().is_some());
    }

    #[test]
    fn network_classification() {
        let io = IoError::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert!(TransportError::from(io).is_network());
        assert!(TransportError::Disconnected.is_network());
        assert!(!TransportError::Rejected("not-authorized".into()).is_network());
        assert!(!TransportError::InvalidArgument("empty username".into()).is_network());
    }
}
