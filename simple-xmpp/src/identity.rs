// Copyright (c) 2024 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::fmt;
use core::str::FromStr;

use crate::jid::BareJid;
use crate::Error;

/// The account a client logs in as, split into its two components.
///
/// Only `local@domain` is accepted: exactly one `@`, both sides non-empty,
/// and the whole address must be a valid bare JID.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    local: String,
    domain: String,
    bare: BareJid,
}

impl Identity {
    pub fn parse(address: &str) -> Result<Identity, Error> {
        let invalid = |reason| Error::InvalidIdentity {
            address: address.to_owned(),
            reason,
        };

        let (local, domain) = address
            .split_once('@')
            .ok_or_else(|| invalid("missing '@' between username and domain"))?;
        if local.is_empty() {
            return Err(invalid("empty username"));
        }
        if domain.is_empty() {
            return Err(invalid("empty domain"));
        }
        if domain.contains('@') {
            return Err(invalid("more than one '@'"));
        }

        let bare = BareJid::from_str(address).map_err(|_| invalid("not a bare JID"))?;

        Ok(Identity {
            local: local.to_owned(),
            domain: domain.to_owned(),
            bare,
        })
    }

    /// Username part, before the `@`.
    pub fn local(&self) -> &str {
        &self.local
    }

    /// Server part, after the `@`.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn as_bare(&self) -> &BareJid {
        &self.bare
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Identity::parse(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.local, self.domain)
    }
}
