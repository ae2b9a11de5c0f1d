// Copyright (c) 2023 xmpp-rs contributors.
//
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use core::fmt;

use crate::jid::BareJid;

/// Membership of the client in one chatroom.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoomState {
    NotJoined,
    Joined,
    Left,
}

impl fmt::Display for RoomState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RoomState::NotJoined => "not joined",
            RoomState::Joined => "joined",
            RoomState::Left => "left",
        };
        f.write_str(s)
    }
}

/// A chatroom the client was asked to take part in.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupConversation {
    pub room: BareJid,
    pub state: RoomState,
}

impl GroupConversation {
    pub fn new(room: BareJid) -> Self {
        Self {
            room,
            state: RoomState::NotJoined,
        }
    }

    pub fn is_joined(&self) -> bool {
        self.state == RoomState::Joined
    }
}

/// The client's chatrooms, unique by address, in the order they were
/// requested.
#[derive(Clone, Debug, Default)]
pub struct Rooms {
    rooms: Vec<GroupConversation>,
}

impl Rooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a room, keeping the position of its first occurrence.
    ///
    /// Returns `false` if the room was already present.
    pub fn insert(&mut self, room: BareJid) -> bool {
        if self.get(&room).is_some() {
            return false;
        }
        self.rooms.push(GroupConversation::new(room));
        true
    }

    pub fn get(&self, room: &BareJid) -> Option<&GroupConversation> {
        self.rooms.iter().find(|c| &c.room == room)
    }

    pub fn set_state(&mut self, room: &BareJid, state: RoomState) {
        if let Some(conversation) = self.rooms.iter_mut().find(|c| &c.room == room) {
            conversation.state = state;
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &GroupConversation> {
        self.rooms.iter()
    }

    pub fn joined(&self) -> impl Iterator<Item = &BareJid> {
        self.rooms
            .iter()
            .filter(|c| c.is_joined())
            .map(|c| &c.room)
    }

    /// The only joined room, or the number of joined rooms if that is not
    /// exactly one.
    pub fn single_joined(&self) -> Result<&BareJid, usize> {
        let mut joined = self.joined();
        match (joined.next(), joined.next()) {
            (Some(room), None) => Ok(room),
            (None, _) => Err(0),
            (Some(_), Some(_)) => Err(2 + joined.count()),
        }
    }

    /// `room` if it is one of ours and currently joined.
    pub fn joined_room(&self, room: &BareJid) -> Option<&BareJid> {
        self.get(room).filter(|c| c.is_joined()).map(|c| &c.room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jid(s: &str) -> BareJid {
        s.parse().unwrap()
    }

    #[test]
    fn keeps_request_order_and_uniqueness() {
        let mut rooms = Rooms::new();
        assert!(rooms.insert(jid("b@conf.example.org")));
        assert!(rooms.insert(jid("a@conf.example.org")));
        assert!(!rooms.insert(jid("b@conf.example.org")));
        let order: Vec<String> = rooms.iter().map(|c| c.room.to_string()).collect();
        assert_eq!(order, ["b@conf.example.org", "a@conf.example.org"]);
        assert!(rooms.iter().all(|c| c.state == RoomState::NotJoined));
    }

    #[test]
    fn single_joined() {
        let mut rooms = Rooms::new();
        let room1 = jid("room1@conf.example.org");
        let room2 = jid("room2@conf.example.org");
        rooms.insert(room1.clone());
        rooms.insert(room2.clone());
        assert_eq!(rooms.single_joined(), Err(0));

        rooms.set_state(&room1, RoomState::Joined);
        assert_eq!(rooms.single_joined(), Ok(&room1));

        rooms.set_state(&room2, RoomState::Joined);
        assert_eq!(rooms.single_joined(), Err(2));

        rooms.set_state(&room1, RoomState::Left);
        assert_eq!(rooms.single_joined(), Ok(&room2));
        assert_eq!(rooms.joined_room(&room1), None);
        assert_eq!(rooms.joined_room(&room2), Some(&room2));
    }
}
