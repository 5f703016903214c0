use crate::error::ChatError;
use crate::models::{ConnectionId, RoomId};
use chrono::{DateTime, Utc};

/// 1対1のチャットルーム
///
/// メンバーは必ず異なる2人。1人や3人以上のルームは作れない。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Room {
    id: RoomId,
    members: [ConnectionId; 2],
    created_at: DateTime<Utc>,
}

impl Room {
    pub fn new(a: ConnectionId, b: ConnectionId) -> Result<Self, ChatError> {
        if a == b {
            return Err(ChatError::SelfMatch(a));
        }
        Ok(Self {
            id: RoomId::for_members(a, b),
            members: [a, b],
            created_at: Utc::now(),
        })
    }

    pub fn id(&self) -> &RoomId {
        &self.id
    }

    pub fn members(&self) -> [ConnectionId; 2] {
        self.members
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.members.contains(&id)
    }

    /// メンバーの相手を返す（メンバーでなければNone）
    pub fn partner_of(&self, id: ConnectionId) -> Option<ConnectionId> {
        match self.members {
            [a, b] if a == id => Some(b),
            [a, b] if b == id => Some(a),
            _ => None,
        }
    }
}
