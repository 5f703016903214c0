use crate::error::ChatError;
use crate::models::{ConnectionId, RoomId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// 接続のセッション状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Waiting,
    Paired {
        room_id: RoomId,
        partner: ConnectionId,
    },
}

impl ConnectionState {
    pub fn name(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Waiting => "waiting",
            ConnectionState::Paired { .. } => "paired",
        }
    }
}

/// 接続1件分の情報
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: ConnectionId,
    pub state: ConnectionState,
    pub connected_at: DateTime<Utc>,
}

/// 接続レジストリ: connection_id → Connection
///
/// 状態の保持だけを行い、ネットワークI/Oは一切しない。
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle状態で接続を登録
    pub fn register(&mut self, id: ConnectionId) -> Result<(), ChatError> {
        if self.connections.contains_key(&id) {
            return Err(ChatError::AlreadyRegistered(id));
        }
        self.connections.insert(
            id,
            Connection {
                id,
                state: ConnectionState::Idle,
                connected_at: Utc::now(),
            },
        );
        Ok(())
    }

    /// 接続を削除（2回目はNotFound）
    pub fn unregister(&mut self, id: ConnectionId) -> Result<Connection, ChatError> {
        self.connections.remove(&id).ok_or(ChatError::NotFound(id))
    }

    pub fn state(&self, id: ConnectionId) -> Option<&ConnectionState> {
        self.connections.get(&id).map(|c| &c.state)
    }

    pub fn set_state(&mut self, id: ConnectionId, state: ConnectionState) -> Result<(), ChatError> {
        let connection = self
            .connections
            .get_mut(&id)
            .ok_or(ChatError::NotFound(id))?;
        connection.state = state;
        Ok(())
    }

    /// Paired中なら相手のIDを返す
    pub fn lookup_partner(&self, id: ConnectionId) -> Option<ConnectionId> {
        match self.state(id)? {
            ConnectionState::Paired { partner, .. } => Some(*partner),
            _ => None,
        }
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = ConnectionId> + '_ {
        self.connections.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }
}
