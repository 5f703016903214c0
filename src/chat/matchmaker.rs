use crate::chat::registry::ConnectionState;
use crate::chat::room::Room;
use crate::chat::service::ChatService;
use crate::error::ChatError;
use crate::models::{ConnectionId, ServerMessage};
use tracing::{info, warn};

impl ChatService {
    /// join-queue: 待機中の相手がいればマッチング、いなければキュー末尾へ
    ///
    /// キューの先頭（一番長く待っている接続）から順に相手を選ぶ。
    /// WaitingやPairedの接続からの再要求はProtocolViolationとして何も変更しない。
    pub fn join_queue(&mut self, id: ConnectionId) -> Result<(), ChatError> {
        match self.registry.state(id) {
            None => return Err(ChatError::NotFound(id)),
            Some(ConnectionState::Idle) => {}
            Some(state) => {
                return Err(ChatError::ProtocolViolation {
                    id,
                    event: "join-queue",
                    state: state.name(),
                });
            }
        }

        while let Some(partner) = self.queue.pop_front() {
            if partner == id {
                warn!(connection = %id, "❌ Idle connection found in wait queue");
                return Err(ChatError::SelfMatch(id));
            }
            if !matches!(self.registry.state(partner), Some(ConnectionState::Waiting)) {
                warn!(connection = %partner, "⏭️ Skipping stale wait queue entry");
                continue;
            }

            let room = Room::new(id, partner)?;
            let room_id = room.id().clone();
            self.registry.set_state(
                id,
                ConnectionState::Paired {
                    room_id: room_id.clone(),
                    partner,
                },
            )?;
            self.registry.set_state(
                partner,
                ConnectionState::Paired {
                    room_id: room_id.clone(),
                    partner: id,
                },
            )?;
            self.rooms.insert(room_id.clone(), room);

            self.push(
                id,
                ServerMessage::MatchFound {
                    room_id: room_id.clone(),
                    partner_id: partner,
                },
            );
            self.push(
                partner,
                ServerMessage::MatchFound {
                    room_id: room_id.clone(),
                    partner_id: id,
                },
            );
            info!(room = %room_id, a = %id, b = %partner, "✅ Matched users");
            return Ok(());
        }

        self.queue.push_back(id);
        self.registry.set_state(id, ConnectionState::Waiting)?;
        self.push(id, ServerMessage::Waiting);
        info!(connection = %id, waiting = self.queue.len(), "⏳ Added to waiting queue");
        Ok(())
    }
}
