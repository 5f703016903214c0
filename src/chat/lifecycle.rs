use crate::chat::registry::ConnectionState;
use crate::chat::service::ChatService;
use crate::error::ChatError;
use crate::models::{ConnectionId, LeaveReason, ServerMessage};
use tracing::{debug, info, warn};

impl ChatService {
    /// skip / 切断によるセッション離脱
    ///
    /// - Waiting: キューから外してIdleへ（通知なし）
    /// - Paired: ルームを解体し、相手をIdleに戻してpartner-leftを通知
    /// - skipの場合は本人にskippedを返す
    /// - Idle: 状態は変えない（2回呼ばれても相手への再通知はない）
    pub fn leave(&mut self, id: ConnectionId, reason: LeaveReason) -> Result<(), ChatError> {
        let state = self
            .registry
            .state(id)
            .cloned()
            .ok_or(ChatError::NotFound(id))?;

        match state {
            ConnectionState::Idle => {
                // 状態は変えない。skipの応答だけは返す
                debug!(connection = %id, ?reason, "Leave on idle connection");
            }
            ConnectionState::Waiting => {
                self.queue.retain(|queued| *queued != id);
                self.registry.set_state(id, ConnectionState::Idle)?;
                info!(connection = %id, ?reason, "🚪 Left waiting queue");
            }
            ConnectionState::Paired { room_id, partner } => {
                match self.rooms.remove(&room_id) {
                    Some(room) if room.partner_of(id) == Some(partner) => {}
                    Some(room) => {
                        warn!(room = %room_id, connection = %id, "⚠️ Room record disagreed with registry on leave");
                        let others: Vec<ConnectionId> =
                            room.members().into_iter().filter(|m| *m != id).collect();
                        self.dissolve(&room_id, &others);
                    }
                    None => {
                        warn!(room = %room_id, connection = %id, "⚠️ Room missing on leave");
                    }
                }

                let partner_points_back = matches!(
                    self.registry.state(partner),
                    Some(ConnectionState::Paired { room_id: r, partner: p }) if *r == room_id && *p == id
                );
                if partner_points_back {
                    self.registry.set_state(partner, ConnectionState::Idle)?;
                    self.push(partner, ServerMessage::PartnerLeft);
                }
                self.registry.set_state(id, ConnectionState::Idle)?;
                info!(room = %room_id, connection = %id, partner = %partner, ?reason, "🧹 Cleaned up room");
            }
        }

        if reason == LeaveReason::Skip {
            self.push(id, ServerMessage::Skipped);
        }
        Ok(())
    }
}
