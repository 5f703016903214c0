use crate::chat::registry::ConnectionState;
use crate::chat::service::ChatService;
use crate::error::ChatError;
use crate::models::{ConnectionId, ServerMessage, SignalKind};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, warn};

impl ChatService {
    /// テキストチャットを相手にだけ転送する（送信者にはエコーしない）
    pub fn relay_chat(
        &mut self,
        from: ConnectionId,
        text: String,
        timestamp: DateTime<Utc>,
    ) -> Result<(), ChatError> {
        let partner = self.resolve_partner(from, "send-message")?;
        debug!(from = %from, to = %partner, "💬 Relaying chat message");
        self.push(
            partner,
            ServerMessage::ReceiveMessage {
                message: text,
                timestamp,
            },
        );
        Ok(())
    }

    /// offer / answer / ice-candidate を中身に触れずに相手へ転送する
    pub fn relay_signal(
        &mut self,
        from: ConnectionId,
        kind: SignalKind,
        payload: Value,
    ) -> Result<(), ChatError> {
        let partner = self.resolve_partner(from, kind.as_str())?;
        debug!(from = %from, to = %partner, kind = kind.as_str(), "📡 Relaying signal");
        self.push(partner, kind.into_server_message(payload));
        Ok(())
    }

    /// 中継先の相手を解決する
    ///
    /// 失敗した場合はイベントを破棄し、dropped_eventsを加算する。
    /// ルームとレジストリが食い違っていればペアを解体する。
    fn resolve_partner(
        &mut self,
        from: ConnectionId,
        event: &'static str,
    ) -> Result<ConnectionId, ChatError> {
        let (room_id, partner) = match self.registry.state(from) {
            Some(ConnectionState::Paired { room_id, partner }) => (room_id.clone(), *partner),
            Some(state) => {
                self.dropped_events += 1;
                return Err(ChatError::ProtocolViolation {
                    id: from,
                    event,
                    state: state.name(),
                });
            }
            None => {
                self.dropped_events += 1;
                return Err(ChatError::NotFound(from));
            }
        };

        let room_ok = self
            .rooms
            .get(&room_id)
            .is_some_and(|room| room.partner_of(from) == Some(partner));
        let symmetric = self.registry.lookup_partner(partner) == Some(from);
        if !room_ok || !symmetric {
            warn!(room = %room_id, from = %from, "⚠️ Inconsistent pairing, tearing it down");
            let mut members = vec![from, partner];
            if let Some(room) = self.rooms.get(&room_id) {
                members.extend(room.members());
            }
            self.dissolve(&room_id, &members);
            self.dropped_events += 1;
            return Err(ChatError::InvariantViolation {
                room: room_id,
                detail: format!("{} is paired with {} but the room disagrees", from, partner),
            });
        }

        Ok(partner)
    }
}
