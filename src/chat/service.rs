use crate::chat::registry::{ConnectionRegistry, ConnectionState};
use crate::chat::room::Room;
use crate::error::ChatError;
use crate::models::{ConnectionId, LeaveReason, RoomId, ServerMessage, StatusReport};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

/// 送信予定のメッセージ（宛先つき）
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub message: ServerMessage,
}

/// マッチング・中継の状態をまとめて持つサービス
///
/// 待機キュー、ルーム、接続レジストリを1か所で所有する。各操作は状態を更新し、
/// 送るべきメッセージをoutboxに積むだけで、送信そのものは行わない。
/// 実際の送信は [`crate::chat::server::ChatServer`] が担当する。
#[derive(Debug, Default)]
pub struct ChatService {
    pub(super) registry: ConnectionRegistry,
    pub(super) queue: VecDeque<ConnectionId>,
    pub(super) rooms: HashMap<RoomId, Room>,
    pub(super) outbox: Vec<Delivery>,
    pub(super) dropped_events: u64,
}

impl ChatService {
    pub fn new() -> Self {
        Self::default()
    }

    /// 新規接続を登録し、全員に接続数を通知
    pub fn connect(&mut self, id: ConnectionId) -> Result<(), ChatError> {
        self.registry.register(id)?;
        info!(connection = %id, users = self.registry.len(), "🔌 Connection registered");
        self.broadcast_user_count();
        Ok(())
    }

    /// 切断処理: セッションを片付けてからレジストリから削除
    pub fn disconnect(&mut self, id: ConnectionId) -> Result<(), ChatError> {
        if !self.registry.contains(id) {
            return Err(ChatError::NotFound(id));
        }
        self.leave(id, LeaveReason::Disconnect)?;
        self.registry.unregister(id)?;
        info!(connection = %id, users = self.registry.len(), "👋 Connection unregistered");
        self.broadcast_user_count();
        Ok(())
    }

    /// 溜まった送信予定メッセージを取り出す
    pub fn drain_outbox(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.outbox)
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            status: "OK".to_string(),
            users: self.registry.len(),
            waiting: self.queue.len(),
            active_rooms: self.rooms.len(),
            dropped_events: self.dropped_events,
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn lookup_partner(&self, id: ConnectionId) -> Option<ConnectionId> {
        self.registry.lookup_partner(id)
    }

    pub fn state(&self, id: ConnectionId) -> Option<&ConnectionState> {
        self.registry.state(id)
    }

    /// 待機キューの中身（先頭が一番長く待っている）
    pub fn queue(&self) -> Vec<ConnectionId> {
        self.queue.iter().copied().collect()
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn room(&self, id: &RoomId) -> Option<&Room> {
        self.rooms.get(id)
    }

    pub fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    pub(super) fn push(&mut self, to: ConnectionId, message: ServerMessage) {
        self.outbox.push(Delivery { to, message });
    }

    pub(super) fn broadcast_user_count(&mut self) {
        let count = self.registry.len();
        let ids: Vec<ConnectionId> = self.registry.ids().collect();
        for id in ids {
            self.push(id, ServerMessage::UserCount(count));
        }
    }

    /// ペアを強制的に解体する
    ///
    /// このルームを指しているメンバーだけをIdleに戻し、partner-leftを通知する。
    pub(super) fn dissolve(&mut self, room_id: &RoomId, members: &[ConnectionId]) {
        self.rooms.remove(room_id);
        for &member in members {
            let points_here = matches!(
                self.registry.state(member),
                Some(ConnectionState::Paired { room_id: r, .. }) if r == room_id
            );
            if points_here && self.registry.set_state(member, ConnectionState::Idle).is_ok() {
                self.push(member, ServerMessage::PartnerLeft);
            }
        }
    }

    /// 不整合の検出と修復。修復した件数を返す
    ///
    /// - メンバーの状態と食い違うルームは解体
    /// - 存在しないルームを指すPaired接続はIdleへ
    /// - Waitingでないキュー要素・重複は削除、キューにいないWaiting接続は末尾へ
    pub fn audit(&mut self) -> usize {
        let mut repairs = 0;

        let broken_rooms: Vec<(RoomId, [ConnectionId; 2])> = self
            .rooms
            .values()
            .filter(|room| {
                let [a, b] = room.members();
                !self.is_paired_with(a, room.id(), b) || !self.is_paired_with(b, room.id(), a)
            })
            .map(|room| (room.id().clone(), room.members()))
            .collect();
        for (room_id, members) in broken_rooms {
            warn!(room = %room_id, "⚠️ Tearing down inconsistent room");
            self.dissolve(&room_id, &members);
            repairs += 1;
        }

        let orphans: Vec<(ConnectionId, RoomId, ConnectionId)> = self
            .registry
            .iter()
            .filter_map(|c| match &c.state {
                ConnectionState::Paired { room_id, partner } => {
                    let valid = self
                        .rooms
                        .get(room_id)
                        .is_some_and(|room| room.partner_of(c.id) == Some(*partner));
                    (!valid).then(|| (c.id, room_id.clone(), *partner))
                }
                _ => None,
            })
            .collect();
        for (id, room_id, partner) in orphans {
            // 直前の解体で既にIdleになっている場合がある
            if !matches!(self.registry.state(id), Some(ConnectionState::Paired { .. })) {
                continue;
            }
            warn!(connection = %id, room = %room_id, "⚠️ Paired connection without a room");
            self.dissolve(&room_id, &[id, partner]);
            repairs += 1;
        }

        let mut seen = HashSet::new();
        let before = self.queue.len();
        let registry = &self.registry;
        self.queue.retain(|id| {
            seen.insert(*id) && matches!(registry.state(*id), Some(ConnectionState::Waiting))
        });
        if self.queue.len() != before {
            warn!(removed = before - self.queue.len(), "⚠️ Removed stale queue entries");
            repairs += before - self.queue.len();
        }

        let stranded: Vec<ConnectionId> = self
            .registry
            .iter()
            .filter(|c| c.state == ConnectionState::Waiting && !seen.contains(&c.id))
            .map(|c| c.id)
            .collect();
        for id in stranded {
            warn!(connection = %id, "⚠️ Waiting connection missing from queue, re-enqueued");
            self.queue.push_back(id);
            repairs += 1;
        }

        repairs
    }

    fn is_paired_with(&self, id: ConnectionId, room_id: &RoomId, partner: ConnectionId) -> bool {
        matches!(
            self.registry.state(id),
            Some(ConnectionState::Paired { room_id: r, partner: p }) if r == room_id && *p == partner
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn service_with(n: usize) -> (ChatService, Vec<ConnectionId>) {
        let mut service = ChatService::new();
        let ids: Vec<ConnectionId> = (0..n).map(|_| ConnectionId::new()).collect();
        for id in &ids {
            service.connect(*id).unwrap();
        }
        service.drain_outbox();
        (service, ids)
    }

    fn messages_for(service: &mut ChatService, id: ConnectionId) -> Vec<ServerMessage> {
        service
            .drain_outbox()
            .into_iter()
            .filter(|d| d.to == id && !matches!(d.message, ServerMessage::UserCount(_)))
            .map(|d| d.message)
            .collect()
    }

    fn pair(service: &mut ChatService, a: ConnectionId, b: ConnectionId) -> RoomId {
        service.join_queue(a).unwrap();
        service.join_queue(b).unwrap();
        service.drain_outbox();
        RoomId::for_members(a, b)
    }

    #[test]
    fn test_relay_with_missing_room_dissolves_pair() {
        let (mut service, ids) = service_with(2);
        let (a, b) = (ids[0], ids[1]);
        pair(&mut service, a, b);
        service.rooms.clear();

        let result = service.relay_chat(a, "hi".to_string(), Utc::now());
        assert!(matches!(result, Err(ChatError::InvariantViolation { .. })));
        assert_eq!(service.state(a), Some(&ConnectionState::Idle));
        assert_eq!(service.state(b), Some(&ConnectionState::Idle));
        assert_eq!(service.dropped_events(), 1);

        let out = service.drain_outbox();
        for id in [a, b] {
            let received: Vec<&ServerMessage> =
                out.iter().filter(|d| d.to == id).map(|d| &d.message).collect();
            assert_eq!(received, vec![&ServerMessage::PartnerLeft]);
        }
    }

    #[test]
    fn test_join_skips_stale_queue_head() {
        let (mut service, ids) = service_with(3);
        let (stale, waiting, joiner) = (ids[0], ids[1], ids[2]);
        service.join_queue(waiting).unwrap();
        service.drain_outbox();
        // Idleのままキューに残った要素
        service.queue.push_front(stale);

        service.join_queue(joiner).unwrap();

        assert!(service.queue.is_empty());
        assert_eq!(service.lookup_partner(joiner), Some(waiting));
        assert_eq!(service.lookup_partner(waiting), Some(joiner));
        assert_eq!(service.state(stale), Some(&ConnectionState::Idle));
        assert!(messages_for(&mut service, stale).is_empty());
    }

    #[test]
    fn test_join_rejects_own_queue_entry() {
        let (mut service, ids) = service_with(1);
        let joiner = ids[0];
        service.queue.push_back(joiner);

        let result = service.join_queue(joiner);

        assert_eq!(result, Err(ChatError::SelfMatch(joiner)));
        assert!(service.rooms.is_empty());
        assert!(service.queue.is_empty());
        assert_eq!(service.state(joiner), Some(&ConnectionState::Idle));
        assert!(messages_for(&mut service, joiner).is_empty());
    }

    #[test]
    fn test_audit_requeues_stranded_waiting_connection() {
        let (mut service, ids) = service_with(1);
        let w = ids[0];
        service.registry.set_state(w, ConnectionState::Waiting).unwrap();

        assert_eq!(service.audit(), 1);
        assert_eq!(service.queue(), vec![w]);
        assert_eq!(service.audit(), 0);
    }

    #[test]
    fn test_audit_tears_down_room_with_idle_member() {
        let (mut service, ids) = service_with(2);
        let (a, b) = (ids[0], ids[1]);
        let room_id = pair(&mut service, a, b);
        service.registry.set_state(a, ConnectionState::Idle).unwrap();

        assert_eq!(service.audit(), 1);
        assert!(service.room(&room_id).is_none());
        assert_eq!(service.state(b), Some(&ConnectionState::Idle));

        let out = service.drain_outbox();
        let to_b: Vec<&ServerMessage> = out.iter().filter(|d| d.to == b).map(|d| &d.message).collect();
        assert_eq!(to_b, vec![&ServerMessage::PartnerLeft]);
        assert!(out.iter().all(|d| d.to != a));
    }

    #[test]
    fn test_leave_with_disagreeing_room_releases_every_member() {
        let (mut service, ids) = service_with(3);
        let (a, b, c) = (ids[0], ids[1], ids[2]);
        let room_id = pair(&mut service, a, b);

        // ルームの記録はa-c、レジストリ上のaの相手はb
        service.rooms.insert(room_id.clone(), Room::new(a, c).unwrap());
        service
            .registry
            .set_state(
                c,
                ConnectionState::Paired {
                    room_id: room_id.clone(),
                    partner: a,
                },
            )
            .unwrap();

        service.leave(a, LeaveReason::Skip).unwrap();

        for id in [a, b, c] {
            assert_eq!(service.state(id), Some(&ConnectionState::Idle));
        }
        assert!(service.rooms.is_empty());

        let out = service.drain_outbox();
        let for_id = |id: ConnectionId| -> Vec<ServerMessage> {
            out.iter().filter(|d| d.to == id).map(|d| d.message.clone()).collect()
        };
        assert_eq!(for_id(a), vec![ServerMessage::Skipped]);
        assert_eq!(for_id(b), vec![ServerMessage::PartnerLeft]);
        assert_eq!(for_id(c), vec![ServerMessage::PartnerLeft]);
    }
}
