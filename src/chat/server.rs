use crate::chat::service::ChatService;
use crate::error::ChatError;
use crate::models::{ClientMessage, ConnectionId, LeaveReason, ServerMessage, SignalKind, StatusReport};
use actix::prelude::*;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// マッチングサーバーアクター
///
/// [`ChatService`] を単独で所有し、メールボックスのメッセージを1件ずつ処理する。
/// キューのpopとルーム作成が他の操作と割り込み合わないのはこのため。
pub struct ChatServer {
    service: ChatService,
    /// WebSocket送信用チャンネル (connection_id -> sender)
    sessions: HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>,
    /// 不整合チェックの間隔
    audit_interval: Duration,
}

impl ChatServer {
    pub fn new(audit_interval: Duration) -> Self {
        Self {
            service: ChatService::new(),
            sessions: HashMap::new(),
            audit_interval,
        }
    }

    /// outboxを送信する
    ///
    /// 送信に失敗した相手は切断扱いにし、その後処理で生まれた通知も続けて送る。
    fn flush(&mut self) {
        loop {
            let deliveries = self.service.drain_outbox();
            if deliveries.is_empty() {
                break;
            }

            let mut failed = Vec::new();
            for delivery in deliveries {
                match self.sessions.get(&delivery.to) {
                    Some(sender) => {
                        if sender.send(delivery.message).is_err() && !failed.contains(&delivery.to) {
                            failed.push(delivery.to);
                        }
                    }
                    None => debug!(connection = %delivery.to, "No sender for delivery, dropping"),
                }
            }

            for id in failed {
                self.sessions.remove(&id);
                warn!(error = %ChatError::TransportFailure(id), "📴 Treating as disconnect");
                if let Err(e) = self.service.disconnect(id) {
                    debug!(connection = %id, error = %e, "Disconnect after transport failure");
                }
            }
        }
    }

    fn log_rejected(&self, id: ConnectionId, err: &ChatError) {
        match err {
            ChatError::ProtocolViolation { .. } => warn!(connection = %id, error = %err, "Event ignored"),
            ChatError::NotFound(_) => debug!(connection = %id, error = %err, "Event dropped"),
            ChatError::InvariantViolation { .. } => warn!(connection = %id, error = %err, "Pairing torn down"),
            _ => error!(connection = %id, error = %err, "Event rejected"),
        }
    }

    fn dispatch(&mut self, id: ConnectionId, message: ClientMessage) -> Result<(), ChatError> {
        match message {
            ClientMessage::JoinQueue { .. } => self.service.join_queue(id),
            ClientMessage::SendMessage { message } => self.service.relay_chat(id, message, Utc::now()),
            ClientMessage::Offer(payload) => self.service.relay_signal(id, SignalKind::Offer, payload),
            ClientMessage::Answer(payload) => self.service.relay_signal(id, SignalKind::Answer, payload),
            ClientMessage::IceCandidate(payload) => {
                self.service.relay_signal(id, SignalKind::IceCandidate, payload)
            }
            ClientMessage::Skip => self.service.leave(id, LeaveReason::Skip),
        }
    }
}

impl Default for ChatServer {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

impl Actor for ChatServer {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(audit_interval = ?self.audit_interval, "🚀 Chat server started");

        ctx.run_interval(self.audit_interval, |act, _ctx| {
            let repairs = act.service.audit();
            if repairs > 0 {
                warn!(repairs, "🩹 Audit repaired inconsistent state");
            }
            act.flush();
        });
    }
}

// メッセージ: 接続
#[derive(Message)]
#[rtype(result = "()")]
pub struct Connect {
    pub id: ConnectionId,
    pub sender: mpsc::UnboundedSender<ServerMessage>,
}

impl Handler<Connect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) {
        match self.service.connect(msg.id) {
            Ok(()) => {
                self.sessions.insert(msg.id, msg.sender);
            }
            Err(e) => self.log_rejected(msg.id, &e),
        }
        self.flush();
    }
}

// メッセージ: 切断
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub id: ConnectionId,
}

impl Handler<Disconnect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) {
        self.sessions.remove(&msg.id);
        if let Err(e) = self.service.disconnect(msg.id) {
            // 送信失敗で既に切断扱いになっている場合
            debug!(connection = %msg.id, error = %e, "Disconnect for unknown connection");
        }
        self.flush();
    }
}

// メッセージ: クライアントからのイベント
#[derive(Message)]
#[rtype(result = "()")]
pub struct ClientEvent {
    pub id: ConnectionId,
    pub message: ClientMessage,
}

impl Handler<ClientEvent> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: ClientEvent, _ctx: &mut Self::Context) {
        if let Err(e) = self.dispatch(msg.id, msg.message) {
            self.log_rejected(msg.id, &e);
        }
        self.flush();
    }
}

// メッセージ: 状態取得（診断用）
#[derive(Message)]
#[rtype(result = "StatusReport")]
pub struct GetStatus;

impl Handler<GetStatus> for ChatServer {
    type Result = MessageResult<GetStatus>;

    fn handle(&mut self, _msg: GetStatus, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.service.status())
    }
}
