use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// 接続ID（接続中は再利用されない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

// ルームID（メンバー2人のIDから順序に依存せず決まる）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn for_members(a: ConnectionId, b: ConnectionId) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        Self(format!("room_{}_{}", low, high))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// シグナリング種別
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    Offer,
    Answer,
    IceCandidate,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Offer => "offer",
            SignalKind::Answer => "answer",
            SignalKind::IceCandidate => "ice-candidate",
        }
    }

    /// 相手に転送するメッセージを組み立てる（ペイロードは加工しない）
    pub fn into_server_message(self, payload: Value) -> ServerMessage {
        match self {
            SignalKind::Offer => ServerMessage::Offer(payload),
            SignalKind::Answer => ServerMessage::Answer(payload),
            SignalKind::IceCandidate => ServerMessage::IceCandidate(payload),
        }
    }
}

// 退出理由
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    Skip,
    Disconnect,
}

// WebSocketメッセージ: クライアント→サーバー
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinQueue {
        #[serde(default)]
        timestamp: Option<DateTime<Utc>>,
    },
    SendMessage {
        message: String,
    },
    // SDP / ICE ペイロードは中身を解釈せずそのまま中継する
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
    Skip,
}

impl ClientMessage {
    pub fn event_name(&self) -> &'static str {
        match self {
            ClientMessage::JoinQueue { .. } => "join-queue",
            ClientMessage::SendMessage { .. } => "send-message",
            ClientMessage::Offer(_) => "offer",
            ClientMessage::Answer(_) => "answer",
            ClientMessage::IceCandidate(_) => "ice-candidate",
            ClientMessage::Skip => "skip",
        }
    }
}

// WebSocketメッセージ: サーバー→クライアント
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "kebab-case")]
pub enum ServerMessage {
    Waiting,
    MatchFound {
        #[serde(rename = "roomId")]
        room_id: RoomId,
        #[serde(rename = "partnerId")]
        partner_id: ConnectionId,
    },
    ReceiveMessage {
        message: String,
        timestamp: DateTime<Utc>,
    },
    Offer(Value),
    Answer(Value),
    IceCandidate(Value),
    PartnerLeft,
    Skipped,
    UserCount(usize),
}

// GET /health のレスポンス
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    pub users: usize,
    pub waiting: usize,
    #[serde(rename = "activeRooms")]
    pub active_rooms: usize,
    #[serde(rename = "droppedEvents")]
    pub dropped_events: u64,
}
