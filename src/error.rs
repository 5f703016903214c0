use crate::models::{ConnectionId, RoomId};
use thiserror::Error;

/// チャットサービスのエラー
///
/// どれもクライアントへのエラーイベントにはならない。呼び出し側でログに出して破棄するか、
/// 状態遷移（切断扱い・ルーム強制解体）に吸収する。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChatError {
    /// 現在の状態では受け付けられないイベント（例: Idle中のsend-message）
    #[error("protocol violation from {id}: {event} is not allowed while {state}")]
    ProtocolViolation {
        id: ConnectionId,
        event: &'static str,
        state: &'static str,
    },

    /// レジストリに存在しない接続
    #[error("connection not found: {0}")]
    NotFound(ConnectionId),

    #[error("connection already registered: {0}")]
    AlreadyRegistered(ConnectionId),

    /// 自分自身とのマッチング（レジストリの不整合でしか起きない）
    #[error("refusing to match connection {0} with itself")]
    SelfMatch(ConnectionId),

    /// ルームとレジストリの状態が食い違っている
    #[error("invariant violation in {room}: {detail}")]
    InvariantViolation { room: RoomId, detail: String },

    /// 相手への送信に失敗した
    #[error("transport failure while sending to {0}")]
    TransportFailure(ConnectionId),
}

/// 設定読み込みエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidValue { name: &'static str, value: String },
}
