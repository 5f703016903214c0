use crate::chat::{ChatServer, ClientEvent, Connect, Disconnect};
use crate::config::Config;
use crate::models::{ClientMessage, ConnectionId, ServerMessage};
use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 送信キューの確認間隔
const POLL_INTERVAL_MS: u64 = 10;

/// WebSocketアクター（1接続につき1つ）
pub struct WsSession {
    /// ハートビート最終時刻
    hb: Instant,
    /// 接続ID
    id: ConnectionId,
    /// マッチングサーバーアドレス
    server: Addr<ChatServer>,
    heartbeat_interval: Duration,
    client_timeout: Duration,
    /// メッセージ受信チャンネル（送信側はConnect時にサーバーへ渡す）
    rx: mpsc::UnboundedReceiver<ServerMessage>,
    tx: Option<mpsc::UnboundedSender<ServerMessage>>,
}

impl WsSession {
    pub fn new(server: Addr<ChatServer>, config: &Config) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            hb: Instant::now(),
            id: ConnectionId::new(),
            server,
            heartbeat_interval: config.heartbeat_interval,
            client_timeout: config.client_timeout,
            rx,
            tx: Some(tx),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    /// ハートビート送信
    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                warn!(connection = %act.id, "💔 Heartbeat timed out, closing");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// メッセージポーリング
    fn poll_messages(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(Duration::from_millis(POLL_INTERVAL_MS), |act, ctx| {
            while let Ok(msg) = act.rx.try_recv() {
                debug!(connection = %act.id, ?msg, "📤 Sending message to client");
                match serde_json::to_string(&msg) {
                    Ok(json) => ctx.text(json),
                    Err(e) => warn!(connection = %act.id, error = %e, "Failed to serialize message"),
                }
            }
        });
    }

    fn handle_text(&mut self, text: &str) {
        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => {
                debug!(connection = %self.id, event = message.event_name(), "📨 Received event");
                self.server.do_send(ClientEvent {
                    id: self.id,
                    message,
                });
            }
            Err(e) => {
                // エラーイベントは存在しないので破棄するだけ
                warn!(connection = %self.id, error = %e, "❌ Failed to deserialize client message");
            }
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        self.poll_messages(ctx);

        if let Some(sender) = self.tx.take() {
            self.server.do_send(Connect {
                id: self.id,
                sender,
            });
        }
        info!(connection = %self.id, "🔌 WebSocket connected");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(connection = %self.id, "🔌 WebSocket disconnected");
        self.server.do_send(Disconnect { id: self.id });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_text(&text);
            }
            Ok(ws::Message::Binary(_)) => {
                warn!(connection = %self.id, "Binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!(connection = %self.id, error = %e, "WebSocket protocol error");
                ctx.stop();
            }
            _ => {}
        }
    }
}

/// WebSocketエンドポイント
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    server: web::Data<Addr<ChatServer>>,
    config: web::Data<Config>,
) -> Result<HttpResponse, Error> {
    let session = WsSession::new(server.get_ref().clone(), config.get_ref());
    debug!(connection = %session.id(), peer = ?req.peer_addr(), "WebSocket connection attempt");
    ws::start(session, &req, stream)
}
