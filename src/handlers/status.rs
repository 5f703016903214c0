use crate::chat::{ChatServer, GetStatus};
use actix::Addr;
use actix_web::{web, HttpResponse, Responder};
use tracing::error;

/// GET /health - 接続数・待機数・ルーム数
pub async fn health(server: web::Data<Addr<ChatServer>>) -> impl Responder {
    match server.send(GetStatus).await {
        Ok(report) => HttpResponse::Ok().json(report),
        Err(e) => {
            error!(error = %e, "Chat server mailbox unavailable");
            HttpResponse::ServiceUnavailable().json(serde_json::json!({
                "status": "UNAVAILABLE"
            }))
        }
    }
}
