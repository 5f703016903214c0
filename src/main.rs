use actix::Actor;
use actix_web::{web, App, HttpServer};
use stranger_chat_server::chat::ChatServer;
use stranger_chat_server::config::Config;
use stranger_chat_server::handlers::{build_cors, health, ws_handler};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stranger_chat_server=debug,actix_web=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 設定読み込み
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    info!("🎥 Starting random chat server v{}", env!("CARGO_PKG_VERSION"));

    // マッチングサーバーアクター起動
    let chat_server = ChatServer::new(config.audit_interval).start();

    let bind_addr = (config.host.clone(), config.port);
    info!("🌐 Listening on http://{}:{}", bind_addr.0, bind_addr.1);
    info!("📊 Health check available at http://{}:{}/health", bind_addr.0, bind_addr.1);

    let app_config = config.clone();
    HttpServer::new(move || {
        App::new()
            .wrap(build_cors(&app_config.cors_origins))
            .app_data(web::Data::new(chat_server.clone()))
            .app_data(web::Data::new(app_config.clone()))
            .route("/health", web::get().to(health))
            .route("/ws", web::get().to(ws_handler))
    })
    .bind(bind_addr)?
    .run()
    .await
}
