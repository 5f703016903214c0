use actix_cors::Cors;
use actix_web::http::{self, Method};

/// ブラウザクライアント向けのCORS設定
///
/// オリジン未指定なら全許可（credentialsは付けない）。
/// 指定ありならそのオリジンだけ許可し、credentialsも許可する。
pub fn build_cors(origins: &[String]) -> Cors {
    let cors = Cors::default()
        .allowed_methods(vec![Method::GET, Method::POST])
        .allowed_headers(vec![http::header::CONTENT_TYPE, http::header::ACCEPT])
        .max_age(3600);

    if origins.is_empty() {
        return cors.allow_any_origin();
    }

    origins
        .iter()
        .fold(cors, |cors, origin| cors.allowed_origin(origin))
        .supports_credentials()
}
