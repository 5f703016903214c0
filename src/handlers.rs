pub mod cors;
pub mod status;
pub mod websocket;

pub use cors::build_cors;
pub use status::health;
pub use websocket::ws_handler;
