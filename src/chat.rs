mod lifecycle;
mod matchmaker;
pub mod registry;
mod relay;
pub mod room;
pub mod server;
pub mod service;

pub use registry::{Connection, ConnectionRegistry, ConnectionState};
pub use room::Room;
pub use server::{ChatServer, ClientEvent, Connect, Disconnect, GetStatus};
pub use service::{ChatService, Delivery};
