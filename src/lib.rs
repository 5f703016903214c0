pub mod chat;
pub mod config;
pub mod error;
pub mod handlers;
pub mod models;
