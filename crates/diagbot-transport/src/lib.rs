//! diagbot-transport: Chat transports and bot configuration.
//!
//! Implements the `ChatTransport` trait for the Telegram Bot API, an
//! interactive console and a scripted mock, and loads `diagbot.toml`.

pub mod config;
pub mod console;
pub mod error;
pub mod mock;
pub mod telegram;

pub use config::{
    create_transport, load_config, resolve_bot_username, DiagbotConfig, TransportConfig,
};
pub use error::TransportError;
