//! Telegram glue: update routing, status sink and uploader.

pub mod handlers;
pub mod keyboard;
pub mod sink;
pub mod upload;

pub use handlers::{schema, HandlerDeps, HandlerError};
pub use sink::TelegramSink;
pub use upload::TelegramUploader;
