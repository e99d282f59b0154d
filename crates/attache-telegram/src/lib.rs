//! attache-telegram: outbound delivery over the Telegram Bot API.
//!
//! Three pieces: a pure markdown sanitizer that rewrites generated text into
//! the transport's dialect, a thin HTTP client for `sendMessage`, and the
//! delivery engine that drives retries and format fallback over an injected
//! transport.

pub mod api;
pub mod delivery;
pub mod markdown;

pub use api::{SendMessageParams, SendOutcome, TelegramApi, Transport};
pub use delivery::{ChatHistory, DeliveryEngine, MessageFormat};
pub use markdown::sanitize;
