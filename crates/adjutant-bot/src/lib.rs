//! Owner-facing control-channel bot (teloxide, long polling).
//!
//! Everything inbound is owner-gated; everything outbound goes through the
//! chunked HTML-with-plain-fallback sender.

pub mod adapter;
pub mod callbacks;
pub mod commands;
pub mod send;

pub use adapter::{BotAdapter, BotContext};
