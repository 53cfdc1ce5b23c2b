//! Beacon Voice - wake-phrase voice assistant with a streaming chat relay
//!
//! This library provides:
//! - Continuous recognition with wake phrase detection and command capture
//! - Turn-taking that keeps the assistant from hearing itself
//! - A streamed response consumer for server-sent chat events
//! - The relay server that fronts the completion provider
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                      Assistant                        │
//! │  Recognition  │  Wake detector  │  Turn  │  Output   │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ POST /api/chat (SSE)
//! ┌──────────────────────────▼───────────────────────────┐
//! │                        Relay                          │
//! └──────────────────────────┬───────────────────────────┘
//!                            │ chat/completions (stream)
//! ┌──────────────────────────▼───────────────────────────┐
//! │                 Completion provider                   │
//! └──────────────────────────────────────────────────────┘
//! ```

pub mod assistant;
pub mod chat;
pub mod config;
pub mod error;
pub mod relay;
pub mod signal;
pub mod voice;

pub use assistant::{Assistant, AssistantStatus};
pub use chat::{ChatMessage, ResponseConsumer, StreamedResponse};
pub use config::{RelayConfig, Timings, VoiceConfig};
pub use error::{Error, Result};
pub use signal::{Signal, SignalReceiver, SignalSender};
