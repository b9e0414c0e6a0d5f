//! Sarjo: a multi-mode generative AI studio for the terminal.
//!
//! This crate provides chat panels and realtime voice sessions backed by
//! Google's Generative Language API:
//! Composer → Panel → Vendor → Transcript
//!
//! # Architecture
//!
//! - **Shell**: mode switching, header clock, sign-in flow and slash commands
//! - **Composer**: pending text, attachments, model and extension tags
//! - **Panels**: one generic chat panel per mode (chat, analyzed, creative,
//!   code, vision) plus the long-running video director
//! - **Live**: bidirectional voice (and camera) sessions over WebSocket,
//!   with native audio via `cpal`, tool calls and a captions board
//! - **Alarms** and **Vault**: the shared alarm registry and the persisted
//!   observation log written by live sessions

pub mod alarms;
pub mod composer;
pub mod config;
pub mod error;
pub mod gemini;
pub mod live;
pub mod logging;
pub mod panel;
pub mod shell;
pub mod studio_dirs;
pub mod testing;
pub mod transcript;
pub mod vault;

pub use alarms::{Alarm, AlarmRegistry};
pub use composer::{Attachment, ComposedPrompt, Composer};
pub use config::StudioConfig;
pub use error::{Result, StudioError};
pub use live::{LiveSession, LiveSnapshot, LiveVariant, SessionState};
pub use panel::ChatPanel;
pub use panel::profiles::{ModeProfile, PanelMode};
pub use shell::{Shell, StudioMode};
pub use transcript::{Message, Role, Transcript};
pub use vault::{NeuralVault, VaultEntry};
