//! Realtime voice (and video) sessions.
//!
//! # Architecture
//!
//! - **Devices** ([`devices`], [`audio`], [`camera`]): microphone capture and
//!   speaker output via `cpal`, camera snapshots as JPEG
//! - **Playback** ([`playback`]): gapless scheduling of model audio and the
//!   16-bit PCM codec
//! - **Tools** ([`tools`]): the functions the model may call
//! - **Session** ([`session`]): the state machine tying link, devices and
//!   tools together
//! - **Visualizer** ([`visualizer`]): snapshots for renderers

pub mod audio;
pub mod camera;
pub mod devices;
pub mod instructions;
pub mod playback;
pub mod session;
pub mod state;
pub mod tools;
pub mod visualizer;

pub use devices::{MediaDevices, SystemDevices};
pub use session::{LiveServices, LiveSession, LiveSettings};
pub use state::{LiveVariant, SessionState};
pub use visualizer::LiveSnapshot;
