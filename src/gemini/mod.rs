//! Client for Google's Generative Language API.
//!
//! - [`client`]: REST calls (`generateContent`, streamed SSE, long-running video)
//! - [`live`]: the realtime WebSocket session
//! - [`types`]: shared JSON wire types

pub mod client;
pub mod live;
pub mod sse;
pub mod types;

pub use client::{GeminiClient, GenerativeBackend, ResponseStream};
pub use live::{ClientMessage, LiveConnector, LiveEvent, LiveLink, LiveSetup, WebSocketConnector};
pub use types::{
    Content, FunctionCall, FunctionDeclaration, GenerateContentRequest, GenerateContentResponse,
    GenerationConfig, Part, ThinkingConfig, Tool,
};
