//! Realtime bidirectional session over the vendor's WebSocket endpoint.
//!
//! The client sends one `setup` message, then streams `realtimeInput` media
//! chunks and answers `toolCall`s with `toolResponse`s. Server frames (text
//! or binary, both JSON) are decoded into [`LiveEvent`]s and delivered on a
//! bounded channel, in arrival order.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::types::{Blob, Content, FunctionCall, FunctionResponse, GenerationConfig, Tool};
use crate::error::{Result, StudioError};

/// Capacity of the inbound event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Capacity of the outbound media queue. Chunks beyond it are dropped.
const MEDIA_QUEUE_CAPACITY: usize = 64;

/// Interval of WebSocket keep-alive pings.
const PING_INTERVAL: Duration = Duration::from_secs(20);

// ── Client messages ───────────────────────────────────────────

/// Empty marker object, e.g. `inputAudioTranscription: {}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enabled {}

/// Session configuration, sent once right after connecting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveSetup {
    /// Fully qualified model name (`models/...`).
    pub model: String,
    /// Output modality, voice and temperature.
    pub generation_config: GenerationConfig,
    /// System instruction.
    pub system_instruction: Content,
    /// Declared tools.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<Tool>,
    /// Request transcripts of the user's speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Enabled>,
    /// Request transcripts of the model's speech.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Enabled>,
}

/// Streamed media input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    /// Audio or image chunks.
    pub media_chunks: Vec<Blob>,
}

/// Answers to tool calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResponse {
    /// One response per answered call.
    pub function_responses: Vec<FunctionResponse>,
}

/// A message from client to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClientMessage {
    /// Session configuration.
    Setup(LiveSetup),
    /// Media chunks.
    RealtimeInput(RealtimeInput),
    /// Tool results.
    ToolResponse(ToolResponse),
}

impl ClientMessage {
    /// A single media chunk.
    pub fn media(mime_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::RealtimeInput(RealtimeInput {
            media_chunks: vec![Blob {
                mime_type: mime_type.into(),
                data: data.into(),
            }],
        })
    }

    /// A single tool result of the form `{ "result": ... }`.
    pub fn tool_result(
        id: Option<String>,
        name: impl Into<String>,
        result: serde_json::Value,
    ) -> Self {
        Self::ToolResponse(ToolResponse {
            function_responses: vec![FunctionResponse {
                id,
                name: name.into(),
                response: serde_json::json!({ "result": result }),
            }],
        })
    }
}

// ── Server messages ───────────────────────────────────────────

/// A transcript fragment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Transcription {
    /// Fragment text.
    #[serde(default)]
    pub text: Option<String>,
}

/// Model output for the current turn.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    /// Generated parts (audio as inline data).
    #[serde(default)]
    pub model_turn: Option<Content>,
    /// Transcript of the user's speech.
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    /// Transcript of the model's speech.
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
    /// The model finished its turn.
    #[serde(default)]
    pub turn_complete: bool,
    /// The user barged in; pending audio must be discarded.
    #[serde(default)]
    pub interrupted: bool,
}

/// Functions the model wants executed.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCall {
    /// Requested calls.
    #[serde(default)]
    pub function_calls: Vec<FunctionCall>,
}

/// A decoded server frame. Fields are mutually exclusive in practice.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    /// Setup acknowledged.
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    /// Model output.
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    /// Tool call request.
    #[serde(default)]
    pub tool_call: Option<ToolCall>,
    /// The server will close the connection soon.
    #[serde(default)]
    pub go_away: Option<serde_json::Value>,
}

/// Typed session event, consumed by the live session state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Setup acknowledged; the session is usable.
    Opened,
    /// Base64 PCM audio from the model.
    Audio {
        /// Base64 payload.
        data: String,
        /// Declared MIME type, e.g. `audio/pcm;rate=24000`.
        mime_type: String,
    },
    /// Transcript fragment of the user's speech.
    InputTranscript(String),
    /// Transcript fragment of the model's speech.
    OutputTranscript(String),
    /// The model finished its turn.
    TurnComplete,
    /// The user interrupted the model.
    Interrupted,
    /// The model requests tool execution.
    ToolCall(Vec<FunctionCall>),
    /// The server announced an imminent disconnect.
    GoAway,
    /// Transport or protocol failure.
    Error(String),
    /// The connection closed.
    Closed(Option<String>),
}

impl ServerMessage {
    /// Expand into events in the order they should be handled.
    ///
    /// Interruption comes before any audio in the same frame; turn
    /// completion comes last.
    pub fn into_events(self) -> Vec<LiveEvent> {
        let mut events = Vec::new();
        if self.setup_complete.is_some() {
            events.push(LiveEvent::Opened);
        }
        if let Some(content) = self.server_content {
            if content.interrupted {
                events.push(LiveEvent::Interrupted);
            }
            if let Some(text) = content.input_transcription.and_then(|t| t.text) {
                events.push(LiveEvent::InputTranscript(text));
            }
            if let Some(text) = content.output_transcription.and_then(|t| t.text) {
                events.push(LiveEvent::OutputTranscript(text));
            }
            for part in content.model_turn.into_iter().flat_map(|c| c.parts) {
                if let Some(blob) = part.inline_data {
                    events.push(LiveEvent::Audio {
                        data: blob.data,
                        mime_type: blob.mime_type,
                    });
                }
            }
            if content.turn_complete {
                events.push(LiveEvent::TurnComplete);
            }
        }
        if let Some(call) = self.tool_call
            && !call.function_calls.is_empty()
        {
            events.push(LiveEvent::ToolCall(call.function_calls));
        }
        if self.go_away.is_some() {
            events.push(LiveEvent::GoAway);
        }
        events
    }
}

// ── Link abstraction ──────────────────────────────────────────

/// An open live link.
pub trait LiveLink: Send + Sync {
    /// Queue a message for sending.
    ///
    /// # Errors
    ///
    /// Returns an error if the message cannot be encoded or the link is closed.
    fn send(&self, message: ClientMessage) -> Result<()>;

    /// Close the link. Idempotent.
    fn close(&self);
}

/// Opens live links.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Connect, send `setup`, and return the link plus its event stream.
    async fn connect(
        &self,
        setup: LiveSetup,
    ) -> Result<(Arc<dyn LiveLink>, mpsc::Receiver<LiveEvent>)>;
}

// ── WebSocket implementation ──────────────────────────────────

/// Connects to the vendor's live endpoint.
#[derive(Debug, Clone)]
pub struct WebSocketConnector {
    url: String,
    api_key: String,
}

impl WebSocketConnector {
    /// Connector for `url`, authenticating with `api_key` as the `key` query parameter.
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
        }
    }

    fn endpoint(&self) -> Result<url::Url> {
        let mut url = url::Url::parse(&self.url)
            .map_err(|e| StudioError::Live(format!("invalid live url '{}': {e}", self.url)))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url)
    }
}

/// Encoded messages waiting for the socket task.
///
/// Media chunks go through a bounded queue and are dropped when the socket
/// falls behind; tool responses use their own queue and are never dropped.
struct OutboundQueue {
    media: mpsc::Sender<String>,
    control: mpsc::UnboundedSender<String>,
}

impl OutboundQueue {
    fn new(
        media_capacity: usize,
    ) -> (Self, mpsc::Receiver<String>, mpsc::UnboundedReceiver<String>) {
        let (media, media_rx) = mpsc::channel(media_capacity);
        let (control, control_rx) = mpsc::unbounded_channel();
        (Self { media, control }, media_rx, control_rx)
    }

    fn push(&self, message: &ClientMessage) -> Result<()> {
        let json = serde_json::to_string(message)?;
        let closed = || StudioError::Channel("live link closed".to_owned());
        if let ClientMessage::RealtimeInput(_) = message {
            return match self.media.try_send(json) {
                Ok(()) => Ok(()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    debug!("media chunk dropped: outbound queue full");
                    Ok(())
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(closed()),
            };
        }
        self.control.send(json).map_err(|_| closed())
    }
}

/// Handle to a running WebSocket session task.
struct WebSocketLink {
    outbound: OutboundQueue,
    cancel: CancellationToken,
}

impl LiveLink for WebSocketLink {
    fn send(&self, message: ClientMessage) -> Result<()> {
        self.outbound.push(&message)
    }

    fn close(&self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl LiveConnector for WebSocketConnector {
    async fn connect(
        &self,
        setup: LiveSetup,
    ) -> Result<(Arc<dyn LiveLink>, mpsc::Receiver<LiveEvent>)> {
        use futures_util::{SinkExt, StreamExt};
        use tokio_tungstenite::{connect_async, tungstenite::Message};

        let url = self.endpoint()?;
        let (ws_stream, _) = connect_async(url.as_str())
            .await
            .map_err(|e| StudioError::Live(format!("connect: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        let setup_json = serde_json::to_string(&ClientMessage::Setup(setup))?;
        write
            .send(Message::Text(setup_json))
            .await
            .map_err(|e| StudioError::Live(format!("send setup: {e}")))?;
        info!("live link connected");

        let (event_tx, event_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let (outbound, mut media_rx, mut control_rx) = OutboundQueue::new(MEDIA_QUEUE_CAPACITY);
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        tokio::spawn(async move {
            let mut ping_interval = tokio::time::interval(PING_INTERVAL);
            ping_interval.tick().await;

            let ended = loop {
                tokio::select! {
                    () = task_cancel.cancelled() => {
                        let _ = write.send(Message::Close(None)).await;
                        break None;
                    }
                    msg = read.next() => match msg {
                        Some(Ok(Message::Text(text))) => {
                            if !forward_frame(text.as_bytes(), &event_tx).await {
                                break None;
                            }
                        }
                        Some(Ok(Message::Binary(bytes))) => {
                            if !forward_frame(&bytes, &event_tx).await {
                                break None;
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            break Some(LiveEvent::Closed(frame.map(|f| f.reason.to_string())));
                        }
                        None => break Some(LiveEvent::Closed(None)),
                        Some(Err(e)) => break Some(LiveEvent::Error(format!("read error: {e}"))),
                        Some(Ok(_)) => {}
                    },
                    Some(json) = control_rx.recv() => {
                        if let Err(e) = write.send(Message::Text(json)).await {
                            break Some(LiveEvent::Error(format!("send error: {e}")));
                        }
                    }
                    Some(json) = media_rx.recv() => {
                        if let Err(e) = write.send(Message::Text(json)).await {
                            break Some(LiveEvent::Error(format!("send error: {e}")));
                        }
                    }
                    _ = ping_interval.tick() => {
                        if let Err(e) = write.send(Message::Ping(Vec::new())).await {
                            break Some(LiveEvent::Error(format!("ping error: {e}")));
                        }
                    }
                }
            };

            if let Some(event) = ended {
                debug!(?event, "live link ended");
                let _ = event_tx.send(event).await;
            }
        });

        let link: Arc<dyn LiveLink> = Arc::new(WebSocketLink {
            outbound,
            cancel,
        });
        Ok((link, event_rx))
    }
}

/// Decode one frame and push its events. Returns `false` once the receiver is gone.
async fn forward_frame(bytes: &[u8], events: &mpsc::Sender<LiveEvent>) -> bool {
    let message: ServerMessage = match serde_json::from_slice(bytes) {
        Ok(m) => m,
        Err(e) => {
            warn!("ignoring unparseable live frame: {e}");
            return true;
        }
    };
    for event in message.into_events() {
        if events.send(event).await.is_err() {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use crate::gemini::types::SpeechConfig;
    use serde_json::json;

    #[test]
    fn setup_serializes_with_camel_case_envelope() {
        let setup = LiveSetup {
            model: "models/live-test".into(),
            generation_config: GenerationConfig {
                response_modalities: Some(vec!["AUDIO".into()]),
                speech_config: Some(SpeechConfig::prebuilt("Kore")),
                temperature: Some(0.8),
                ..GenerationConfig::default()
            },
            system_instruction: Content::system("be kind"),
            tools: Vec::new(),
            input_audio_transcription: Some(Enabled {}),
            output_audio_transcription: Some(Enabled {}),
        };
        let value = serde_json::to_value(ClientMessage::Setup(setup)).unwrap();
        let setup = &value["setup"];
        assert_eq!(setup["model"], "models/live-test");
        assert_eq!(setup["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            setup["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]
                ["voiceName"],
            "Kore"
        );
        assert_eq!(setup["inputAudioTranscription"], json!({}));
        assert_eq!(setup["systemInstruction"]["parts"][0]["text"], "be kind");
    }

    #[test]
    fn media_and_tool_messages_serialize() {
        let media = serde_json::to_value(ClientMessage::media("audio/pcm;rate=16000", "AAA=")).unwrap();
        assert_eq!(
            media,
            json!({ "realtimeInput": { "mediaChunks": [
                { "mimeType": "audio/pcm;rate=16000", "data": "AAA=" }
            ]}})
        );

        let response = serde_json::to_value(ClientMessage::tool_result(
            Some("call-1".into()),
            "setAlarm",
            json!("Alarm set."),
        ))
        .unwrap();
        assert_eq!(
            response,
            json!({ "toolResponse": { "functionResponses": [
                { "id": "call-1", "name": "setAlarm", "response": { "result": "Alarm set." } }
            ]}})
        );
    }

    #[test]
    fn server_content_expands_in_handling_order() {
        let message: ServerMessage = serde_json::from_value(json!({
            "serverContent": {
                "interrupted": true,
                "outputTranscription": { "text": "Hello" },
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AQI=" } }
                ]},
                "turnComplete": true
            }
        }))
        .unwrap();
        let events = message.into_events();
        assert_eq!(
            events,
            vec![
                LiveEvent::Interrupted,
                LiveEvent::OutputTranscript("Hello".into()),
                LiveEvent::Audio {
                    data: "AQI=".into(),
                    mime_type: "audio/pcm;rate=24000".into()
                },
                LiveEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn setup_complete_tool_call_and_go_away() {
        let opened: ServerMessage = serde_json::from_str(r#"{"setupComplete":{}}"#).unwrap();
        assert_eq!(opened.into_events(), vec![LiveEvent::Opened]);

        let call: ServerMessage = serde_json::from_value(json!({
            "toolCall": { "functionCalls": [
                { "id": "c1", "name": "webSearch", "args": { "query": "rust" } }
            ]}
        }))
        .unwrap();
        match call.into_events().as_slice() {
            [LiveEvent::ToolCall(calls)] => {
                assert_eq!(calls[0].id.as_deref(), Some("c1"));
                assert_eq!(calls[0].str_arg("query"), "rust");
            }
            other => panic!("unexpected events: {other:?}"),
        }

        let bye: ServerMessage = serde_json::from_str(r#"{"goAway":{"timeLeft":"5s"}}"#).unwrap();
        assert_eq!(bye.into_events(), vec![LiveEvent::GoAway]);
    }

    #[test]
    fn full_media_queue_drops_chunks_but_keeps_tool_responses() {
        let (queue, mut media_rx, mut control_rx) = OutboundQueue::new(2);
        for _ in 0..5 {
            queue.push(&ClientMessage::media("audio/pcm;rate=16000", "AAA=")).unwrap();
        }
        for id in ["t1", "t2", "t3"] {
            let response = ClientMessage::tool_result(Some(id.into()), "setAlarm", json!("ok"));
            queue.push(&response).unwrap();
        }

        let mut media = 0;
        while media_rx.try_recv().is_ok() {
            media += 1;
        }
        assert_eq!(media, 2);
        let mut control = Vec::new();
        while let Ok(json) = control_rx.try_recv() {
            control.push(json);
        }
        assert_eq!(control.len(), 3);
        assert!(control[0].contains("\"t1\""));
    }

    #[test]
    fn closed_queue_is_a_channel_error() {
        let (queue, media_rx, control_rx) = OutboundQueue::new(2);
        drop(media_rx);
        drop(control_rx);
        let media = queue.push(&ClientMessage::media("image/jpeg", "AA=="));
        assert!(matches!(media, Err(StudioError::Channel(_))));
        let response = queue.push(&ClientMessage::tool_result(None, "webSearch", json!("x")));
        assert!(matches!(response, Err(StudioError::Channel(_))));
    }

    #[test]
    fn endpoint_appends_key() {
        let connector = WebSocketConnector::new("wss://example.test/ws/live", "k 1");
        let url = connector.endpoint().unwrap();
        assert_eq!(url.as_str(), "wss://example.test/ws/live?key=k+1");
    }

    #[test]
    fn invalid_url_is_a_live_error() {
        let connector = WebSocketConnector::new("not a url", "k");
        assert!(matches!(connector.endpoint(), Err(StudioError::Live(_))));
    }
}
