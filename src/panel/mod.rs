//! Chat mode panels.
//!
//! One generic [`ChatPanel`] serves all five chat modes; a
//! [`ModeProfile`](profiles::ModeProfile) supplies what differs between
//! them. Each `send` appends one user message, issues the mode's request(s)
//! and appends the model's reply. Vendor failures never escape `send`:
//! they become the mode's fixed fallback message.
//!
//! Transcript changes are also published as [`PanelEvent`]s so a renderer
//! can follow a streamed reply as it grows.

pub mod profiles;
pub mod video;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::StreamExt;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::alarms::AlarmRegistry;
use crate::composer::ComposedPrompt;
use crate::error::{Result, StudioError};
use crate::gemini::GenerativeBackend;
use crate::transcript::{Message, MessageKind, Transcript};
use profiles::{
    EMPTY_REPLY, ModeProfile, PanelMode, Rendering, SET_ALARM_FUNCTION, VIDEO_PENDING_REPLY,
    extract_image_prompt, image_request, wants_video,
};

/// Command text that hands the conversation to the live voice assistant.
pub const VOICE_COMMAND: &str = "/voice";

/// Capacity of the panel event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of one `send`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelOutcome {
    /// Nothing to send.
    Ignored,
    /// A request is already in flight.
    Busy,
    /// The model replied.
    Replied,
    /// The vendor failed; the fallback message was appended.
    FellBack,
    /// The user asked to continue by voice.
    SwitchToVoice,
}

/// A transcript change.
#[derive(Debug, Clone, PartialEq)]
pub enum PanelEvent {
    /// A message was appended.
    Appended(Message),
    /// A streamed message grew by `fragment`.
    Delta {
        /// Message id.
        id: String,
        /// Newly received text.
        fragment: String,
    },
    /// A generated asset was attached to a message.
    AssetAttached {
        /// Message id.
        id: String,
        /// Asset kind.
        kind: MessageKind,
    },
    /// The in-flight request finished.
    Settled(PanelOutcome),
}

/// Resets the busy flag when the send finishes or is dropped.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// A chat mode: transcript, profile and vendor access.
pub struct ChatPanel {
    profile: ModeProfile,
    identity: String,
    backend: Arc<dyn GenerativeBackend>,
    alarms: AlarmRegistry,
    transcript: Mutex<Transcript>,
    busy: AtomicBool,
    events: broadcast::Sender<PanelEvent>,
}

impl ChatPanel {
    /// Create a panel seeded with the profile's welcome message.
    pub fn new(
        profile: ModeProfile,
        identity: impl Into<String>,
        backend: Arc<dyn GenerativeBackend>,
        alarms: AlarmRegistry,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            transcript: Mutex::new(Transcript::with_welcome(profile.welcome)),
            profile,
            identity: identity.into(),
            backend,
            alarms,
            busy: AtomicBool::new(false),
            events,
        }
    }

    /// The panel's mode.
    pub fn mode(&self) -> PanelMode {
        self.profile.mode
    }

    /// The panel's profile.
    pub fn profile(&self) -> &ModeProfile {
        &self.profile
    }

    /// Whether a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Subscribe to transcript changes.
    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.events.subscribe()
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Transcript {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Transcript> {
        match self.transcript.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit(&self, event: PanelEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn append(&self, message: Message) -> String {
        let id = self.lock().push(message.clone());
        self.emit(PanelEvent::Appended(message));
        id
    }

    fn append_model(&self, content: impl Into<String>) -> String {
        self.append(Message::model(content))
    }

    /// Send a composed prompt.
    pub async fn send(&self, prompt: ComposedPrompt) -> PanelOutcome {
        if prompt.text.trim() == VOICE_COMMAND && prompt.attachments.is_empty() {
            return PanelOutcome::SwitchToVoice;
        }
        if prompt.is_empty() {
            return PanelOutcome::Ignored;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return PanelOutcome::Busy;
        }
        let _guard = BusyGuard(&self.busy);

        if let Some(extension) = &prompt.extension {
            debug!(mode = ?self.profile.mode, extension, "extension tag attached");
        }
        self.append(Message::user(prompt.text.clone()));

        let outcome = match self.dispatch(&prompt).await {
            Ok(()) => PanelOutcome::Replied,
            Err(e) => {
                warn!(mode = ?self.profile.mode, "request failed: {e}");
                PanelOutcome::FellBack
            }
        };
        self.emit(PanelEvent::Settled(outcome));
        outcome
    }

    async fn dispatch(&self, prompt: &ComposedPrompt) -> Result<()> {
        match &self.profile.rendering {
            Rendering::OneShot { cite_sources } => self.one_shot(prompt, *cite_sources).await,
            Rendering::Streamed => self.streamed(prompt).await,
            Rendering::RefineThenImage { image_model } => {
                self.refine_then_image(prompt, image_model).await
            }
        }
    }

    async fn one_shot(&self, prompt: &ComposedPrompt, cite_sources: bool) -> Result<()> {
        let model = self.profile.model_for(prompt);
        let request = self.profile.build_request(&self.identity, prompt);
        let response = match self.backend.generate_content(&model, &request).await {
            Ok(response) => response,
            Err(e) => {
                self.append_model(self.profile.fallback);
                return Err(e);
            }
        };

        let calls = response.function_calls();
        if let Some(spec) = self.profile.alarm_tool {
            for call in calls.iter().filter(|c| c.name == SET_ALARM_FUNCTION) {
                let (time, label) = (call.str_arg("time"), call.str_arg("label"));
                self.alarms.set_alarm(time, label);
                self.append_model(spec.confirm(time, label));
            }
        }

        let mut text = response.text();
        if text.is_empty() {
            if !calls.is_empty() {
                return Ok(());
            }
            EMPTY_REPLY.clone_into(&mut text);
        }
        if cite_sources {
            let sources = response.grounding_uris();
            if !sources.is_empty() {
                text.push_str("\n\nSources:\n");
                let list: Vec<String> = sources.iter().map(|s| format!("- {s}")).collect();
                text.push_str(&list.join("\n"));
            }
        }
        self.append_model(text);
        Ok(())
    }

    async fn streamed(&self, prompt: &ComposedPrompt) -> Result<()> {
        let model = self.profile.model_for(prompt);
        let request = self.profile.build_request(&self.identity, prompt);
        let mut stream = match self.backend.stream_generate_content(&model, &request).await {
            Ok(stream) => stream,
            Err(e) => {
                self.append_model(self.profile.fallback);
                return Err(e);
            }
        };

        let mut placeholder = Message::model("");
        if self.profile.mode == PanelMode::Code {
            placeholder.kind = Some(MessageKind::Code);
        }
        let id = self.append(placeholder);
        let mut received = false;
        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    let note = if received {
                        format!("\n\n{}", self.profile.fallback)
                    } else {
                        self.profile.fallback.to_owned()
                    };
                    self.lock().append_content(&id, &note);
                    self.emit(PanelEvent::Delta { id, fragment: note });
                    return Err(e);
                }
            };
            let fragment = chunk.text();
            if fragment.is_empty() {
                continue;
            }
            received = true;
            self.lock().append_content(&id, &fragment);
            self.emit(PanelEvent::Delta {
                id: id.clone(),
                fragment,
            });
        }
        Ok(())
    }

    async fn refine_then_image(&self, prompt: &ComposedPrompt, image_model: &str) -> Result<()> {
        if wants_video(&prompt.text) {
            self.append_model(VIDEO_PENDING_REPLY);
            return Ok(());
        }

        let request = self.profile.build_request(&self.identity, prompt);
        let refined = match self.backend.generate_content(&self.profile.model, &request).await {
            Ok(response) => response.text(),
            Err(e) => {
                self.append_model(self.profile.fallback);
                return Err(e);
            }
        };
        let id = self.append_model(refined.clone());

        let image_prompt = extract_image_prompt(&refined, &prompt.text);
        info!(model = image_model, "rendering image");
        let image = self
            .backend
            .generate_content(image_model, &image_request(&image_prompt))
            .await
            .and_then(|response| {
                response
                    .first_inline_data()
                    .map(|blob| (blob.mime_type.clone(), blob.data.clone()))
                    .ok_or_else(|| StudioError::Vendor("image response had no image".to_owned()))
            });

        match image {
            Ok((mime_type, data)) => {
                let asset = format!("data:{mime_type};base64,{data}");
                self.lock()
                    .attach_asset(&id, MessageKind::Image, asset, Some(mime_type));
                self.emit(PanelEvent::AssetAttached {
                    id,
                    kind: MessageKind::Image,
                });
                Ok(())
            }
            Err(e) => {
                let note = format!("\n\n{}", self.profile.fallback);
                self.lock().append_content(&id, &note);
                self.emit(PanelEvent::Delta { id, fragment: note });
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use crate::config::ModelConfig;
    use crate::testing::FakeBackend;
    use crate::transcript::Role;
    use serde_json::json;

    fn panel(mode: PanelMode, backend: Arc<FakeBackend>) -> (ChatPanel, AlarmRegistry) {
        let alarms = AlarmRegistry::new();
        let panel = ChatPanel::new(
            ModeProfile::for_mode(mode, &ModelConfig::default()),
            "ID.",
            backend,
            alarms.clone(),
        );
        (panel, alarms)
    }

    #[tokio::test]
    async fn empty_prompt_is_ignored() {
        let backend = Arc::new(FakeBackend::new());
        let (panel, _) = panel(PanelMode::Chat, backend.clone());
        assert_eq!(panel.send(ComposedPrompt::text("  ")).await, PanelOutcome::Ignored);
        assert_eq!(panel.transcript().len(), 1);
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn voice_command_switches_without_request() {
        let backend = Arc::new(FakeBackend::new());
        let (panel, _) = panel(PanelMode::Chat, backend.clone());
        assert_eq!(
            panel.send(ComposedPrompt::text("/voice")).await,
            PanelOutcome::SwitchToVoice
        );
        assert_eq!(backend.request_count(), 0);
    }

    #[tokio::test]
    async fn chat_appends_one_user_and_one_model_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Hi there" }] } }]
        }));
        let (panel, _) = panel(PanelMode::Chat, backend);
        assert_eq!(panel.send(ComposedPrompt::text("hello")).await, PanelOutcome::Replied);

        let transcript = panel.transcript();
        let roles: Vec<Role> = transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::Model, Role::User, Role::Model]);
        assert_eq!(transcript.last().unwrap().content, "Hi there");
    }

    #[tokio::test]
    async fn analyzed_alarm_call_sets_alarm_and_confirms() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(json!({
            "candidates": [{ "content": { "parts": [
                { "functionCall": { "name": "setAlarm", "args": { "time": "5 PM", "label": "call mom" } } }
            ]}}]
        }));
        let (panel, alarms) = panel(PanelMode::Analyzed, backend);
        panel
            .send(ComposedPrompt::text("Analyze this and remind me"))
            .await;

        let list = alarms.list();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].time, "5 PM");
        assert_eq!(list[0].label, "call mom");
        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        let confirmation = &transcript.last().unwrap().content;
        assert!(confirmation.contains("5 PM") && confirmation.contains("call mom"));
    }

    #[tokio::test]
    async fn analyzed_empty_reply_and_sources() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(json!({ "candidates": [] }));
        backend.push_response(json!({
            "candidates": [{
                "content": { "parts": [{ "text": "Answer" }] },
                "groundingMetadata": { "groundingChunks": [
                    { "web": { "uri": "https://a.example" } },
                    { "web": { "uri": "https://a.example" } },
                    { "web": { "uri": "https://b.example" } }
                ]}
            }]
        }));
        let (panel, _) = panel(PanelMode::Analyzed, backend);
        panel.send(ComposedPrompt::text("first")).await;
        assert_eq!(panel.transcript().last().unwrap().content, EMPTY_REPLY);
        panel.send(ComposedPrompt::text("second")).await;
        assert_eq!(
            panel.transcript().last().unwrap().content,
            "Answer\n\nSources:\n- https://a.example\n- https://b.example"
        );
    }

    #[tokio::test]
    async fn vendor_failure_appends_mode_fallback() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_error("boom");
        let (panel, _) = panel(PanelMode::Analyzed, backend);
        assert_eq!(
            panel.send(ComposedPrompt::text("x")).await,
            PanelOutcome::FellBack
        );
        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(
            transcript.last().unwrap().content,
            "Neural link failed. Chrome connection unstable."
        );
    }

    #[tokio::test]
    async fn code_stream_fills_one_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_stream(vec![
            json!({ "candidates": [{ "content": { "parts": [{ "text": "```rust\n" }] } }] }),
            json!({ "candidates": [{ "content": { "parts": [{ "text": "fn main() {}\n```" }] } }] }),
        ]);
        let (panel, _) = panel(PanelMode::Code, backend);
        let mut events = panel.subscribe();
        assert_eq!(
            panel.send(ComposedPrompt::text("hello world")).await,
            PanelOutcome::Replied
        );
        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        let reply = transcript.last().unwrap();
        assert_eq!(reply.content, "```rust\nfn main() {}\n```");
        assert_eq!(reply.kind, Some(MessageKind::Code));

        let mut deltas = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, PanelEvent::Delta { .. }) {
                deltas += 1;
            }
        }
        assert_eq!(deltas, 2);
    }

    #[tokio::test]
    async fn stream_open_failure_appends_fallback_once() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_error("offline");
        let (panel, _) = panel(PanelMode::Vision, backend);
        panel.send(ComposedPrompt::text("what is this")).await;
        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        assert_eq!(transcript.last().unwrap().content, "Visual analysis failed.");
    }

    #[tokio::test]
    async fn creative_video_request_is_not_sent() {
        let backend = Arc::new(FakeBackend::new());
        let (panel, _) = panel(PanelMode::Creative, backend.clone());
        panel.send(ComposedPrompt::text("make a video of a cat")).await;
        assert_eq!(backend.request_count(), 0);
        assert_eq!(panel.transcript().last().unwrap().content, VIDEO_PENDING_REPLY);
    }

    #[tokio::test]
    async fn creative_refines_then_attaches_image() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Foggy forest.\nPrompt: fox in fog" }] } }]
        }));
        backend.push_response(json!({
            "candidates": [{ "content": { "parts": [
                { "inlineData": { "mimeType": "image/png", "data": "iVBOR" } }
            ]}}]
        }));
        let (panel, _) = panel(PanelMode::Creative, backend.clone());
        assert_eq!(panel.send(ComposedPrompt::text("a fox")).await, PanelOutcome::Replied);

        let requests = backend.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].0, "gemini-2.5-flash-image");
        assert_eq!(
            requests[1].1.contents[0].parts[0].text.as_deref(),
            Some("fox in fog")
        );

        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        let reply = transcript.last().unwrap();
        assert_eq!(reply.kind, Some(MessageKind::Image));
        assert_eq!(reply.asset.as_deref(), Some("data:image/png;base64,iVBOR"));
    }

    #[tokio::test]
    async fn second_send_while_in_flight_is_busy() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_pending();
        let (panel, _) = panel(PanelMode::Chat, backend.clone());
        let panel = Arc::new(panel);

        let first = tokio::spawn({
            let panel = Arc::clone(&panel);
            async move { panel.send(ComposedPrompt::text("first")).await }
        });
        while backend.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        assert!(panel.is_busy());

        assert_eq!(
            panel.send(ComposedPrompt::text("second")).await,
            PanelOutcome::Busy
        );
        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last().unwrap().content, "first");
        assert_eq!(backend.request_count(), 1);

        first.abort();
        assert!(first.await.unwrap_err().is_cancelled());
        assert!(!panel.is_busy());
    }

    #[tokio::test]
    async fn stream_failure_after_text_extends_the_same_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_broken_stream(
            vec![json!({ "candidates": [{ "content": { "parts": [{ "text": "partial" }] } }] })],
            "connection reset",
        );
        let (panel, _) = panel(PanelMode::Code, backend);
        assert_eq!(
            panel.send(ComposedPrompt::text("write a parser")).await,
            PanelOutcome::FellBack
        );

        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        let reply = transcript.last().unwrap();
        assert_eq!(reply.role, Role::Model);
        assert_eq!(reply.content, "partial\n\nCompile error.");
    }

    #[tokio::test]
    async fn creative_image_failure_keeps_the_refinement_message() {
        let backend = Arc::new(FakeBackend::new());
        backend.push_response(json!({
            "candidates": [{ "content": { "parts": [{ "text": "Foggy forest.\nPrompt: fox in fog" }] } }]
        }));
        backend.push_error("image quota");
        let (panel, _) = panel(PanelMode::Creative, backend.clone());
        assert_eq!(panel.send(ComposedPrompt::text("a fox")).await, PanelOutcome::FellBack);
        assert_eq!(backend.request_count(), 2);

        let transcript = panel.transcript();
        assert_eq!(transcript.len(), 3);
        let reply = transcript.last().unwrap();
        assert_eq!(
            reply.content,
            "Foggy forest.\nPrompt: fox in fog\n\nCreative engine failed."
        );
        assert_eq!(reply.asset, None);
    }
}
