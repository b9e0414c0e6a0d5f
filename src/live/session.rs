//! The live session state machine.
//!
//! [`LiveSession`] owns the devices, the link and every forwarder task of
//! one realtime session. All inbound traffic arrives as [`LiveEvent`]s and
//! goes through [`LiveSession::handle_event`]; [`LiveSession::run`] drives
//! that handler together with the visualization ticker until the session
//! stops.

use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::audio::resample;
use super::camera::{FRAME_MIME_TYPE, FrameSource};
use super::devices::{AudioChunk, MediaDevices, MediaTrack};
use super::instructions::{InstructionParts, system_instruction};
use super::playback::{AudioOutput, PlaybackScheduler, decode_pcm16, encode_pcm16, mime_rate, rms};
use super::state::{CaptionBoard, LiveVariant, SessionState, Speaker};
use super::tools::{LiveTool, ToolContext, ToolEffect, live_tools, run_tool};
use super::visualizer::{LevelMeter, LiveSnapshot};
use crate::alarms::AlarmRegistry;
use crate::config::{LiveConfig, LiveLanguage, ModelConfig, StudioConfig};
use crate::error::{Result, StudioError};
use crate::gemini::live::Enabled;
use crate::gemini::types::{FunctionCall, SpeechConfig};
use crate::gemini::{
    ClientMessage, Content, GenerationConfig, GenerativeBackend, LiveConnector, LiveEvent, LiveLink,
    LiveSetup,
};
use crate::vault::NeuralVault;

/// Collaborators of a live session.
#[derive(Clone)]
pub struct LiveServices {
    /// Opens the realtime link.
    pub connector: Arc<dyn LiveConnector>,
    /// Opens microphone, speaker and camera.
    pub devices: Arc<dyn MediaDevices>,
    /// Secondary requests of the `webSearch` and `showImage` tools.
    pub backend: Arc<dyn GenerativeBackend>,
    /// Shared alarm store.
    pub alarms: AlarmRegistry,
    /// Observation store.
    pub vault: NeuralVault,
}

/// Tunables of a live session.
#[derive(Debug, Clone)]
pub struct LiveSettings {
    /// Identity core of the system instruction.
    pub identity: String,
    /// Live and secondary models.
    pub models: ModelConfig,
    /// Voice, language, story mode, frame cadence.
    pub live: LiveConfig,
    /// Microphone rate declared on audio chunks.
    pub input_sample_rate: u32,
    /// How long the syncing indicator stays lit after a vault write.
    pub sync_indicator: Duration,
}

impl LiveSettings {
    /// Settings from the studio configuration.
    pub fn from_config(config: &StudioConfig) -> Self {
        Self {
            identity: config.persona.identity.clone(),
            models: config.models.clone(),
            live: config.live.clone(),
            input_sample_rate: config.audio.input_sample_rate,
            sync_indicator: Duration::from_millis(config.vault.sync_indicator_ms),
        }
    }
}

/// Releases opened devices unless disarmed.
struct DeviceGuard {
    tracks: Vec<MediaTrack>,
    output: Option<Arc<dyn AudioOutput>>,
}

impl DeviceGuard {
    fn disarm(mut self) {
        self.tracks.clear();
        self.output = None;
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        for track in &self.tracks {
            track.stop();
        }
        if let Some(output) = self.output.take() {
            output.stop_all();
            output.close();
        }
    }
}

/// Resources of a session between `start` and `stop`.
struct Running {
    link: Arc<dyn LiveLink>,
    events: mpsc::Receiver<LiveEvent>,
    mic_track: MediaTrack,
    mic_chunks: Option<mpsc::Receiver<AudioChunk>>,
    camera_track: Option<MediaTrack>,
    camera_source: Option<Box<dyn FrameSource>>,
    output: Arc<dyn AudioOutput>,
    cancel: CancellationToken,
    input_level: LevelMeter,
}

impl Running {
    fn release(&self) {
        self.cancel.cancel();
        self.link.close();
        self.mic_track.stop();
        if let Some(track) = &self.camera_track {
            track.stop();
        }
        self.output.stop_all();
        self.output.close();
    }
}

/// One live voice (and video) session.
pub struct LiveSession {
    variant: LiveVariant,
    settings: LiveSettings,
    services: LiveServices,
    state: SessionState,
    status: String,
    last_error: Option<String>,
    captions: CaptionBoard,
    scheduler: PlaybackScheduler,
    speaking: bool,
    syncing_until: Option<Instant>,
    image: Option<String>,
    running: Option<Running>,
    snapshots: watch::Sender<LiveSnapshot>,
}

impl LiveSession {
    /// A session in standby.
    pub fn new(variant: LiveVariant, settings: LiveSettings, services: LiveServices) -> Self {
        let captions = CaptionBoard::new(settings.live.caption_history);
        let status = variant.standby_label().to_owned();
        let (snapshots, _) = watch::channel(LiveSnapshot {
            status: status.clone(),
            ..LiveSnapshot::default()
        });
        Self {
            variant,
            settings,
            services,
            state: SessionState::Standby,
            status,
            last_error: None,
            captions,
            scheduler: PlaybackScheduler::new(),
            speaking: false,
            syncing_until: None,
            image: None,
            running: None,
            snapshots,
        }
    }

    // ── Accessors ─────────────────────────────────────────────

    /// Which surface this session drives.
    pub fn variant(&self) -> LiveVariant {
        self.variant
    }

    /// Lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Current status label.
    pub fn status(&self) -> &str {
        &self.status
    }

    /// Failure label of the last session that ended in error.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Whether model audio is in flight.
    pub fn is_speaking(&self) -> bool {
        self.speaking
    }

    /// Whether a vault write happened within the indicator window.
    pub fn is_syncing(&self) -> bool {
        self.syncing_until.is_some_and(|until| Instant::now() < until)
    }

    /// Image on display, as a data URL.
    pub fn displayed_image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    /// Captions.
    pub fn captions(&self) -> &CaptionBoard {
        &self.captions
    }

    /// Start time of the next inbound audio chunk.
    pub fn next_start_time(&self) -> f64 {
        self.scheduler.next_start_time()
    }

    /// Spoken language of the next session.
    pub fn language(&self) -> LiveLanguage {
        self.settings.live.language
    }

    /// Whether story mode is on.
    pub fn story_mode(&self) -> bool {
        self.settings.live.story_mode
    }

    fn cancel_token(&self) -> Option<CancellationToken> {
        self.running.as_ref().map(|r| r.cancel.clone())
    }

    /// Watch the session's snapshots.
    pub fn subscribe(&self) -> watch::Receiver<LiveSnapshot> {
        self.snapshots.subscribe()
    }

    /// The current snapshot.
    pub fn snapshot(&self) -> LiveSnapshot {
        LiveSnapshot {
            state: self.state,
            status: self.status.clone(),
            last_error: self.last_error.clone(),
            caption: self.captions.current().cloned(),
            history: self.captions.history().cloned().collect(),
            speaking: self.speaking,
            syncing: self.is_syncing(),
            input_level: self.running.as_ref().map_or(0.0, |r| r.input_level.get()),
            output_level: self.running.as_ref().map_or(0.0, |r| r.output.level()),
            image: self.image.clone(),
        }
    }

    // ── Settings ──────────────────────────────────────────────

    /// Change the spoken language. Rejected (returns `false`) unless in standby.
    pub fn set_language(&mut self, language: LiveLanguage) -> bool {
        if self.state != SessionState::Standby {
            return false;
        }
        self.settings.live.language = language;
        true
    }

    /// Switch story mode. A running session is stopped first.
    pub fn set_story_mode(&mut self, enabled: bool) {
        if self.running.is_some() {
            self.stop();
        }
        self.settings.live.story_mode = enabled;
    }

    // ── Lifecycle ─────────────────────────────────────────────

    /// Open devices and the link. A no-op unless in standby.
    ///
    /// On failure every opened device is released, the state returns to
    /// standby and the start-failure label is kept as [`last_error`](Self::last_error).
    ///
    /// # Errors
    ///
    /// Returns the device or connect error.
    pub async fn start(&mut self) -> Result<()> {
        self.start_linked(&CancellationToken::new()).await
    }

    /// [`start`](Self::start) with the session token derived from `parent`,
    /// so cancelling `parent` also cancels in-flight tools and forwarders.
    ///
    /// # Errors
    ///
    /// Returns the device or connect error.
    pub async fn start_linked(&mut self, parent: &CancellationToken) -> Result<()> {
        if self.state != SessionState::Standby {
            debug!(variant = self.variant.name(), "start ignored: session not in standby");
            return Ok(());
        }
        self.last_error = None;
        self.set_state(SessionState::Connecting);
        self.publish();

        match self.open(parent.child_token()).await {
            Ok(running) => {
                self.running = Some(running);
                info!(variant = self.variant.name(), "live session connecting");
                self.publish();
                Ok(())
            }
            Err(e) => {
                warn!(variant = self.variant.name(), "live session failed to start: {e}");
                self.fail(self.variant.start_failure_label());
                Err(e)
            }
        }
    }

    async fn open(&self, cancel: CancellationToken) -> Result<Running> {
        let devices = &self.services.devices;
        let microphone = devices.open_microphone()?;
        let mut guard = DeviceGuard {
            tracks: vec![microphone.track.clone()],
            output: None,
        };
        let camera = if self.variant.uses_camera() {
            let camera = devices.open_camera()?;
            guard.tracks.push(camera.track.clone());
            Some(camera)
        } else {
            None
        };
        let output = devices.open_speaker()?;
        guard.output = Some(Arc::clone(&output));

        let (link, events) = self.services.connector.connect(self.setup()).await?;
        guard.disarm();

        let (camera_track, camera_source) = match camera {
            Some(camera) => (Some(camera.track), Some(camera.source)),
            None => (None, None),
        };
        Ok(Running {
            link,
            events,
            mic_track: microphone.track,
            mic_chunks: Some(microphone.chunks),
            camera_track,
            camera_source,
            output,
            cancel,
            input_level: LevelMeter::new(),
        })
    }

    /// The setup message for the next connection.
    pub fn setup(&self) -> LiveSetup {
        let summary = match self.services.vault.summary() {
            Ok(summary) => summary,
            Err(e) => {
                warn!("vault unreadable, starting without history: {e}");
                None
            }
        };
        let live = &self.settings.live;
        let instruction = system_instruction(
            self.variant,
            InstructionParts {
                identity: &self.settings.identity,
                vault_summary: summary.as_deref(),
                language: live.language,
                story_mode: live.story_mode,
            },
        );
        let model = &self.settings.models.live;
        LiveSetup {
            model: if model.starts_with("models/") {
                model.clone()
            } else {
                format!("models/{model}")
            },
            generation_config: GenerationConfig {
                temperature: Some(live.temperature),
                response_modalities: Some(vec!["AUDIO".to_owned()]),
                speech_config: Some(SpeechConfig::prebuilt(&live.voice_name)),
                ..GenerationConfig::default()
            },
            system_instruction: Content::system(instruction),
            tools: live_tools(),
            input_audio_transcription: Some(Enabled {}),
            output_audio_transcription: Some(Enabled {}),
        }
    }

    /// Tear everything down. Returns `false` when nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(running) = self.running.take() else {
            return false;
        };
        running.release();
        self.reset();
        info!(variant = self.variant.name(), "live session stopped");
        true
    }

    fn reset(&mut self) {
        self.scheduler.reset();
        self.captions.clear();
        self.image = None;
        self.syncing_until = None;
        self.speaking = false;
        self.set_state(SessionState::Standby);
        self.publish();
    }

    fn fail(&mut self, label: &str) {
        if !self.stop() {
            self.reset();
        }
        self.last_error = Some(label.to_owned());
        self.publish();
    }

    fn set_state(&mut self, state: SessionState) {
        self.state = state;
        self.status = state.label(self.variant).to_owned();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }

    /// Wait for the next event of the running session.
    ///
    /// Returns `None` when nothing is running or the link's channel closed.
    pub async fn next_event(&mut self) -> Option<LiveEvent> {
        self.running.as_mut()?.events.recv().await
    }

    /// Start, then drive events and the ticker until the session stops or
    /// `stop` is cancelled.
    ///
    /// # Errors
    ///
    /// Returns the start error; runtime failures end the loop normally and
    /// are reported through [`last_error`](Self::last_error).
    pub async fn run(&mut self, stop: CancellationToken) -> Result<()> {
        self.start_linked(&stop).await?;
        let Some(cancel) = self.cancel_token() else {
            return Ok(());
        };
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.settings.live.visual_tick_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while self.running.is_some() {
            tokio::select! {
                () = cancel.cancelled() => {
                    self.stop();
                }
                event = self.next_event() => {
                    let event = event.unwrap_or(LiveEvent::Closed(None));
                    self.handle_event(event).await;
                }
                _ = ticker.tick() => self.tick(),
            }
        }
        Ok(())
    }

    /// Refresh derived flags and publish a snapshot.
    pub fn tick(&mut self) {
        if let Some(running) = &self.running {
            self.speaking = running.output.active_sources() > 0;
        }
        if let Some(until) = self.syncing_until
            && Instant::now() >= until
        {
            self.syncing_until = None;
        }
        self.publish();
    }

    // ── Events ────────────────────────────────────────────────

    /// Apply one inbound event. Events arriving after `stop` are ignored.
    pub async fn handle_event(&mut self, event: LiveEvent) {
        if self.running.is_none() {
            debug!(?event, "event ignored: session stopped");
            return;
        }
        match event {
            LiveEvent::Opened => self.on_opened(),
            LiveEvent::Audio { data, mime_type } => self.on_audio(&data, &mime_type),
            LiveEvent::InputTranscript(text) => self.captions.push(Speaker::User, &text),
            LiveEvent::OutputTranscript(text) => self.captions.push(Speaker::Model, &text),
            LiveEvent::TurnComplete => self.captions.flush(),
            LiveEvent::Interrupted => self.on_interrupted(),
            LiveEvent::ToolCall(calls) => self.on_tool_calls(calls).await,
            LiveEvent::GoAway => warn!("live server announced disconnect"),
            LiveEvent::Error(message) => {
                warn!(variant = self.variant.name(), "live link error: {message}");
                self.fail(self.variant.runtime_failure_label());
            }
            LiveEvent::Closed(reason) => {
                info!(reason = reason.as_deref().unwrap_or(""), "live link closed");
                self.stop();
            }
        }
        self.publish();
    }

    fn on_opened(&mut self) {
        if self.state != SessionState::Connecting {
            return;
        }
        self.set_state(SessionState::Active);
        info!(variant = self.variant.name(), "live session active");

        let frame_interval = Duration::from_millis(self.settings.live.frame_interval_ms.max(1));
        let Some(running) = self.running.as_mut() else {
            return;
        };
        if let Some(chunks) = running.mic_chunks.take() {
            tokio::spawn(forward_microphone(
                chunks,
                Arc::clone(&running.link),
                running.input_level.clone(),
                running.cancel.clone(),
            ));
        }
        if let Some(source) = running.camera_source.take() {
            tokio::spawn(forward_frames(
                source,
                frame_interval,
                Arc::clone(&running.link),
                running.cancel.clone(),
            ));
        }
    }

    fn on_audio(&mut self, data: &str, mime_type: &str) {
        let Some(running) = &self.running else {
            return;
        };
        let samples = match decode_pcm16(data) {
            Ok(samples) if !samples.is_empty() => samples,
            Ok(_) => return,
            Err(e) => {
                warn!("dropping audio chunk: {e}");
                return;
            }
        };
        let rate = running.output.sample_rate();
        let samples = match mime_rate(mime_type) {
            Some(source_rate) if source_rate != rate => resample(&samples, source_rate, rate),
            _ => samples,
        };
        let start = self.scheduler.schedule(running.output.as_ref(), samples);
        self.speaking = true;
        debug!(start, next = self.scheduler.next_start_time(), "scheduled model audio");
    }

    fn on_interrupted(&mut self) {
        if let Some(running) = &self.running {
            running.output.stop_all();
        }
        self.scheduler.reset();
        self.captions.drop_current();
        self.speaking = false;
        debug!("model interrupted");
    }

    async fn on_tool_calls(&mut self, calls: Vec<FunctionCall>) {
        for call in calls {
            let Some(tool) = LiveTool::from_name(&call.name) else {
                debug!(name = %call.name, "ignoring unknown tool call");
                continue;
            };
            let Some(running) = &self.running else {
                return;
            };
            let cancel = running.cancel.clone();
            let link = Arc::clone(&running.link);

            let ctx = ToolContext {
                variant: self.variant,
                vault: &self.services.vault,
                alarms: &self.services.alarms,
                backend: self.services.backend.as_ref(),
                models: &self.settings.models,
                cancel: &cancel,
            };
            let outcome = match run_tool(tool, &call, &ctx).await {
                Ok(outcome) => outcome,
                Err(StudioError::Cancelled) => {
                    debug!(tool = tool.name(), "tool result dropped: session stopped");
                    return;
                }
                Err(e) => {
                    warn!(tool = tool.name(), "tool failed: {e}");
                    continue;
                }
            };
            if cancel.is_cancelled() {
                debug!(tool = tool.name(), "tool result dropped: session stopped");
                return;
            }

            self.apply_effect(outcome.effect);
            let response = ClientMessage::tool_result(
                call.id.clone(),
                call.name.clone(),
                serde_json::Value::String(outcome.result),
            );
            if let Err(e) = link.send(response) {
                warn!(tool = tool.name(), "tool response not sent: {e}");
            }
        }
    }

    fn apply_effect(&mut self, effect: ToolEffect) {
        match effect {
            ToolEffect::Archived(entry) => {
                info!(chars = entry.data.len(), "observation archived");
                self.syncing_until = Some(Instant::now() + self.settings.sync_indicator);
            }
            ToolEffect::Image(url) => {
                self.image = Some(url);
            }
            ToolEffect::AlarmSet(_) | ToolEffect::None => {}
        }
    }
}

impl Drop for LiveSession {
    fn drop(&mut self) {
        if let Some(running) = self.running.take() {
            running.release();
        }
    }
}

// ── Forwarders ────────────────────────────────────────────────

async fn forward_microphone(
    mut chunks: mpsc::Receiver<AudioChunk>,
    link: Arc<dyn LiveLink>,
    level: LevelMeter,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            chunk = chunks.recv() => {
                let Some(chunk) = chunk else { break };
                level.set(rms(&chunk.samples));
                let message = ClientMessage::media(
                    format!("audio/pcm;rate={}", chunk.sample_rate),
                    encode_pcm16(&chunk.samples),
                );
                if let Err(e) = link.send(message) {
                    debug!("microphone chunk not sent: {e}");
                }
            }
        }
    }
    debug!("microphone forwarder stopped");
}

async fn forward_frames(
    mut source: Box<dyn FrameSource>,
    interval: Duration,
    link: Arc<dyn LiveLink>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => match source.capture_jpeg() {
                Ok(jpeg) => {
                    let frame = ClientMessage::media(FRAME_MIME_TYPE, BASE64.encode(jpeg));
                    if let Err(e) = link.send(frame) {
                        debug!("frame not sent: {e}");
                    }
                }
                Err(e) => debug!("frame skipped: {e}"),
            },
        }
    }
    debug!("frame forwarder stopped");
}
