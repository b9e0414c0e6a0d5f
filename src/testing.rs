//! Scripted fakes for the crate's seams, shared by unit and integration tests.
//!
//! Every fake is a cheap-to-clone handle over shared state, so a test can
//! keep one clone for assertions while the code under test owns another.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::{Result, StudioError};
use crate::gemini::types::FunctionResponse;
use crate::gemini::{
    ClientMessage, GenerateContentRequest, GenerateContentResponse, GenerativeBackend,
    LiveConnector, LiveEvent, LiveLink, LiveSetup, ResponseStream,
};
use crate::live::camera::FrameSource;
use crate::live::devices::{AudioChunk, CameraStream, MediaDevices, MediaTrack, MicrophoneStream};
use crate::live::playback::AudioOutput;

/// How long the `wait_for_*` helpers poll before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ── Generative backend ────────────────────────────────────────

enum Scripted {
    Response(Value),
    Stream(Vec<Value>),
    BrokenStream(Vec<Value>, String),
    Pending,
    Error(String),
}

#[derive(Default)]
struct BackendState {
    script: VecDeque<Scripted>,
    requests: Vec<(String, GenerateContentRequest)>,
}

/// Replays scripted responses in order and records every request.
#[derive(Clone, Default)]
pub struct FakeBackend {
    state: Arc<Mutex<BackendState>>,
}

impl FakeBackend {
    /// Backend with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a one-shot response body.
    pub fn push_response(&self, body: Value) {
        lock(&self.state).script.push_back(Scripted::Response(body));
    }

    /// Queue a streamed response, one body per chunk.
    pub fn push_stream(&self, chunks: Vec<Value>) {
        lock(&self.state).script.push_back(Scripted::Stream(chunks));
    }

    /// Queue a stream that yields `chunks`, then fails with `message`.
    pub fn push_broken_stream(&self, chunks: Vec<Value>, message: &str) {
        lock(&self.state)
            .script
            .push_back(Scripted::BrokenStream(chunks, message.to_owned()));
    }

    /// Queue a request that never answers.
    pub fn push_pending(&self) {
        lock(&self.state).script.push_back(Scripted::Pending);
    }

    /// Queue a vendor failure.
    pub fn push_error(&self, message: &str) {
        lock(&self.state)
            .script
            .push_back(Scripted::Error(message.to_owned()));
    }

    /// Number of requests received.
    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    /// Received `(model, request)` pairs, in order.
    pub fn requests(&self) -> Vec<(String, GenerateContentRequest)> {
        lock(&self.state).requests.clone()
    }

    fn next(&self, model: &str, request: &GenerateContentRequest) -> Result<Scripted> {
        let mut state = lock(&self.state);
        state.requests.push((model.to_owned(), request.clone()));
        match state.script.pop_front() {
            Some(Scripted::Error(message)) => Err(StudioError::Vendor(message)),
            Some(item) => Ok(item),
            None => Err(StudioError::Vendor("no scripted response".to_owned())),
        }
    }
}

#[async_trait]
impl GenerativeBackend for FakeBackend {
    async fn generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<GenerateContentResponse> {
        match self.next(model, request)? {
            Scripted::Response(body) => Ok(serde_json::from_value(body)?),
            Scripted::Pending => std::future::pending().await,
            _ => Err(StudioError::Vendor("scripted item is not a response".to_owned())),
        }
    }

    async fn stream_generate_content(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<ResponseStream> {
        match self.next(model, request)? {
            Scripted::Stream(chunks) => {
                let items: Vec<Result<GenerateContentResponse>> = chunks
                    .into_iter()
                    .map(|c| serde_json::from_value(c).map_err(StudioError::from))
                    .collect();
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            Scripted::BrokenStream(chunks, message) => {
                let mut items: Vec<Result<GenerateContentResponse>> = chunks
                    .into_iter()
                    .map(|c| serde_json::from_value(c).map_err(StudioError::from))
                    .collect();
                items.push(Err(StudioError::Vendor(message)));
                Ok(Box::pin(futures_util::stream::iter(items)))
            }
            Scripted::Pending => std::future::pending().await,
            _ => Err(StudioError::Vendor("scripted item is not a stream".to_owned())),
        }
    }
}

// ── Live link ─────────────────────────────────────────────────

#[derive(Default)]
struct LinkState {
    sent: Vec<ClientMessage>,
    closed: bool,
}

/// Records everything a session sends.
#[derive(Clone, Default)]
pub struct FakeLink {
    state: Arc<Mutex<LinkState>>,
}

impl FakeLink {
    /// Every message sent, in order.
    pub fn sent(&self) -> Vec<ClientMessage> {
        lock(&self.state).sent.clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    /// `(id, name, response)` of every tool response sent.
    pub fn tool_responses(&self) -> Vec<(String, String, Value)> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::ToolResponse(response) => Some(response.function_responses),
                _ => None,
            })
            .flatten()
            .map(|FunctionResponse { id, name, response }| (id.unwrap_or_default(), name, response))
            .collect()
    }

    /// `(mime_type, data)` of every media chunk sent.
    pub fn media(&self) -> Vec<(String, String)> {
        self.sent()
            .into_iter()
            .filter_map(|message| match message {
                ClientMessage::RealtimeInput(input) => Some(input.media_chunks),
                _ => None,
            })
            .flatten()
            .map(|blob| (blob.mime_type, blob.data))
            .collect()
    }

    /// Poll until at least `count` media chunks were sent (or the wait limit passes).
    pub async fn wait_for_media(&self, count: usize) -> Vec<(String, String)> {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let media = self.media();
            if media.len() >= count || tokio::time::Instant::now() >= deadline {
                return media;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl LiveLink for FakeLink {
    fn send(&self, message: ClientMessage) -> Result<()> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(StudioError::Channel("live link closed".to_owned()));
        }
        state.sent.push(message);
        Ok(())
    }

    fn close(&self) {
        lock(&self.state).closed = true;
    }
}

#[derive(Default)]
struct ConnectorState {
    setups: Vec<LiveSetup>,
    fail_next: Option<String>,
    link: FakeLink,
    events: Option<mpsc::Sender<LiveEvent>>,
}

/// Hands out [`FakeLink`]s and lets tests inject server events.
#[derive(Clone, Default)]
pub struct FakeConnector {
    state: Arc<Mutex<ConnectorState>>,
}

impl FakeConnector {
    /// Connector that accepts every connection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `connect` fail with `message`.
    pub fn fail_next(&self, message: &str) {
        lock(&self.state).fail_next = Some(message.to_owned());
    }

    /// Number of successful connections.
    pub fn connect_count(&self) -> usize {
        lock(&self.state).setups.len()
    }

    /// Setup of the latest connection.
    pub fn last_setup(&self) -> Option<LiveSetup> {
        lock(&self.state).setups.last().cloned()
    }

    /// Link of the latest connection.
    pub fn link(&self) -> FakeLink {
        lock(&self.state).link.clone()
    }

    /// Injector for server events of the current (or next) connection.
    pub fn events(&self) -> FakeEvents {
        FakeEvents {
            connector: self.clone(),
        }
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(
        &self,
        setup: LiveSetup,
    ) -> Result<(Arc<dyn LiveLink>, mpsc::Receiver<LiveEvent>)> {
        let mut state = lock(&self.state);
        if let Some(message) = state.fail_next.take() {
            return Err(StudioError::Live(message));
        }
        let (tx, rx) = mpsc::channel(256);
        let link = FakeLink::default();
        state.setups.push(setup);
        state.link = link.clone();
        state.events = Some(tx);
        Ok((Arc::new(link), rx))
    }
}

/// Sends server events into a [`FakeConnector`]'s current connection.
#[derive(Clone)]
pub struct FakeEvents {
    connector: FakeConnector,
}

impl FakeEvents {
    /// Deliver `event`, waiting for a connection to exist first.
    ///
    /// Returns `false` if no connection appeared or its receiver is gone.
    pub async fn send(&self, event: LiveEvent) -> bool {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            let sender = lock(&self.connector.state).events.clone();
            if let Some(sender) = sender {
                return sender.send(event).await.is_ok();
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    }
}

// ── Audio output ──────────────────────────────────────────────

#[derive(Default)]
struct OutputState {
    time: f64,
    scheduled: Vec<(f64, f64)>,
    starts: Vec<f64>,
    level: f32,
    closes: usize,
}

/// An output whose clock only moves when the test says so.
#[derive(Clone)]
pub struct FakeOutput {
    state: Arc<Mutex<OutputState>>,
    sample_rate: u32,
}

impl FakeOutput {
    /// Output at `sample_rate` with its clock at zero.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: Arc::default(),
            sample_rate,
        }
    }

    /// Move the clock.
    pub fn set_time(&self, time: f64) {
        lock(&self.state).time = time;
    }

    /// Set the reported level.
    pub fn set_level(&self, level: f32) {
        lock(&self.state).level = level;
    }

    /// Start time of every schedule call, in order.
    pub fn scheduled_starts(&self) -> Vec<f64> {
        lock(&self.state).starts.clone()
    }

    /// Whether `close` was called.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closes > 0
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        lock(&self.state).closes
    }
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        lock(&self.state).time
    }

    fn schedule(&self, samples: Vec<f32>, start_at: f64) {
        let duration = samples.len() as f64 / f64::from(self.sample_rate.max(1));
        let mut state = lock(&self.state);
        state.starts.push(start_at);
        state.scheduled.push((start_at, start_at + duration));
    }

    fn stop_all(&self) {
        lock(&self.state).scheduled.clear();
    }

    fn active_sources(&self) -> usize {
        let state = lock(&self.state);
        state.scheduled.iter().filter(|(_, end)| *end > state.time).count()
    }

    fn level(&self) -> f32 {
        lock(&self.state).level
    }

    fn close(&self) {
        lock(&self.state).closes += 1;
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

// ── Devices ───────────────────────────────────────────────────

/// Returns a fixed JPEG and counts captures.
#[derive(Clone, Default)]
pub struct FakeFrames {
    captures: Arc<AtomicUsize>,
}

impl FrameSource for FakeFrames {
    fn capture_jpeg(&mut self) -> Result<Vec<u8>> {
        self.captures.fetch_add(1, Ordering::SeqCst);
        Ok(vec![0xff, 0xd8, 0xff, 0xd9])
    }
}

#[derive(Default)]
struct DeviceState {
    fail_microphone: bool,
    fail_camera: bool,
    tracks: Vec<MediaTrack>,
    microphone: Option<mpsc::Sender<AudioChunk>>,
}

/// In-memory microphone, speaker and camera.
#[derive(Clone)]
pub struct FakeDevices {
    state: Arc<Mutex<DeviceState>>,
    output: FakeOutput,
    frames: FakeFrames,
}

impl Default for FakeDevices {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            output: FakeOutput::new(24_000),
            frames: FakeFrames::default(),
        }
    }
}

impl FakeDevices {
    /// Devices that open successfully.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the microphone refuse to open.
    pub fn fail_microphone(&self) {
        lock(&self.state).fail_microphone = true;
    }

    /// Make the camera refuse to open.
    pub fn fail_camera(&self) {
        lock(&self.state).fail_camera = true;
    }

    /// The shared speaker.
    pub fn output(&self) -> FakeOutput {
        self.output.clone()
    }

    /// Whether every opened track was stopped.
    pub fn all_tracks_stopped(&self) -> bool {
        lock(&self.state).tracks.iter().all(MediaTrack::is_stopped)
    }

    /// Number of tracks opened so far.
    pub fn tracks_opened(&self) -> usize {
        lock(&self.state).tracks.len()
    }

    /// Frames captured so far.
    pub fn frames_captured(&self) -> usize {
        self.frames.captures.load(Ordering::SeqCst)
    }

    /// Feed a chunk into the open microphone. Returns `false` if none is open.
    pub async fn push_microphone(&self, chunk: AudioChunk) -> bool {
        let sender = lock(&self.state).microphone.clone();
        match sender {
            Some(sender) => sender.send(chunk).await.is_ok(),
            None => false,
        }
    }
}

impl MediaDevices for FakeDevices {
    fn open_microphone(&self) -> Result<MicrophoneStream> {
        let mut state = lock(&self.state);
        if state.fail_microphone {
            return Err(StudioError::Audio("microphone permission denied".to_owned()));
        }
        let (tx, rx) = mpsc::channel(64);
        let track = MediaTrack::new();
        state.tracks.push(track.clone());
        state.microphone = Some(tx);
        Ok(MicrophoneStream { chunks: rx, track })
    }

    fn open_speaker(&self) -> Result<Arc<dyn AudioOutput>> {
        Ok(Arc::new(self.output.clone()))
    }

    fn open_camera(&self) -> Result<CameraStream> {
        let mut state = lock(&self.state);
        if state.fail_camera {
            return Err(StudioError::Video("camera permission denied".to_owned()));
        }
        let track = MediaTrack::new();
        state.tracks.push(track.clone());
        Ok(CameraStream {
            source: Box::new(self.frames.clone()),
            track,
        })
    }
}
