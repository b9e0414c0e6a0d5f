//! Live session integration tests.
//!
//! Drive a whole conversation through `LiveSession::run` with the fake
//! connector, devices and backend from `sarjo::testing`, and check what
//! reaches the link, the alarm registry and the vault.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use sarjo::gemini::{FunctionCall, LiveEvent};
use sarjo::live::state::Speaker;
use sarjo::live::{LiveServices, LiveSession, LiveSettings, LiveVariant, SessionState};
use sarjo::testing::{FakeBackend, FakeConnector, FakeDevices};
use sarjo::{AlarmRegistry, NeuralVault, StudioConfig};
use serde_json::json;
use tokio_util::sync::CancellationToken;

struct Studio {
    _dir: tempfile::TempDir,
    connector: FakeConnector,
    devices: FakeDevices,
    backend: FakeBackend,
    alarms: AlarmRegistry,
    vault: NeuralVault,
}

impl Studio {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let vault = NeuralVault::new(dir.path().join("sarjo_studio_vault.json"), 30);
        Self {
            _dir: dir,
            connector: FakeConnector::new(),
            devices: FakeDevices::new(),
            backend: FakeBackend::new(),
            alarms: AlarmRegistry::new(),
            vault,
        }
    }

    fn session(&self, variant: LiveVariant) -> LiveSession {
        LiveSession::new(
            variant,
            LiveSettings::from_config(&StudioConfig::default()),
            LiveServices {
                connector: Arc::new(self.connector.clone()),
                devices: Arc::new(self.devices.clone()),
                backend: Arc::new(self.backend.clone()),
                alarms: self.alarms.clone(),
                vault: self.vault.clone(),
            },
        )
    }
}

fn call(id: &str, name: &str, args: serde_json::Value) -> FunctionCall {
    FunctionCall {
        id: Some(id.to_owned()),
        name: name.to_owned(),
        args,
    }
}

fn pcm(samples: usize) -> LiveEvent {
    LiveEvent::Audio {
        data: BASE64.encode(vec![0u8; samples * 2]),
        mime_type: "audio/pcm;rate=24000".to_owned(),
    }
}

#[tokio::test]
async fn assistant_conversation_sets_alarm_and_archives() {
    let studio = Studio::new();
    let mut session = studio.session(LiveVariant::Assistant);
    let events = studio.connector.events();
    let mut snapshots = session.subscribe();

    let driver = async move {
        session.run(CancellationToken::new()).await.unwrap();
        session
    };
    let script = async {
        assert!(events.send(LiveEvent::Opened).await);
        events
            .send(LiveEvent::InputTranscript("wake me at six".into()))
            .await;
        events
            .send(LiveEvent::ToolCall(vec![
                call("c1", "setAlarm", json!({ "time": "6 AM", "label": "walk" })),
                call("c2", "archiveNeuralData", json!({ "observation": "walks every morning" })),
            ]))
            .await;
        events.send(LiveEvent::OutputTranscript("Done.".into())).await;
        events.send(pcm(2400)).await;
        events.send(pcm(2400)).await;
        events.send(LiveEvent::TurnComplete).await;
        let finished = snapshots
            .wait_for(|s| !s.history.is_empty())
            .await
            .unwrap()
            .clone();
        events.send(LiveEvent::Closed(None)).await;
        finished
    };
    let (session, finished) = tokio::join!(driver, script);

    assert_eq!(session.state(), SessionState::Standby);
    assert_eq!(session.last_error(), None);

    let alarms = studio.alarms.list();
    assert_eq!(alarms.len(), 1);
    assert_eq!((alarms[0].time.as_str(), alarms[0].label.as_str()), ("6 AM", "walk"));

    let entries = studio.vault.load().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].data, "walks every morning");

    let responses = studio.connector.link().tool_responses();
    assert_eq!(responses.len(), 2);
    assert_eq!(responses[0].0, "c1");
    assert_eq!(responses[0].2, json!({ "result": "Alarm set." }));
    assert_eq!(responses[1].0, "c2");
    assert_eq!(responses[1].2, json!({ "result": "Neural data archived." }));

    let starts = studio.devices.output().scheduled_starts();
    assert_eq!(starts.len(), 2);
    assert!((starts[1] - starts[0] - 0.1).abs() < 1e-9);

    // The model's caption replaced the user's; the turn left one line behind.
    assert_eq!(finished.history.len(), 1);
    assert_eq!(finished.history[0].speaker, Speaker::Model);
    assert_eq!(finished.history[0].text, "Done.");
    assert_eq!(session.captions().history_len(), 0);

    assert!(studio.devices.all_tracks_stopped());
    assert!(studio.connector.link().is_closed());
}

#[tokio::test]
async fn vault_summary_reaches_the_next_session() {
    let studio = Studio::new();
    studio.vault.append("prefers Marathi").unwrap();

    let mut session = studio.session(LiveVariant::OneToOne);
    session.start().await.unwrap();
    let setup = studio.connector.last_setup().unwrap();
    let instruction = setup.system_instruction.parts[0].text.clone().unwrap_or_default();
    assert!(instruction.contains("prefers Marathi"));
    assert!(session.stop());
}

#[tokio::test]
async fn search_tool_uses_the_backend() {
    let studio = Studio::new();
    studio.backend.push_response(json!({
        "candidates": [{ "content": { "parts": [{ "text": "Pune is sunny." }] } }]
    }));
    let mut session = studio.session(LiveVariant::Assistant);
    let events = studio.connector.events();

    let driver = async move {
        session.run(CancellationToken::new()).await.unwrap();
        session
    };
    let script = async {
        events.send(LiveEvent::Opened).await;
        events
            .send(LiveEvent::ToolCall(vec![call(
                "s1",
                "webSearch",
                json!({ "query": "weather in Pune" }),
            )]))
            .await;
        events.send(LiveEvent::Closed(None)).await;
    };
    let (_session, ()) = tokio::join!(driver, script);

    assert_eq!(studio.backend.request_count(), 1);
    let responses = studio.connector.link().tool_responses();
    assert_eq!(responses, vec![(
        "s1".to_owned(),
        "webSearch".to_owned(),
        json!({ "result": "Pune is sunny." })
    )]);
}

#[tokio::test]
async fn link_error_mid_session_reports_instability() {
    let studio = Studio::new();
    let mut session = studio.session(LiveVariant::OneToOne);
    let events = studio.connector.events();

    let driver = async move {
        session.run(CancellationToken::new()).await.unwrap();
        session
    };
    let script = async {
        events.send(LiveEvent::Opened).await;
        events.send(LiveEvent::Error("socket reset".into())).await;
    };
    let (session, ()) = tokio::join!(driver, script);

    assert_eq!(session.state(), SessionState::Standby);
    assert_eq!(
        session.last_error(),
        Some(LiveVariant::OneToOne.runtime_failure_label())
    );
    assert!(studio.devices.all_tracks_stopped());
}

#[tokio::test]
async fn refused_connection_leaves_nothing_open() {
    let studio = Studio::new();
    studio.connector.fail_next("handshake rejected");
    let mut session = studio.session(LiveVariant::Assistant);

    assert!(session.run(CancellationToken::new()).await.is_err());
    assert_eq!(session.state(), SessionState::Standby);
    assert_eq!(
        session.last_error(),
        Some(LiveVariant::Assistant.start_failure_label())
    );
    assert!(studio.devices.all_tracks_stopped());
    assert_eq!(studio.devices.output().close_count(), 1);
}

#[tokio::test]
async fn stop_during_a_pending_search_sends_no_response() {
    let studio = Studio::new();
    studio.backend.push_pending();
    let mut session = studio.session(LiveVariant::Assistant);
    let events = studio.connector.events();
    let stop = CancellationToken::new();

    let driver = {
        let stop = stop.clone();
        async move {
            session.run(stop).await.unwrap();
            session
        }
    };
    let script = async {
        events.send(LiveEvent::Opened).await;
        events
            .send(LiveEvent::ToolCall(vec![call(
                "s1",
                "webSearch",
                json!({ "query": "monsoon forecast" }),
            )]))
            .await;
        while studio.backend.request_count() == 0 {
            tokio::task::yield_now().await;
        }
        stop.cancel();
    };
    let (session, ()) = tokio::join!(driver, script);

    assert_eq!(session.state(), SessionState::Standby);
    assert!(studio.connector.link().tool_responses().is_empty());
    assert!(studio.connector.link().is_closed());
    assert!(studio.devices.all_tracks_stopped());
}
