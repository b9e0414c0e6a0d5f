//! The WebSocket live connector against a local server.

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sarjo::gemini::types::{Content, GenerationConfig};
use sarjo::gemini::{ClientMessage, LiveConnector, LiveEvent, LiveSetup, WebSocketConnector};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};

struct Seen {
    uri: String,
    setup: Value,
    media: Value,
}

fn setup() -> LiveSetup {
    LiveSetup {
        model: "models/live-test".to_owned(),
        generation_config: GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_owned()]),
            ..GenerationConfig::default()
        },
        system_instruction: Content::system("be kind"),
        tools: Vec::new(),
        input_audio_transcription: None,
        output_audio_transcription: None,
    }
}

async fn next_text<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(_)) => {}
            other => panic!("expected a text frame, got {other:?}"),
        }
    }
}

async fn recv(events: &mut mpsc::Receiver<LiveEvent>) -> LiveEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a live event")
        .expect("event channel closed")
}

#[tokio::test]
async fn connector_speaks_the_live_protocol() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut uri = String::new();
        let callback = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
            uri = request.uri().to_string();
            Ok(response)
        };
        let mut ws = tokio_tungstenite::accept_hdr_async(stream, callback)
            .await
            .unwrap();

        let setup = next_text(&mut ws).await;
        for frame in [
            json!({ "setupComplete": {} }),
            json!({ "serverContent": {
                "outputTranscription": { "text": "Hello" },
                "modelTurn": { "parts": [
                    { "inlineData": { "mimeType": "audio/pcm;rate=24000", "data": "AAAA" } }
                ]}
            }}),
            json!({ "toolCall": { "functionCalls": [
                { "id": "t1", "name": "setAlarm", "args": { "time": "7 AM", "label": "tea" } }
            ]}}),
        ] {
            ws.send(Message::Text(frame.to_string())).await.unwrap();
        }

        let media = next_text(&mut ws).await;
        ws.send(Message::Close(None)).await.unwrap();
        Seen { uri, setup, media }
    });

    let connector = WebSocketConnector::new(format!("ws://{addr}/live"), "live-key");
    let (link, mut events) = connector.connect(setup()).await.unwrap();

    assert_eq!(recv(&mut events).await, LiveEvent::Opened);
    assert_eq!(recv(&mut events).await, LiveEvent::OutputTranscript("Hello".into()));
    assert_eq!(recv(&mut events).await, LiveEvent::Audio {
        data: "AAAA".into(),
        mime_type: "audio/pcm;rate=24000".into(),
    });
    match recv(&mut events).await {
        LiveEvent::ToolCall(calls) => {
            assert_eq!(calls.len(), 1);
            assert_eq!(calls[0].id.as_deref(), Some("t1"));
            assert_eq!(calls[0].str_arg("label"), "tea");
        }
        other => panic!("expected a tool call, got {other:?}"),
    }

    link.send(ClientMessage::media("audio/pcm;rate=16000", "AQI="))
        .unwrap();
    assert!(matches!(recv(&mut events).await, LiveEvent::Closed(_)));

    let seen = server.await.unwrap();
    assert!(seen.uri.starts_with("/live?"));
    assert!(seen.uri.contains("key=live-key"));
    assert_eq!(seen.setup["setup"]["model"], "models/live-test");
    assert_eq!(
        seen.setup["setup"]["systemInstruction"]["parts"][0]["text"],
        "be kind"
    );
    assert_eq!(
        seen.media,
        json!({ "realtimeInput": { "mediaChunks": [
            { "mimeType": "audio/pcm;rate=16000", "data": "AQI=" }
        ]}})
    );
    link.close();
}

#[tokio::test]
async fn refused_handshake_is_a_live_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        // Accept and drop without upgrading.
        let (stream, _) = listener.accept().await.unwrap();
        drop(stream);
    });

    let connector = WebSocketConnector::new(format!("ws://{addr}/live"), "k");
    let err = connector.connect(setup()).await.err().unwrap();
    assert!(matches!(err, sarjo::StudioError::Live(_)));
}
