//! Assistant event loop integration tests
//!
//! The assistant runs against fake recognizer and synthesizer handles and a
//! canned relay served on a local port.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{Json, Router, extract::State, routing::post};
use beacon_voice::chat::sse::{DONE_FRAME, delta_frame, error_frame};
use beacon_voice::signal::{
    self, RecognizerError, RecognizerEvent, Signal, SpeechEvent, Transcript,
};
use beacon_voice::voice::{DetectorPhase, PermissionStatus, RecognitionState};
use beacon_voice::Assistant;
use serde_json::Value;

mod common;
use common::{FakeRecognizer, FakeSynthesizer, spawn_server, voice_config};

type TestAssistant = Assistant<FakeRecognizer, FakeSynthesizer>;

/// Relay stand-in that records messages and replies with a fixed body
#[derive(Clone)]
struct FakeRelay {
    body: String,
    messages: Arc<Mutex<Vec<String>>>,
}

impl FakeRelay {
    fn replying(tokens: &[&str]) -> Self {
        let mut body: String = tokens.iter().map(|t| delta_frame(t)).collect();
        body.push_str(DONE_FRAME);
        Self::with_body(body)
    }

    fn with_body(body: String) -> Self {
        Self {
            body,
            messages: Arc::default(),
        }
    }

    fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }

    async fn spawn(&self) -> String {
        let router = Router::new()
            .route("/api/chat", post(relay_chat))
            .with_state(self.clone());
        format!("http://{}", spawn_server(router).await)
    }
}

async fn relay_chat(State(relay): State<FakeRelay>, Json(body): Json<Value>) -> String {
    let message = body["message"].as_str().unwrap_or_default().to_string();
    relay.messages.lock().unwrap().push(message);
    relay.body.clone()
}

/// Assistant wired to an echoing recognizer and a recording synthesizer
fn build(backend_url: &str) -> (TestAssistant, FakeRecognizer, FakeSynthesizer) {
    let (signals, inbox) = signal::channel();
    let recognizer = FakeRecognizer::echoing(signals.clone());
    let synthesizer = FakeSynthesizer::default();

    let assistant = Assistant::new(
        &voice_config(backend_url),
        (signals, inbox),
        recognizer.clone(),
        synthesizer.clone(),
    )
    .unwrap();

    (assistant, recognizer, synthesizer)
}

/// Process signals until `done` holds
async fn step_until(assistant: &mut TestAssistant, mut done: impl FnMut(&TestAssistant) -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !done(assistant) {
            assert!(assistant.step().await, "assistant stopped early");
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Grant permission and wait for recognition to go live
async fn start_listening(assistant: &mut TestAssistant) {
    assistant.handle(Signal::Permission(PermissionStatus::Granted));
    step_until(assistant, |a| a.session().state() == RecognitionState::Running).await;
}

fn heard(text: &str) -> Signal {
    Signal::Recognizer(RecognizerEvent::Result(Transcript::single(text, false)))
}

#[tokio::test]
async fn test_wake_command_is_answered_aloud() {
    let relay = FakeRelay::replying(&["Sunny ", "and warm."]);
    let (mut assistant, recognizer, synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assert!(assistant.status().describe("hello world").contains("Listening for"));

    assistant.handle(heard("hello world what's the weather"));
    assert_eq!(assistant.phase(), DetectorPhase::CapturingCommand);
    assert!(assistant.status().awaiting_command);
    assert_eq!(assistant.status().command, "what's the weather");

    step_until(&mut assistant, |_| !synthesizer.spoken().is_empty()).await;

    assert_eq!(relay.messages(), ["what's the weather"]);
    assert_eq!(synthesizer.spoken(), ["Sunny and warm."]);
    assert_eq!(assistant.phase(), DetectorPhase::ListeningForWake);

    // The wake detection restarted the recognizer to clear its transcript
    let calls = recognizer.calls();
    assert_eq!(calls[..3], ["start", "stop", "start"]);
}

#[tokio::test]
async fn test_recognition_suspended_while_speaking() {
    let relay = FakeRelay::replying(&["Done."]);
    let (mut assistant, recognizer, synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world lights off"));
    assistant.handle(Signal::Finalize);
    step_until(&mut assistant, |_| !synthesizer.spoken().is_empty()).await;
    step_until(&mut assistant, |a| a.session().state() == RecognitionState::Running).await;

    let id = synthesizer.last_id().unwrap();
    assistant.handle(Signal::Speech(SpeechEvent::Started(id)));
    assert!(assistant.is_speaking());
    assert!(assistant.status().speaking);
    assert_eq!(assistant.session().state(), RecognitionState::Stopping);

    step_until(&mut assistant, |a| a.session().state() == RecognitionState::Idle).await;
    let starts_while_speaking = recognizer.calls().iter().filter(|c| **c == "start").count();

    // Echo of our own voice is not a wake phrase
    assistant.handle(heard("hello world lights off"));
    assert_eq!(assistant.phase(), DetectorPhase::ListeningForWake);

    assistant.handle(Signal::Speech(SpeechEvent::Ended(id)));
    assert!(!assistant.is_speaking());
    step_until(&mut assistant, |a| a.session().state() == RecognitionState::Running).await;

    let starts = recognizer.calls().iter().filter(|c| **c == "start").count();
    assert_eq!(starts, starts_while_speaking + 1);
}

#[tokio::test]
async fn test_new_command_interrupts_speech() {
    let relay = FakeRelay::replying(&["Okay."]);
    let (mut assistant, _recognizer, synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world first"));
    assistant.handle(Signal::Finalize);
    step_until(&mut assistant, |_| synthesizer.spoken().len() == 1).await;
    let first = synthesizer.last_id().unwrap();

    // Command arrives before the reply started playing
    assistant.handle(heard("hello world second"));
    assistant.handle(Signal::Finalize);
    assert_eq!(*synthesizer.cancelled.lock().unwrap(), [first]);
    assert_eq!(assistant.output().current(), None);

    step_until(&mut assistant, |_| synthesizer.spoken().len() == 2).await;
    assert_eq!(relay.messages(), ["first", "second"]);

    // Late start from the cancelled utterance does not block listening
    assistant.handle(Signal::Speech(SpeechEvent::Started(first)));
    assert!(!assistant.is_speaking());
}

#[tokio::test]
async fn test_failed_response_is_not_spoken() {
    let relay = FakeRelay::with_body(error_frame("Failed to get response from AI service"));
    let (mut assistant, _recognizer, synthesizer) = build(&relay.spawn().await);
    let mut responses = assistant.subscribe_responses();

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world tell me a joke"));
    assistant.handle(Signal::Finalize);
    assert!(assistant.status().processing);

    step_until(&mut assistant, |a| !a.status().processing).await;

    let response = responses.borrow_and_update().clone();
    assert_eq!(
        response.error.as_deref(),
        Some("Failed to get response from AI service")
    );
    assert!(synthesizer.spoken().is_empty());
}

#[tokio::test]
async fn test_bare_wake_phrase_sends_nothing() {
    let relay = FakeRelay::replying(&["unused"]);
    let (mut assistant, _recognizer, _synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world"));
    assert!(assistant.status().awaiting_command);
    assert!(
        assistant
            .status()
            .describe("hello world")
            .contains("speak your command")
    );

    step_until(&mut assistant, |a| a.phase() == DetectorPhase::ListeningForWake).await;
    assert!(!assistant.status().processing);
    assert!(relay.messages().is_empty());
}

/// Handle whatever arrives within `window`; nothing is expected to stop the loop
async fn drain_for(assistant: &mut TestAssistant, window: Duration) {
    let _ = tokio::time::timeout(window, async {
        while assistant.step().await {}
    })
    .await;
}

#[tokio::test]
async fn test_not_allowed_discards_command_in_progress() {
    let relay = FakeRelay::replying(&["Opening."]);
    let (mut assistant, _recognizer, synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world open the door"));
    assert_eq!(assistant.phase(), DetectorPhase::CapturingCommand);

    assistant.handle(Signal::Recognizer(RecognizerEvent::Error(
        RecognizerError::NotAllowed,
    )));
    assert_eq!(assistant.status().permission, PermissionStatus::Denied);
    assert_eq!(assistant.phase(), DetectorPhase::ListeningForWake);
    assert!(!assistant.status().awaiting_command);

    // Well past the silence interval
    drain_for(&mut assistant, Duration::from_millis(600)).await;

    assert!(relay.messages().is_empty());
    assert!(synthesizer.spoken().is_empty());
}

#[tokio::test]
async fn test_permission_revoked_during_capture_sends_nothing() {
    let relay = FakeRelay::replying(&["unused"]);
    let (mut assistant, _recognizer, _synthesizer) = build(&relay.spawn().await);

    start_listening(&mut assistant).await;
    assistant.handle(heard("hello world turn up the heat"));
    assistant.handle(Signal::Permission(PermissionStatus::Denied));
    assert_eq!(assistant.phase(), DetectorPhase::ListeningForWake);

    // An explicit finalize has nothing left to send either
    assistant.handle(Signal::Finalize);
    drain_for(&mut assistant, Duration::from_millis(600)).await;

    assert!(relay.messages().is_empty());
    assert!(!assistant.status().processing);
}

#[tokio::test]
async fn test_denied_permission_never_starts() {
    let (mut assistant, recognizer, _synthesizer) = build("http://127.0.0.1:1");

    assistant.handle(Signal::Permission(PermissionStatus::Denied));

    assert!(recognizer.calls().is_empty());
    assert!(assistant.status().describe("hello world").contains("denied"));
}

#[tokio::test]
async fn test_shutdown_stops_recognition() {
    let (mut assistant, recognizer, _synthesizer) = build("http://127.0.0.1:1");
    start_listening(&mut assistant).await;

    assistant.sender().send(Signal::Shutdown).unwrap();
    tokio::time::timeout(Duration::from_secs(5), assistant.run())
        .await
        .expect("run did not return");

    assert_eq!(recognizer.calls().last(), Some(&"stop"));
    assert_eq!(assistant.session().state(), RecognitionState::Idle);
}
