//! Streamed response consumer
//!
//! Sends a finalized command to the relay and exposes the growing reply
//! through a `watch` channel. Each send starts a new turn; updates from an
//! older turn's stream are discarded.

use std::fmt::Display;
use std::sync::Arc;
use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::watch;

use super::sse::{ChatEvent, SseDecoder, parse_event};
use crate::Result;
use crate::signal::{Signal, SignalSender};

/// Observable state of the current turn's response
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedResponse {
    /// Turn the response belongs to
    pub turn: u64,
    /// Text accumulated so far
    pub text: String,
    /// Whether the stream is still open
    pub in_flight: bool,
    /// Failure description, if the stream failed
    pub error: Option<String>,
}

/// Client side of the relay's `/api/chat` stream
pub struct ResponseConsumer {
    client: reqwest::Client,
    endpoint: String,
    turn: u64,
    state: Arc<watch::Sender<StreamedResponse>>,
    done: Option<SignalSender>,
}

impl ResponseConsumer {
    /// Create a consumer for the relay at `backend_url`
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(backend_url: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let (state, _) = watch::channel(StreamedResponse::default());

        Ok(Self {
            client,
            endpoint: format!("{}/api/chat", backend_url.trim_end_matches('/')),
            turn: 0,
            state: Arc::new(state),
            done: None,
        })
    }

    /// Report `Signal::StreamDone` to `signals` when each stream finishes
    #[must_use]
    pub fn with_notifier(mut self, signals: SignalSender) -> Self {
        self.done = Some(signals);
        self
    }

    /// Watch the current response
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<StreamedResponse> {
        self.state.subscribe()
    }

    /// Snapshot of the current response
    #[must_use]
    pub fn current(&self) -> StreamedResponse {
        self.state.borrow().clone()
    }

    /// Turn number of the most recent send
    #[must_use]
    pub const fn current_turn(&self) -> u64 {
        self.turn
    }

    /// Send `message` and stream the reply in the background
    ///
    /// Never fails; errors land in [`StreamedResponse::error`]. Returns the
    /// new turn number.
    pub fn send_message(&mut self, message: &str) -> u64 {
        self.turn += 1;
        let turn = self.turn;

        self.state.send_replace(StreamedResponse {
            turn,
            in_flight: true,
            ..StreamedResponse::default()
        });

        tracing::info!(turn, text = message, "sending message");

        let request = self
            .client
            .post(&self.endpoint)
            .json(&serde_json::json!({ "message": message }));
        let state = Arc::clone(&self.state);
        let done = self.done.clone();

        tokio::spawn(async move {
            let outcome = match request.send().await {
                Ok(response) if response.status().is_success() => {
                    read_stream(turn, response.bytes_stream(), &state).await
                }
                Ok(response) => Err(format!(
                    "HTTP error! status: {}",
                    response.status().as_u16()
                )),
                Err(e) => Err(e.to_string()),
            };

            finish(turn, &state, outcome.err());

            if let Some(done) = done {
                let _ = done.send(Signal::StreamDone { turn });
            }
        });

        turn
    }
}

/// Read an SSE body into the response for `turn`
///
/// Returns `Err` with a user-facing message on read failure or an error event.
pub(crate) async fn read_stream<S, B, E>(
    turn: u64,
    stream: S,
    state: &watch::Sender<StreamedResponse>,
) -> std::result::Result<(), String>
where
    S: Stream<Item = std::result::Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    let mut stream = std::pin::pin!(stream);
    let mut decoder = SseDecoder::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| {
            tracing::warn!(turn, error = %e, "response stream read failed");
            e.to_string()
        })?;

        for payload in decoder.push(chunk.as_ref()) {
            if apply(turn, &payload, state)? {
                return Ok(());
            }
        }
    }

    if let Some(payload) = decoder.finish() {
        apply(turn, &payload, state)?;
    }

    tracing::debug!(turn, "response stream closed without [DONE]");
    Ok(())
}

/// Apply one payload; returns true on `[DONE]`
fn apply(
    turn: u64,
    payload: &str,
    state: &watch::Sender<StreamedResponse>,
) -> std::result::Result<bool, String> {
    match parse_event(payload) {
        Ok(ChatEvent::Done) => Ok(true),
        Ok(ChatEvent::Delta(text)) => {
            update(turn, state, |response| response.text.push_str(&text));
            Ok(false)
        }
        Ok(ChatEvent::Error(message)) => Err(message),
        Ok(ChatEvent::Empty) => Ok(false),
        Err(e) => {
            tracing::warn!(turn, error = %e, payload, "skipping malformed event");
            Ok(false)
        }
    }
}

/// Mutate the response only if it still belongs to `turn`
fn update(
    turn: u64,
    state: &watch::Sender<StreamedResponse>,
    f: impl FnOnce(&mut StreamedResponse),
) -> bool {
    state.send_if_modified(|response| {
        if response.turn != turn {
            return false;
        }
        f(response);
        true
    })
}

fn finish(turn: u64, state: &watch::Sender<StreamedResponse>, error: Option<String>) {
    let current = update(turn, state, |response| {
        response.in_flight = false;
        if let Some(message) = &error {
            response.error = Some(message.clone());
        }
    });

    match (&error, current) {
        (Some(message), true) => tracing::warn!(turn, error = %message, "response failed"),
        (None, true) => tracing::debug!(turn, "response complete"),
        (_, false) => tracing::debug!(turn, "superseded response finished"),
    }
}
