//! Streaming chat-completion client for the upstream provider

use std::collections::VecDeque;
use std::time::Duration;

use axum::body::Bytes;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::chat::ChatMessage;
use crate::chat::sse::{ChatEvent, SseDecoder, parse_event};
use crate::config::RelayConfig;
use crate::{Error, Result};

/// Sampling temperature sent upstream
const TEMPERATURE: f32 = 0.7;

/// Response length cap sent upstream
const MAX_TOKENS: u32 = 500;

/// Stream of response tokens; an `Err` item ends the stream
pub type TokenStream = BoxStream<'static, Result<String>>;

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    temperature: f32,
    max_tokens: u32,
}

/// OpenAI-compatible streaming completion client (OpenRouter by default)
#[derive(Clone)]
pub struct UpstreamClient {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: SecretString,
    site_url: String,
    site_name: String,
}

impl UpstreamClient {
    /// Build a client from relay configuration
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: &RelayConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            endpoint: format!(
                "{}/chat/completions",
                config.upstream_url.trim_end_matches('/')
            ),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            site_url: config.site_url.clone(),
            site_name: config.site_name.clone(),
        })
    }

    /// Start a streamed completion for `messages`
    ///
    /// # Errors
    ///
    /// Returns error if the request fails or upstream answers non-2xx
    pub async fn stream_chat(&self, messages: &[ChatMessage]) -> Result<TokenStream> {
        let body = CompletionRequest {
            model: &self.model,
            messages,
            stream: true,
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        tracing::debug!(model = %self.model, messages = messages.len(), "upstream request");

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(self.api_key.expose_secret())
            .header("HTTP-Referer", &self.site_url)
            .header("X-Title", &self.site_name)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Upstream(format!("upstream error {status}: {body}")));
        }

        Ok(token_stream(response.bytes_stream()).boxed())
    }
}

struct TokenState<S> {
    bytes: std::pin::Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<String>>,
    finished: bool,
}

impl<S> TokenState<S> {
    /// Queue tokens from decoded payloads; stops at `[DONE]` or an error
    fn absorb(&mut self, payloads: impl IntoIterator<Item = String>) {
        for payload in payloads {
            match parse_event(&payload) {
                Ok(ChatEvent::Delta(token)) => self.pending.push_back(Ok(token)),
                Ok(ChatEvent::Empty) => {}
                Ok(ChatEvent::Done) => {
                    self.finished = true;
                    return;
                }
                Ok(ChatEvent::Error(message)) => {
                    self.pending.push_back(Err(Error::Upstream(message)));
                    self.finished = true;
                    return;
                }
                Err(e) => tracing::warn!(error = %e, "skipping malformed upstream event"),
            }
        }
    }
}

/// Turn an upstream SSE body into a token stream
pub(crate) fn token_stream<S, E>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Send + 'static,
    E: Into<Error>,
{
    stream::unfold(
        TokenState {
            bytes: Box::pin(bytes),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, state));
                }
                if state.finished {
                    return None;
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        let payloads = state.decoder.push(&chunk);
                        state.absorb(payloads);
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(e.into()), state));
                    }
                    None => {
                        let tail = state.decoder.finish();
                        state.absorb(tail);
                        state.finished = true;
                    }
                }
            }
        },
    )
}
