//! Shared test utilities
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use beacon_voice::config::file::ConfigFile;
use beacon_voice::signal::{RecognizerEvent, Signal, SignalSender, UtteranceId};
use beacon_voice::voice::{Recognizer, Synthesizer};
use beacon_voice::{RelayConfig, Result, Timings, VoiceConfig};
use secrecy::SecretString;
use tokio::net::TcpListener;

/// Recognizer that records start/stop calls
///
/// When built with [`FakeRecognizer::echoing`] it confirms every start with
/// `Started` and every stop with `Ended`, like a live recognizer would.
#[derive(Clone, Default)]
pub struct FakeRecognizer {
    pub calls: Arc<Mutex<Vec<&'static str>>>,
    events: Option<SignalSender>,
}

impl FakeRecognizer {
    pub fn echoing(signals: SignalSender) -> Self {
        Self {
            calls: Arc::default(),
            events: Some(signals),
        }
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

impl Recognizer for FakeRecognizer {
    fn start(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("start");
        if let Some(events) = &self.events {
            let _ = events.send(Signal::Recognizer(RecognizerEvent::Started));
        }
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.calls.lock().unwrap().push("stop");
        if let Some(events) = &self.events {
            let _ = events.send(Signal::Recognizer(RecognizerEvent::Ended));
        }
        Ok(())
    }
}

/// Synthesizer that records spoken text and cancellations
#[derive(Clone, Default)]
pub struct FakeSynthesizer {
    pub spoken: Arc<Mutex<Vec<(UtteranceId, String)>>>,
    pub cancelled: Arc<Mutex<Vec<UtteranceId>>>,
}

impl FakeSynthesizer {
    pub fn spoken(&self) -> Vec<String> {
        self.spoken
            .lock()
            .unwrap()
            .iter()
            .map(|(_, text)| text.clone())
            .collect()
    }

    pub fn last_id(&self) -> Option<UtteranceId> {
        self.spoken.lock().unwrap().last().map(|(id, _)| *id)
    }
}

impl Synthesizer for FakeSynthesizer {
    fn speak(&mut self, id: UtteranceId, text: &str) -> Result<()> {
        self.spoken.lock().unwrap().push((id, text.to_string()));
        Ok(())
    }

    fn cancel(&mut self, id: UtteranceId) {
        self.cancelled.lock().unwrap().push(id);
    }
}

/// Short timings so tests with real time stay fast
pub fn fast_timings() -> Timings {
    Timings {
        end_restart: Duration::from_millis(10),
        error_restart: Duration::from_millis(20),
        speech_end_restart: Duration::from_millis(20),
        wake_stop: Duration::from_millis(10),
        silence: Duration::from_millis(150),
    }
}

/// Voice configuration for wake phrase "hello world" against `backend_url`
pub fn voice_config(backend_url: &str) -> VoiceConfig {
    let mut config = VoiceConfig::from_file(
        ConfigFile::default(),
        Some("hello world".to_string()),
        Some(backend_url.to_string()),
    );
    config.timings = fast_timings();
    config
}

/// Relay configuration pointing at `upstream_url`
pub fn relay_config(upstream_url: &str) -> RelayConfig {
    RelayConfig {
        port: 0,
        allowed_origin: "http://localhost:3000".to_string(),
        upstream_url: upstream_url.to_string(),
        model: "test-model".to_string(),
        api_key: SecretString::from("test-key".to_string()),
        site_url: "http://localhost:3000".to_string(),
        site_name: "Test".to_string(),
        assistant_name: "Beacon".to_string(),
    }
}

/// Serve `router` on an ephemeral local port
pub async fn spawn_server(router: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind test server");
    let addr = listener.local_addr().expect("no local addr");

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });

    addr
}

