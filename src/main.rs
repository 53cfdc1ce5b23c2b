use std::io::Write;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::SecretString;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use beacon_voice::voice::{
    ApiSynthesizer, MicRecognizer, Microphone, PLAYBACK_RATE, Speaker, SynthesizerConfig,
    ToneCue, TranscriberConfig, check_microphone, rms, tone,
};
use beacon_voice::{
    Assistant, RelayConfig, ResponseConsumer, Signal, StreamedResponse, VoiceConfig, relay,
    signal,
};

/// Beacon Voice - wake-phrase voice assistant
#[derive(Parser)]
#[command(name = "beacon-voice", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat relay server
    Serve {
        /// Port to listen on (overrides PORT and the config file)
        #[arg(long)]
        port: Option<u16>,
    },
    /// Listen for the wake phrase and answer spoken commands
    Listen {
        /// Phrase that starts a command
        #[arg(short, long, env = "BEACON_WAKE_PHRASE")]
        wake_phrase: Option<String>,

        /// Relay base URL
        #[arg(short, long, env = "BEACON_BACKEND_URL")]
        backend_url: Option<String>,

        /// Do not beep when the wake phrase is heard
        #[arg(long)]
        no_cue: bool,
    },
    /// Send one message to the relay and print the streamed reply
    Ask {
        /// Message text
        message: String,

        /// Relay base URL
        #[arg(short, long, env = "BEACON_BACKEND_URL")]
        backend_url: Option<String>,
    },
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_voice=info",
        1 => "info,beacon_voice=debug",
        2 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(command: Command) -> anyhow::Result<()> {
    match command {
        Command::Serve { port } => serve(port).await,
        Command::Listen {
            wake_phrase,
            backend_url,
            no_cue,
        } => listen(wake_phrase, backend_url, no_cue).await,
        Command::Ask {
            message,
            backend_url,
        } => ask(&message, backend_url).await,
        Command::TestMic { duration } => test_mic(duration).await,
        Command::TestSpeaker => test_speaker().await,
    }
}

async fn serve(port: Option<u16>) -> anyhow::Result<()> {
    let mut config = RelayConfig::from_env();
    if let Some(port) = port {
        config.port = port;
    }

    relay::serve(config).await?;
    Ok(())
}

async fn listen(
    wake_phrase: Option<String>,
    backend_url: Option<String>,
    no_cue: bool,
) -> anyhow::Result<()> {
    let config = VoiceConfig::load(wake_phrase, backend_url);
    let api_key = config
        .speech_api_key
        .clone()
        .unwrap_or_else(|| SecretString::from(String::new()));

    let (signals, inbox) = signal::channel();

    let recognizer = MicRecognizer::new(
        TranscriberConfig {
            api_url: config.speech_api_url.clone(),
            api_key: api_key.clone(),
            model: config.stt_model.clone(),
        },
        signals.clone(),
    )?;

    let synthesizer = ApiSynthesizer::new(
        SynthesizerConfig {
            api_url: config.speech_api_url.clone(),
            api_key,
            model: config.tts_model.clone(),
            voice: config.tts_voice.clone(),
            speed: config.tts_speed,
        },
        signals.clone(),
    )?;

    let mut assistant = Assistant::new(&config, (signals, inbox), recognizer, synthesizer)?;
    if !no_cue {
        assistant = assistant.with_cue(ToneCue::default());
    }

    // Permission check touches the audio host, keep it off the runtime threads
    let permission = assistant.sender();
    tokio::task::spawn_blocking(move || {
        let _ = permission.send(Signal::Permission(check_microphone()));
    });

    let interrupt = assistant.sender();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = interrupt.send(Signal::Shutdown);
        }
    });

    let mut status = assistant.subscribe();
    let wake = config.wake_phrase.clone();
    tokio::spawn(async move {
        while status.changed().await.is_ok() {
            let line = status.borrow_and_update().describe(&wake);
            println!("[{line}]");
        }
    });

    tokio::spawn(print_responses(assistant.subscribe_responses(), None));

    println!("Say \"{}\" followed by your command. Ctrl-C to quit.", config.wake_phrase);
    assistant.run().await;
    Ok(())
}

async fn ask(message: &str, backend_url: Option<String>) -> anyhow::Result<()> {
    let config = VoiceConfig::load(None, backend_url);
    let mut consumer = ResponseConsumer::new(&config.backend_url)?;
    let updates = consumer.subscribe();

    let turn = consumer.send_message(message);
    print_responses(updates, Some(turn)).await;
    Ok(())
}

/// Print each response as it grows
///
/// With `until`, returns once that turn's stream has finished.
async fn print_responses(mut updates: watch::Receiver<StreamedResponse>, until: Option<u64>) {
    let mut turn = 0;
    let mut printed = 0;

    while updates.changed().await.is_ok() {
        let response = updates.borrow_and_update().clone();

        if response.turn != turn {
            turn = response.turn;
            printed = 0;
        }

        if response.text.len() > printed {
            print!("{}", &response.text[printed..]);
            let _ = std::io::stdout().flush();
            printed = response.text.len();
        }

        if response.in_flight {
            continue;
        }

        if printed > 0 {
            println!();
        }
        if let Some(error) = &response.error {
            eprintln!("error: {error}");
        }
        if until == Some(response.turn) {
            return;
        }
    }
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut mic = Microphone::open()?;
    mic.start()?;

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = mic.drain();
        let energy = rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter = "#".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!("[{:2}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]", i + 1);
    }

    mic.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Run: arecord -l (to list devices)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let samples = tone(440.0, Duration::from_secs(2), 0.3);
    println!("Playing {} samples at {PLAYBACK_RATE} Hz...", samples.len());

    tokio::task::spawn_blocking(move || {
        let speaker = Speaker::open()?;
        speaker.play(samples, &AtomicBool::new(false))
    })
    .await??;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Run: aplay -l (to list devices)");

    Ok(())
}
