use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, warn};

use memovox::audio::frame_peak;
use memovox::{
    format_elapsed, CaptureSource, Config, HttpBackend, MicCapture, MicConfig, RecordingBackend,
    SessionConfig, SessionController, SessionStatus, Severity, WaveformSampler,
};

#[derive(Parser)]
#[command(name = "memovox", about = "Record voice notes and upload them for transcription")]
struct Cli {
    /// Config file (TOML/YAML/JSON), without extension
    #[arg(long, default_value = "config/memovox")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record from the microphone until Ctrl-C; Enter toggles pause
    Record,
    /// List recordings
    List,
    /// Show one recording, including transcription and notes
    Show { id: String },
    /// Replace the notes on a recording
    Notes { id: String, notes: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let cfg = Config::load(&cli.config)?;
    let backend = Arc::new(HttpBackend::new(
        cfg.backend.base_url.clone(),
        cfg.backend.api_token.clone(),
    ));

    match cli.command {
        Commands::Record => record(cfg, backend).await,
        Commands::List => {
            for rec in backend.list_recordings().await? {
                let created = rec
                    .created_at
                    .map(|t| t.to_rfc3339())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:?}  created {}  chunks {}",
                    rec.id, rec.status, created, rec.chunks_count
                );
            }
            Ok(())
        }
        Commands::Show { id } => {
            let rec = backend.get_recording(&id).await?;
            println!("id:     {}", rec.id);
            println!("status: {:?}", rec.status);
            if let Some(text) = &rec.transcription_text {
                println!("transcript:\n{text}");
            }
            if let Some(notes) = &rec.notes {
                println!("notes:\n{notes}");
            }
            Ok(())
        }
        Commands::Notes { id, notes } => {
            backend.update_notes(&id, &notes).await?;
            println!("notes updated for {id}");
            Ok(())
        }
    }
}

async fn record(cfg: Config, backend: Arc<HttpBackend>) -> Result<()> {
    let mic = MicCapture::new(MicConfig {
        fragment_interval: Duration::from_millis(cfg.audio.fragment_interval_ms),
        frame_size: cfg.audio.frame_size,
    });
    let tap = mic.amplitude_tap();

    let session_config = SessionConfig {
        chunk_interval: Duration::from_secs(cfg.session.chunk_interval_secs),
        content_type: cfg.session.content_type.clone(),
    };
    let backend: Arc<dyn RecordingBackend> = backend;
    let (handle, mut notices) = SessionController::spawn(backend, Box::new(mic), session_config);

    handle.start().await?;
    println!("Recording. Enter toggles pause, Ctrl-C stops.");

    tokio::spawn(async move {
        while let Some(notice) = notices.recv().await {
            match notice.severity() {
                Severity::Transient => warn!("{}", notice.message()),
                Severity::Blocking => error!("{}", notice.message()),
            }
        }
    });

    // Console amplitude meter doubling as the elapsed-time display.
    let mut sampler = WaveformSampler::new(
        tap,
        handle.watch(),
        Duration::from_millis(cfg.waveform.frame_interval_ms),
    );
    let meter_watch = handle.watch();
    let meter = tokio::spawn(async move {
        while let Some(frame) = sampler.next_frame().await {
            let peak = frame_peak(&frame);
            let bars = ((peak * 30.0) as usize).min(30);
            let elapsed = meter_watch.borrow().elapsed_secs;
            print!("\r{} |{:<30}|", format_elapsed(elapsed), "#".repeat(bars));
            let _ = std::io::stdout().flush();
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                Some(_) => {
                    let toggled = match handle.snapshot().status {
                        SessionStatus::Recording => handle.pause().await,
                        SessionStatus::Paused => handle.resume().await,
                        _ => Ok(()),
                    };
                    match toggled {
                        Ok(()) => println!("{}", handle.snapshot().status),
                        Err(e) => warn!("{e}"),
                    }
                }
                None => break,
            },
        }
    }

    println!("\nStopping...");
    handle.stop().await?;
    meter.abort();
    println!("Recording saved; transcription started.");
    Ok(())
}
