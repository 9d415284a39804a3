//! Console client for a live transcription session.
//!
//! Connects to a running transcription server, streams silent audio frames
//! at the capture cadence, and prints transcript revisions as they merge.
//! Useful for poking at a server without the full editor UI:
//!
//! ```text
//! live_client --recording-id rec-42 [--endpoint ws://127.0.0.1:5000/ws/transcription] [--seconds 30]
//! ```

use std::time::Duration;

use scriva_core::{
    Session, SessionConfig, SessionState, SyncCoordinator, AUDIO_FRAME_INTERVAL_MS,
};

#[derive(Debug)]
struct Args {
    endpoint: String,
    recording_id: String,
    seconds: u64,
}

fn parse_args() -> Result<Args, String> {
    let mut endpoint = SessionConfig::default().endpoint;
    let mut recording_id: Option<String> = None;
    let mut seconds = 30u64;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--endpoint" => {
                endpoint = it.next().ok_or("--endpoint requires a value")?;
            }
            "--recording-id" => {
                recording_id = Some(it.next().ok_or("--recording-id requires a value")?);
            }
            "--seconds" => {
                let raw = it.next().ok_or("--seconds requires a value")?;
                seconds = raw
                    .parse()
                    .map_err(|e| format!("invalid --seconds value: {e}"))?;
            }
            other => return Err(format!("unknown argument: {other}")),
        }
    }

    Ok(Args {
        endpoint,
        recording_id: recording_id.ok_or("--recording-id is required")?,
        seconds,
    })
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    if let Err(e) = run().await {
        eprintln!("live_client failed: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args = parse_args()?;

    let session = Session::new(SessionConfig {
        endpoint: args.endpoint,
    });
    let mut status_rx = session.subscribe_status();
    let mut document_rx = session.subscribe_documents();
    let mut sync = SyncCoordinator::new();

    session.connect(&args.recording_id);

    // A silent 500 ms frame; a real client would forward encoded capture.
    let frame = vec![0u8; 8_000];
    let mut cadence = tokio::time::interval(Duration::from_millis(AUDIO_FRAME_INTERVAL_MS));
    let deadline = tokio::time::sleep(Duration::from_secs(args.seconds));
    tokio::pin!(deadline);
    let mut stopping = false;

    loop {
        tokio::select! {
            _ = cadence.tick() => {
                session.send_audio(frame.clone());
            }
            event = document_rx.recv() => {
                if let Ok(event) = event {
                    let document = session.document();
                    println!("[rev {:>3}] {}", event.revision, document.text());
                    // Show where a playback tick at the transcript tail would land.
                    if let Some(last) = sync.words_by_start(&document).last().cloned() {
                        if last.is_seekable() {
                            if let Some(active) = sync.on_playback_time(&document, last.start) {
                                println!("          active word at tail: {active}");
                            }
                        }
                    }
                }
            }
            event = status_rx.recv() => {
                match event {
                    Ok(status) => {
                        println!("-- session {:?}: {}", status.state, status.detail.as_deref().unwrap_or("-"));
                        match status.state {
                            SessionState::Disconnected => break,
                            SessionState::Error => {
                                return Err(status.detail.unwrap_or_else(|| "session error".into()));
                            }
                            _ => {}
                        }
                    }
                    Err(_) => break,
                }
            }
            _ = &mut deadline, if !stopping => {
                stopping = true;
                println!("-- time budget reached, disconnecting");
                session.disconnect();
            }
        }
    }

    let final_document = session.document();
    println!("final transcript: {}", final_document.text());
    Ok(())
}
