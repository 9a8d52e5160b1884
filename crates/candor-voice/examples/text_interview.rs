//! Text Interview Demo: drive a full interview from the terminal.
//!
//! Answers are typed on stdin; replies come from the agent at `CANDOR__DEFAULT_AGENT_ENDPOINT`
//! (or `default_agent_endpoint` in config/candor.toml) and are voiced through the TTS chain.
//! Set `TTS_API_KEY` / `ELEVENLABS_API_KEY` in `.env` for real synthesis; otherwise the local
//! fallback prints the reply. Type `/quit` to end the interview.

use candor_core::{
    ContextRecord, CoreConfig, FinishOutcome, ParticipantRecord, SessionLifecycle, SledStore,
};
use candor_voice::{
    CaptureRegistry, CoordinatorSettings, HttpAgentTransport, InterviewCoordinator, NullPlayback,
    Playback, RecognitionOptions, ResponseDeduplicator, ScriptedMicrophone, ScriptedRecognizer,
    StartOutcome, TtsOrchestrator, TurnOutcome,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn print_reply(outcome: &TurnOutcome) {
    match outcome {
        TurnOutcome::Completed(report) => {
            if let Some(text) = report.reply.text() {
                println!("\nInterviewer: {}\n", text);
            }
            if let Some(signal) = &report.closing {
                if signal.should_prompt() {
                    println!("(The interviewer seems to be wrapping up. Type /quit to finish.)");
                }
            }
        }
        TurnOutcome::Suppressed => info!("duplicate reply ignored"),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = CoreConfig::load()?;
    info!("Text Interview Demo, storage at {}", config.storage_path);

    let store = Arc::new(SledStore::open_path(&config.storage_path)?);
    store.put_participant(&ParticipantRecord {
        id: "demo-candidate".into(),
        name: "Demo Candidate".into(),
        email: None,
    })?;
    store.put_context(&ContextRecord {
        id: "demo-job".into(),
        title: "Software Engineer".into(),
        department: None,
        agent_endpoint: None,
        prefer_indian_accent: false,
    })?;

    let lifecycle = Arc::new(SessionLifecycle::new(store.clone(), store.clone()));
    if let Some(url) = &config.report_webhook {
        lifecycle.register_hook(Arc::new(candor_core::WebhookNotifier::new(url.clone())));
    }

    #[cfg(feature = "hardware")]
    let playback: Arc<dyn Playback> = match candor_voice::SpeakerPlayback::new() {
        Ok(p) => Arc::new(p),
        Err(e) => {
            warn!("speaker unavailable, running silent: {}", e);
            Arc::new(NullPlayback::new())
        }
    };
    #[cfg(not(feature = "hardware"))]
    let playback: Arc<dyn Playback> = Arc::new(NullPlayback::new());

    let coordinator = InterviewCoordinator::new(
        lifecycle.clone(),
        store.clone(),
        Arc::new(HttpAgentTransport::new(config.dispatch_timeout())?),
        config.default_agent_endpoint.clone(),
        Arc::new(ResponseDeduplicator::new(config.dedup_window())),
        Arc::new(TtsOrchestrator::from_env()),
        playback,
        Arc::new(CaptureRegistry::new(
            ScriptedMicrophone::granting(),
            ScriptedRecognizer::replying("", 0.0),
            RecognitionOptions::for_language(config.recognition_language.clone()),
        )),
        CoordinatorSettings::from(&config),
    );

    let session = lifecycle.create("demo-candidate", "demo-job").await?;
    info!("session {} created", session.id);

    match coordinator.start_interview(&session.id).await {
        Ok(StartOutcome::Started(outcome)) => print_reply(&outcome),
        Ok(StartOutcome::AlreadyStarted) => {}
        Err(e) => {
            warn!("interview could not start: {}", e);
            println!("{}", e.user_message());
            return Ok(());
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let answer = line.trim();
        if answer.is_empty() {
            continue;
        }
        if answer == "/quit" {
            break;
        }
        match coordinator.typed_turn(&session.id, answer).await {
            Ok(outcome) => {
                print_reply(&outcome);
                if let TurnOutcome::Completed(report) = &outcome {
                    if report.finished.is_some() {
                        info!("interview completed by the interviewer");
                        store.flush()?;
                        return Ok(());
                    }
                }
            }
            Err(e) => {
                println!("{}", e.user_message());
                if matches!(e, candor_voice::VoiceError::Dispatch { .. }) {
                    store.flush()?;
                    return Ok(());
                }
            }
        }
    }

    let finished = coordinator
        .finish_interview(&session.id, FinishOutcome::Completed)
        .await?;
    info!(
        "interview {} {}: {} questions asked, {} answered",
        finished.id, finished.status, finished.questions_asked, finished.questions_answered
    );
    store.flush()?;
    Ok(())
}
