//! Command handlers wiring the CLI surface to the core services.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Local, Utc};
use parlance_core::providers::{
    HttpSynthesizer, HttpTranscriber, SpeechToText, TextToSpeech, ToneAnalyzer,
};
use parlance_core::store::{LocalStore, SECRET_GROQ_API_KEY, SECRET_OPENAI_API_KEY};
use parlance_core::{SyncEngine, SyncOutcome};
use tracing::{info, warn};

use crate::capture;
use crate::settings::{save_settings, AppSettings};

/// Speaking-rate estimate used when the clip length is unknown (words per
/// minute, matching the stats reference rate).
const ESTIMATE_SPEAKING_WPM: f64 = 150.0;

/// All services, constructed once at startup and shared by the handlers.
pub struct Services {
    pub store: Arc<LocalStore>,
    pub sync: SyncEngine,
    pub transcriber: HttpTranscriber,
    pub synthesizer: HttpSynthesizer,
    pub tone: ToneAnalyzer,
}

impl Services {
    pub fn new(store: Arc<LocalStore>, settings: &AppSettings) -> Self {
        let sync = SyncEngine::new(Arc::clone(&store), settings.sync_config());
        let transcriber =
            HttpTranscriber::with_base_url(Arc::clone(&store), &settings.provider_api_base);
        let synthesizer =
            HttpSynthesizer::with_base_url(Arc::clone(&store), &settings.provider_api_base);
        let tone = ToneAnalyzer::with_base_url(Arc::clone(&store), &settings.tone_api_base);
        Self {
            store,
            sync,
            transcriber,
            synthesizer,
            tone,
        }
    }
}

/// Transcribe an audio file, persist the record, count the event, and
/// opportunistically push it to the companion server.
pub async fn transcribe(
    services: &Services,
    audio_path: &Path,
    duration: Option<f64>,
    no_sync: bool,
) -> anyhow::Result<()> {
    let audio = std::fs::read(audio_path)
        .with_context(|| format!("could not read {}", audio_path.display()))?;
    let file_name = audio_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "audio.wav".into());

    let text = services.transcriber.transcribe(&audio, &file_name).await?;
    if text.is_empty() {
        bail!("transcription came back empty");
    }

    let duration = duration.unwrap_or_else(|| {
        // Clip length unknown: assume the reference speaking rate.
        parlance_core::record::count_words(&text) as f64 / ESTIMATE_SPEAKING_WPM * 60.0
    });
    let record = services.store.save_dictation(&text, duration)?;
    info!(record_id = %record.id, words = record.word_count, "dictation stored");
    println!("{text}");

    if !no_sync {
        match services.sync.sync_record(&record).await {
            SyncOutcome::Synced { remote_id } => println!("(synced as {remote_id})"),
            SyncOutcome::Disabled => {}
            SyncOutcome::Offline => println!("(not synced: server unreachable)"),
            SyncOutcome::Failed => println!("(not synced: upload failed)"),
            SyncOutcome::AlreadySynced => {}
        }
    }
    Ok(())
}

/// Read text aloud: analyze its tone for delivery directions (best-effort),
/// synthesize, and write the audio to a file.
pub async fn speak(
    services: &Services,
    settings: &AppSettings,
    text: Option<String>,
    selection: bool,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let text = match text {
        Some(text) => text,
        None if selection => {
            capture::get_selection().context("no text selected (or selection capture timed out)")?
        }
        None => bail!("pass the text to read, or --selection"),
    };

    let style = if settings.tone_analysis {
        match services.tone.analyze(&text).await {
            Ok(notes) => {
                info!(notes = %notes, "tone analysis");
                Some(notes)
            }
            Err(e) => {
                warn!(error = %e, "tone analysis unavailable, using neutral delivery");
                None
            }
        }
    } else {
        None
    };

    let audio = services
        .synthesizer
        .synthesize(&text, &settings.voice, style.as_deref())
        .await?;

    let out = out.unwrap_or_else(|| PathBuf::from("parlance-speech.mp3"));
    std::fs::write(&out, &audio)
        .with_context(|| format!("could not write {}", out.display()))?;
    println!("wrote {} bytes to {}", audio.len(), out.display());
    Ok(())
}

pub fn history(
    services: &Services,
    query: Option<String>,
    delete: Option<String>,
    clear: bool,
) -> anyhow::Result<()> {
    if clear {
        let removed = services.store.delete_all()?;
        println!("removed {removed} record(s)");
        return Ok(());
    }
    if let Some(id) = delete {
        if services.store.delete(&id)? {
            println!("deleted {id}");
        } else {
            println!("no record with id {id}");
        }
        return Ok(());
    }

    let records = services.store.list_all(query.as_deref())?;
    if records.is_empty() {
        println!("no records");
        return Ok(());
    }
    for record in &records {
        let marker = if record.is_synced { "synced" } else { "local" };
        println!(
            "{}  [{marker}]  {}  ({} words, {})",
            record.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
            record.id,
            record.word_count,
            format_duration(record.duration_seconds),
        );
        println!("    {}", record.text);
    }
    Ok(())
}

pub async fn stats(services: &Services, reset: bool, remote: bool) -> anyhow::Result<()> {
    if reset {
        services.store.reset_stats()?;
        println!("counters reset");
        return Ok(());
    }

    let stats = services.store.stats()?;
    println!("words:          {}", stats.total_words);
    println!("transcriptions: {}", stats.total_transcriptions);
    println!("spoken time:    {}", format_duration(stats.total_duration_seconds));
    println!("days active:    {}", stats.days_active(Utc::now()));
    println!(
        "time saved:     {}",
        format_duration(stats.estimated_time_saved_seconds())
    );

    if remote {
        match services.sync.fetch_stats().await {
            Some(remote_stats) => match remote_stats.words_ahead_of(&stats) {
                Some(ahead) => println!(
                    "server is {ahead} words ahead (another device has contributed)"
                ),
                None => println!("server is not ahead of this device"),
            },
            None => println!("server stats unavailable"),
        }
    }
    Ok(())
}

pub async fn sync(services: &Services, stats_only: bool) -> anyhow::Result<()> {
    if !services.sync.config().is_enabled() {
        println!("sync is disabled; set a server with `parlance config --server <host>`");
        return Ok(());
    }

    if !stats_only {
        let report = services.sync.sync_all_unsynced().await;
        println!(
            "synced {}/{} record(s) ({} failed, {} unreachable)",
            report.synced, report.attempted, report.failed, report.offline
        );
    }
    if services.sync.sync_stats().await {
        println!("usage stats pushed");
    } else {
        println!("usage stats not pushed");
    }
    Ok(())
}

pub async fn ping(services: &Services) -> anyhow::Result<()> {
    match services.sync.check_connectivity().await {
        None => println!("sync is disabled"),
        Some(true) => println!("server reachable"),
        Some(false) => println!("server unreachable"),
    }
    Ok(())
}

pub fn config(
    settings: &mut AppSettings,
    settings_path: &Path,
    server: Option<String>,
    device: Option<String>,
    voice: Option<String>,
) -> anyhow::Result<()> {
    let mut changed = false;
    if let Some(server) = server {
        settings.server_address = server;
        changed = true;
    }
    if let Some(device) = device {
        settings.device_tag = device;
        changed = true;
    }
    if let Some(voice) = voice {
        settings.voice = voice;
        changed = true;
    }
    if changed {
        settings.normalize();
        save_settings(settings_path, settings)?;
    }

    println!(
        "server:  {}",
        if settings.server_address.is_empty() {
            "(sync disabled)"
        } else {
            &settings.server_address
        }
    );
    println!("device:  {}", settings.device_tag);
    println!("voice:   {}", settings.voice);
    Ok(())
}

pub fn secret_set(services: &Services, name: &str, value: &str) -> anyhow::Result<()> {
    let name = resolve_secret_name(name);
    services.store.set_secret(name, value)?;
    println!("stored {name}");
    Ok(())
}

pub fn secret_delete(services: &Services, name: &str) -> anyhow::Result<()> {
    let name = resolve_secret_name(name);
    services.store.delete_secret(name)?;
    println!("removed {name}");
    Ok(())
}

/// Friendly aliases for the well-known secret names.
fn resolve_secret_name(name: &str) -> &str {
    match name.trim().to_ascii_lowercase().as_str() {
        "openai" => SECRET_OPENAI_API_KEY,
        "groq" | "tone" => SECRET_GROQ_API_KEY,
        _ => name,
    }
}

fn format_duration(seconds: f64) -> String {
    let total = seconds.round().max(0.0) as i64;
    if total < 60 {
        return format!("{total}s");
    }
    let minutes = total / 60;
    let rem = total % 60;
    if minutes < 60 {
        format!("{minutes}m {rem}s")
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}
