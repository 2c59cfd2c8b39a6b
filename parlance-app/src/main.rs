//! Parlance desktop host entry point.
//!
//! Every service (store, sync engine, providers) is constructed here and
//! handed to the command handlers. No ambient singletons, so tests build
//! fresh instances freely.

mod capture;
mod commands;
mod settings;

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use parlance_core::LocalStore;
use tracing::info;

use commands::Services;
use settings::{default_db_path, default_settings_path, load_settings};

#[derive(Parser)]
#[command(name = "parlance", version, about = "Personal dictation and read-aloud companion")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe an audio file and store the result as a dictation record.
    Transcribe {
        /// Path to the recorded audio clip.
        audio: PathBuf,
        /// Clip length in seconds; estimated from the word count if omitted.
        #[arg(long)]
        duration: Option<f64>,
        /// Skip the opportunistic upload after storing.
        #[arg(long)]
        no_sync: bool,
    },
    /// Read text aloud and write the audio to a file.
    Speak {
        /// Text to read; may be omitted when --selection is given.
        text: Option<String>,
        /// Read the currently selected text instead.
        #[arg(long)]
        selection: bool,
        /// Output audio path (default: parlance-speech.mp3).
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// List or delete stored dictation records.
    History {
        /// Case-insensitive substring filter.
        #[arg(long)]
        query: Option<String>,
        /// Delete one record by id.
        #[arg(long)]
        delete: Option<String>,
        /// Delete every record.
        #[arg(long)]
        clear: bool,
    },
    /// Show usage statistics.
    Stats {
        /// Zero all counters and restart the first-use clock.
        #[arg(long)]
        reset: bool,
        /// Also compare against the companion server's counters.
        #[arg(long)]
        remote: bool,
    },
    /// Push unsynced records and usage stats to the companion server.
    Sync {
        /// Push only the stats snapshot.
        #[arg(long)]
        stats_only: bool,
    },
    /// Check whether the companion server is reachable.
    Ping,
    /// Show or update configuration.
    Config {
        /// Companion server, host or host:port; empty string disables sync.
        #[arg(long)]
        server: Option<String>,
        /// Device tag reported in synced payloads.
        #[arg(long)]
        device: Option<String>,
        /// Synthesizer voice preset.
        #[arg(long)]
        voice: Option<String>,
    },
    /// Manage provider credentials.
    Secret {
        #[command(subcommand)]
        action: SecretAction,
    },
}

#[derive(Subcommand)]
enum SecretAction {
    /// Store a credential ("openai", "groq", or a raw name).
    Set { name: String, value: String },
    /// Remove a credential.
    Delete { name: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parlance=info".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    let settings_path = default_settings_path();
    let mut app_settings = load_settings(&settings_path);
    info!(
        settings_path = ?settings_path,
        device_tag = %app_settings.device_tag,
        sync_enabled = app_settings.sync_config().is_enabled(),
        "settings loaded"
    );

    let store = Arc::new(LocalStore::open(default_db_path())?);
    let services = Services::new(Arc::clone(&store), &app_settings);

    match cli.command {
        Command::Transcribe {
            audio,
            duration,
            no_sync,
        } => commands::transcribe(&services, &audio, duration, no_sync).await,
        Command::Speak {
            text,
            selection,
            out,
        } => commands::speak(&services, &app_settings, text, selection, out).await,
        Command::History {
            query,
            delete,
            clear,
        } => commands::history(&services, query, delete, clear),
        Command::Stats { reset, remote } => commands::stats(&services, reset, remote).await,
        Command::Sync { stats_only } => commands::sync(&services, stats_only).await,
        Command::Ping => commands::ping(&services).await,
        Command::Config {
            server,
            device,
            voice,
        } => commands::config(&mut app_settings, &settings_path, server, device, voice),
        Command::Secret { action } => match action {
            SecretAction::Set { name, value } => commands::secret_set(&services, &name, &value),
            SecretAction::Delete { name } => commands::secret_delete(&services, &name),
        },
    }
}
