//! Persistent application settings (JSON file in app data directory).

use std::fs;
use std::path::{Path, PathBuf};

use parlance_core::SyncConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct AppSettings {
    /// Companion server, `host` or `host:port`. Empty disables sync.
    pub server_address: String,
    /// How this client identifies itself in synced payloads.
    pub device_tag: String,
    /// Voice preset passed to the synthesizer.
    pub voice: String,
    /// Derive delivery directions before reading text aloud.
    pub tone_analysis: bool,
    /// Base URL for the transcription/synthesis provider.
    pub provider_api_base: String,
    /// Base URL for the tone-analysis provider.
    pub tone_api_base: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            server_address: String::new(),
            device_tag: "desktop".into(),
            voice: "alloy".into(),
            tone_analysis: true,
            provider_api_base: "https://api.openai.com".into(),
            tone_api_base: "https://api.groq.com/openai".into(),
        }
    }
}

impl AppSettings {
    pub fn normalize(&mut self) {
        self.server_address = self.server_address.trim().to_string();
        self.device_tag = normalize_tag(&self.device_tag);
        self.voice = {
            let v = self.voice.trim();
            if v.is_empty() { "alloy".into() } else { v.to_string() }
        };
        self.provider_api_base = normalize_base(&self.provider_api_base, "https://api.openai.com");
        self.tone_api_base = normalize_base(&self.tone_api_base, "https://api.groq.com/openai");
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            server_address: self.server_address.clone(),
            device_tag: self.device_tag.clone(),
        }
    }
}

fn normalize_tag(raw: &str) -> String {
    let tag = raw.trim();
    if tag.is_empty() {
        "desktop".into()
    } else {
        tag.to_string()
    }
}

fn normalize_base(raw: &str, fallback: &str) -> String {
    let base = raw.trim().trim_end_matches('/');
    if base.is_empty() {
        fallback.into()
    } else {
        base.to_string()
    }
}

pub fn default_settings_path() -> PathBuf {
    data_dir().join("settings.json")
}

pub fn default_db_path() -> PathBuf {
    data_dir().join("parlance.db")
}

fn data_dir() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("Lattice Labs")
            .join("Parlance")
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var_os("XDG_DATA_HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                std::env::var_os("HOME")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("/tmp"))
                    .join(".local")
                    .join("share")
            })
            .join("parlance")
    }
}

pub fn load_settings(path: &Path) -> AppSettings {
    let mut settings = fs::read_to_string(path)
        .ok()
        .and_then(|raw| serde_json::from_str::<AppSettings>(&raw).ok())
        .unwrap_or_default();
    settings.normalize();
    settings
}

pub fn save_settings(path: &Path, settings: &AppSettings) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(settings).map_err(std::io::Error::other)?;
    fs::write(path, json)
}
