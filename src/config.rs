use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Relay
    pub source_channel_id: Option<u64>,
    pub target_channel_id: Option<u64>,

    // Spotify (opcional)
    pub spotify_client_id: Option<String>,
    pub spotify_client_secret: Option<String>,

    // Panel web
    pub web_panel_enabled: bool,
    pub web_panel_host: String,
    pub web_panel_port: u16,

    // Paths
    pub data_dir: PathBuf,
    pub voice_channels_file: String,

    // Audio
    pub default_volume: f32,
    pub ytdlp_path: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una fuente de variables.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let config = Self {
            discord_token: var("DISCORD_TOKEN").context("DISCORD_TOKEN no está configurado")?,
            guild_id: var("GUILD_ID")
                .and_then(|s| s.parse().ok())
                .filter(|id| *id != 0),

            source_channel_id: parse_channel(var("SOURCE_CHANNEL_ID"), "SOURCE_CHANNEL_ID")?,
            target_channel_id: parse_channel(var("TARGET_CHANNEL_ID"), "TARGET_CHANNEL_ID")?,

            spotify_client_id: var("SPOTIFY_CLIENT_ID"),
            spotify_client_secret: var("SPOTIFY_CLIENT_SECRET"),

            web_panel_enabled: var("WEB_PANEL_ENABLED")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.web_panel_enabled),
            web_panel_host: var("WEB_PANEL_HOST").unwrap_or(defaults.web_panel_host),
            web_panel_port: match var("WEB_PANEL_PORT") {
                Some(port) => port.parse().context("WEB_PANEL_PORT inválido")?,
                None => defaults.web_panel_port,
            },

            data_dir: var("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            voice_channels_file: var("VOICE_CHANNELS_FILE").unwrap_or(defaults.voice_channels_file),

            default_volume: match var("DEFAULT_VOLUME") {
                Some(volume) => volume.parse().context("DEFAULT_VOLUME inválido")?,
                None => defaults.default_volume,
            },
            ytdlp_path: var("YTDLP_PATH").unwrap_or(defaults.ytdlp_path),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Volume must be between 0.0 and 1.0
    /// - Web panel port must not be 0
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 1.0, got: {}", self.default_volume);
        }

        if self.web_panel_port == 0 {
            anyhow::bail!("Web panel port must be greater than 0");
        }

        Ok(())
    }

    /// Credenciales de Spotify, solo si ambas están presentes.
    pub fn spotify_credentials(&self) -> Option<(String, String)> {
        match (&self.spotify_client_id, &self.spotify_client_secret) {
            (Some(id), Some(secret)) => Some((id.clone(), secret.clone())),
            _ => None,
        }
    }

    pub fn hub_config_path(&self) -> PathBuf {
        self.data_dir.join(&self.voice_channels_file)
    }

    pub fn web_panel_addr(&self) -> String {
        format!("{}:{}", self.web_panel_host, self.web_panel_port)
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token and the Spotify secret.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: commands {}\n  \
            Relay: source {} -> target {}\n  \
            Spotify: {}\n  \
            Web panel: {}\n  \
            Audio: {}% vol, extractor {}\n  \
            Hub config: {}",
            self.guild_id.map_or("global".to_string(), |id| format!("guild {id}")),
            self.source_channel_id.map_or("off".to_string(), |id| id.to_string()),
            self.target_channel_id.map_or("same channel".to_string(), |id| id.to_string()),
            if self.spotify_credentials().is_some() { "enabled" } else { "disabled" },
            if self.web_panel_enabled { self.web_panel_addr() } else { "disabled".to_string() },
            (self.default_volume * 100.0).round() as u32,
            self.ytdlp_path,
            self.hub_config_path().display(),
        )
    }
}

/// `0` o vacío significa "sin canal".
fn parse_channel(value: Option<String>, key: &str) -> Result<Option<u64>> {
    match value {
        Some(raw) => {
            let id: u64 = raw.parse().with_context(|| format!("{key} inválido: {raw}"))?;
            Ok((id != 0).then_some(id))
        }
        None => Ok(None),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "on")
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            guild_id: None,

            source_channel_id: None,
            target_channel_id: None,

            spotify_client_id: None,
            spotify_client_secret: None,

            web_panel_enabled: false,
            web_panel_host: "0.0.0.0".to_string(),
            web_panel_port: 5000,

            data_dir: ".".into(),
            voice_channels_file: "voice_channels.json".to_string(),

            default_volume: 0.5,
            ytdlp_path: "yt-dlp".to_string(),
        }
    }
}
