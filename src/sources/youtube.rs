use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::{sync::Semaphore, time::timeout};
use tracing::{debug, info, warn};

use super::{ExtractedMedia, StreamExtractor};
use crate::error::ResolveError;

/// Prefijo de yt-dlp: "busca en YouTube y quédate con el primer resultado"
pub const SEARCH_PREFIX: &str = "ytsearch1:";

const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

/// Información extraída de yt-dlp (`--dump-json`)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    url: Option<String>,
    webpage_url: Option<String>,
}

/// Cliente de extracción basado en el binario yt-dlp.
///
/// Nunca descarga a disco: solo pide la URL directa del mejor audio.
pub struct YouTubeClient {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    permits: Semaphore,
}

impl YouTubeClient {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            permits: Semaphore::new(3),
        }
    }

    /// Verifica que yt-dlp esté disponible
    pub async fn verify(&self) -> Result<String, ResolveError> {
        let output = Command::new(&self.binary).arg("--version").output().await?;
        if !output.status.success() {
            return Err(ResolveError::Extraction(format!(
                "{} --version exited with {}",
                self.binary, output.status
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn is_youtube_url(url: &str) -> bool {
        url.contains("youtube.com/") || url.contains("youtu.be/")
    }
}

/// Convierte la salida de `--dump-json` (una línea JSON por resultado) en media.
fn parse_dump(stdout: &str, target: &str) -> Result<ExtractedMedia, ResolveError> {
    let line = stdout
        .lines()
        .find(|line| line.trim_start().starts_with('{'))
        .ok_or_else(|| ResolveError::NoResults(target.to_string()))?;

    let info: YtDlpInfo = serde_json::from_str(line)?;
    let stream_url = info
        .url
        .ok_or_else(|| ResolveError::Extraction(format!("no stream url for `{target}`")))?;

    Ok(ExtractedMedia {
        title: info.title.unwrap_or_else(|| "Unknown".to_string()),
        stream_url,
        page_url: info.webpage_url,
    })
}

#[async_trait]
impl StreamExtractor for YouTubeClient {
    async fn extract(&self, target: &str) -> Result<ExtractedMedia, ResolveError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| ResolveError::Extraction(e.to_string()))?;

        if Self::is_youtube_url(target) {
            debug!("🔗 URL directa de YouTube: {}", target);
        }
        info!("🔍 Extrayendo con yt-dlp: {}", target);

        let child = Command::new(&self.binary)
            .args([
                "-f",
                "bestaudio/best",
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "--",
                target,
            ])
            .output();

        let output = timeout(EXTRACT_TIMEOUT, child)
            .await
            .map_err(|_| ResolveError::Extraction(format!("yt-dlp timed out for `{target}`")))??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("❌ yt-dlp falló: {}", stderr.trim());
            return Err(ResolveError::Extraction(stderr.trim().to_string()));
        }

        parse_dump(&String::from_utf8_lossy(&output.stdout), target)
    }
}
