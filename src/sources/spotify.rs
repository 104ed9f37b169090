use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;
use std::{
    sync::LazyLock,
    time::{Duration, Instant},
};
use tracing::{debug, info};
use url::Url;

use super::{CatalogLookup, CatalogTrack};
use crate::error::ResolveError;

const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const API_BASE: &str = "https://api.spotify.com/v1";

/// Margen para renovar el token antes de que expire
const TOKEN_SLACK: Duration = Duration::from_secs(60);

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://(?:open\.)?spotify\.com/(?:track|album|playlist)/[a-zA-Z0-9]+")
        .expect("valid catalog link pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkKind {
    Track,
    Album,
    Playlist,
}

/// Enlace de catálogo ya descompuesto en tipo e id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogLink {
    pub kind: LinkKind,
    pub id: String,
}

/// Busca el primer enlace de catálogo dentro de un texto libre.
pub fn extract_link(text: &str) -> Option<String> {
    LINK_PATTERN.find(text).map(|m| m.as_str().to_string())
}

pub fn is_catalog_link(text: &str) -> bool {
    LINK_PATTERN.is_match(text)
}

pub fn parse_link(link: &str) -> Option<CatalogLink> {
    let url = Url::parse(link).ok()?;
    let host = url.host_str()?;
    if host != "open.spotify.com" && host != "spotify.com" {
        return None;
    }

    let mut segments = url.path_segments()?;
    let kind = match segments.next()? {
        "track" => LinkKind::Track,
        "album" => LinkKind::Album,
        "playlist" => LinkKind::Playlist,
        _ => return None,
    };
    let id = segments.next().filter(|id| !id.is_empty())?;

    Some(CatalogLink {
        kind,
        id: id.to_string(),
    })
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct SpotifyTrack {
    name: String,
    artists: Vec<SpotifyArtist>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: SearchTracks,
}

#[derive(Debug, Deserialize)]
struct SearchTracks {
    items: Vec<SpotifyTrack>,
}

impl From<SpotifyTrack> for CatalogTrack {
    fn from(track: SpotifyTrack) -> Self {
        Self {
            title: track.name,
            artists: track.artists.into_iter().map(|a| a.name).collect(),
            url: track.external_urls.spotify,
        }
    }
}

struct CachedToken {
    value: String,
    expires_at: Instant,
}

/// Cliente de la Web API de Spotify (flujo client-credentials).
pub struct SpotifyClient {
    http: reqwest::Client,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl SpotifyClient {
    pub fn new(client_id: String, client_secret: String) -> Result<Self, ResolveError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        info!("✅ Spotify API configurada");
        Ok(Self {
            http,
            client_id,
            client_secret,
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, ResolveError> {
        let cached = self
            .token
            .lock()
            .as_ref()
            .filter(|token| token.expires_at > Instant::now())
            .map(|token| token.value.clone());
        if let Some(token) = cached {
            return Ok(token);
        }

        debug!("🔑 Solicitando token de Spotify");
        let response: TokenResponse = self
            .http
            .post(TOKEN_URL)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .header(
                reqwest::header::CONTENT_TYPE,
                "application/x-www-form-urlencoded",
            )
            .body("grant_type=client_credentials")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let lifetime = Duration::from_secs(response.expires_in).saturating_sub(TOKEN_SLACK);
        *self.token.lock() = Some(CachedToken {
            value: response.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(response.access_token)
    }
}

#[async_trait]
impl CatalogLookup for SpotifyClient {
    async fn track(&self, id: &str) -> Result<CatalogTrack, ResolveError> {
        let token = self.access_token().await?;
        let track: SpotifyTrack = self
            .http
            .get(format!("{API_BASE}/tracks/{id}"))
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(track.into())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, ResolveError> {
        let token = self.access_token().await?;
        let url = Url::parse_with_params(
            &format!("{API_BASE}/search"),
            &[
                ("q", query),
                ("type", "track"),
                ("limit", &limit.to_string()),
            ],
        )
        .map_err(|e| ResolveError::Catalog(e.to_string()))?;

        let results: SearchResponse = self
            .http
            .get(url)
            .bearer_auth(token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(results.tracks.items.into_iter().map(CatalogTrack::from).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_track_album_and_playlist_links() {
        assert_eq!(
            parse_link("https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC?si=x"),
            Some(CatalogLink {
                kind: LinkKind::Track,
                id: "4uLU6hMCjMI75M1A2tKUQC".into()
            })
        );
        assert_eq!(
            parse_link("https://open.spotify.com/album/1DFixLWuPkv3KT3TnV35m3").map(|l| l.kind),
            Some(LinkKind::Album)
        );
        assert_eq!(
            parse_link("https://open.spotify.com/playlist/37i9dQZF1DXcBWIGoYBM5M").map(|l| l.kind),
            Some(LinkKind::Playlist)
        );
    }

    #[test]
    fn rejects_foreign_and_unknown_links() {
        assert_eq!(parse_link("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), None);
        assert_eq!(parse_link("https://open.spotify.com/artist/0OdUWJ0sBjDrqHygGUXeCF"), None);
        assert_eq!(parse_link("not a url"), None);
    }

    #[test]
    fn extracts_link_from_surrounding_text() {
        assert!(is_catalog_link("play https://open.spotify.com/track/abc123 now"));
        assert_eq!(
            extract_link("play http://spotify.com/album/XYZ789 now").as_deref(),
            Some("http://spotify.com/album/XYZ789")
        );
        assert_eq!(extract_link("just some words"), None);
    }
}
