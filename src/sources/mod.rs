//! # Sources Module
//!
//! Turns queue items into playable streams.
//!
//! - [`spotify`]: catalog metadata lookup (track links, autocomplete search)
//! - [`youtube`]: yt-dlp extraction of a direct audio stream URL
//!
//! [`SmartResolver`] glues both together: catalog links are looked up first
//! and converted into a `"<artists> <title>"` search; anything else is sent to
//! the extractor as-is (links) or as a top-result search (free text).

pub mod spotify;
pub mod youtube;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{audio::queue::QueueItem, error::ResolveError};
use spotify::LinkKind;
use youtube::SEARCH_PREFIX;

/// Metadatos de un track del catálogo externo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTrack {
    pub title: String,
    pub artists: Vec<String>,
    pub url: Option<String>,
}

impl CatalogTrack {
    pub fn artist_line(&self) -> String {
        self.artists.join(", ")
    }

    /// Texto de búsqueda derivado: `"<artists> <title>"`
    pub fn search_query(&self) -> String {
        format!("{} {}", self.artist_line(), self.title)
    }

    /// Etiqueta para mostrar: `"<artists> - <title>"`
    pub fn label(&self) -> String {
        format!("{} - {}", self.artist_line(), self.title)
    }
}

/// Resultado de la extracción: stream directo más el título de la plataforma.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedMedia {
    pub title: String,
    pub stream_url: String,
    pub page_url: Option<String>,
}

/// A track ready to be streamed. Lives for one playback attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub title: String,
    pub stream_url: String,
    pub catalog_url: Option<String>,
}

/// Consulta de metadatos en el catálogo (Spotify).
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    async fn track(&self, id: &str) -> Result<CatalogTrack, ResolveError>;

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<CatalogTrack>, ResolveError>;
}

/// Búsqueda/extracción del stream (yt-dlp).
#[async_trait]
pub trait StreamExtractor: Send + Sync {
    async fn extract(&self, target: &str) -> Result<ExtractedMedia, ResolveError>;
}

/// Turns a queue item into a [`ResolvedTrack`].
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, item: &QueueItem) -> Result<ResolvedTrack, ResolveError>;
}

pub struct SmartResolver {
    catalog: Option<Arc<dyn CatalogLookup>>,
    extractor: Arc<dyn StreamExtractor>,
}

impl SmartResolver {
    pub fn new(
        catalog: Option<Arc<dyn CatalogLookup>>,
        extractor: Arc<dyn StreamExtractor>,
    ) -> Self {
        Self { catalog, extractor }
    }

    pub fn catalog(&self) -> Option<&Arc<dyn CatalogLookup>> {
        self.catalog.as_ref()
    }

    /// Busca los metadatos de un enlace de track; `None` si no hay catálogo,
    /// el enlace no es de track o la consulta falla.
    pub async fn lookup_link(&self, link: &str) -> Option<CatalogTrack> {
        let catalog = self.catalog.as_ref()?;
        let parsed = spotify::parse_link(link)?;
        if parsed.kind != LinkKind::Track {
            info!("ℹ️ Enlace de catálogo sin track individual: {}", link);
            return None;
        }

        match catalog.track(&parsed.id).await {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("⚠️ Error obteniendo track de Spotify {}: {}", parsed.id, e);
                None
            }
        }
    }
}

/// Qué se le pasa al extractor para un elemento dado.
fn extraction_target(item: &QueueItem, catalog: Option<&CatalogTrack>) -> String {
    match (item, catalog) {
        (QueueItem::CatalogLink(_), Some(track)) => {
            format!("{SEARCH_PREFIX}{}", track.search_query())
        }
        (QueueItem::CatalogLink(link), None) => format!("{SEARCH_PREFIX}{link}"),
        (QueueItem::Search(text), _) if text.starts_with("http") => text.clone(),
        (QueueItem::Search(text), _) => format!("{SEARCH_PREFIX}{text}"),
    }
}

#[async_trait]
impl TrackResolver for SmartResolver {
    async fn resolve(&self, item: &QueueItem) -> Result<ResolvedTrack, ResolveError> {
        let catalog_track = match item {
            QueueItem::CatalogLink(link) => self.lookup_link(link).await,
            QueueItem::Search(_) => None,
        };

        let target = extraction_target(item, catalog_track.as_ref());
        let media = self.extractor.extract(&target).await?;

        let catalog_url = match item {
            QueueItem::CatalogLink(link) => Some(
                catalog_track
                    .and_then(|track| track.url)
                    .unwrap_or_else(|| link.clone()),
            ),
            QueueItem::Search(_) => None,
        };

        Ok(ResolvedTrack {
            title: media.title,
            stream_url: media.stream_url,
            catalog_url,
        })
    }
}
