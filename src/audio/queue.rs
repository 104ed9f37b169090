use serde::Serialize;
use std::{collections::VecDeque, fmt};
use tracing::info;

use crate::sources::spotify;

/// Una petición de música todavía sin resolver.
///
/// Se guarda tal cual la escribió el usuario (o el enlace de catálogo que
/// contenía) y solo se resuelve cuando le toca sonar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueItem {
    Search(String),
    CatalogLink(String),
}

impl QueueItem {
    /// Clasifica el texto de un comando `play`.
    ///
    /// Si el texto contiene un enlace de catálogo se guarda solo el enlace.
    pub fn from_query(query: &str) -> Self {
        let query = query.trim();
        match spotify::extract_link(query) {
            Some(link) => Self::CatalogLink(link),
            None => Self::Search(query.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Search(text) | Self::CatalogLink(text) => text,
        }
    }
}

impl fmt::Display for QueueItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for QueueItem {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Cola FIFO estricta de un servidor: sin prioridades, sin deduplicación.
#[derive(Debug, Default)]
pub struct MusicQueue {
    items: VecDeque<QueueItem>,
}

impl MusicQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Agrega al final y devuelve la posición (1 = siguiente en sonar).
    pub fn push(&mut self, item: QueueItem) -> usize {
        info!("➕ Agregado a la cola: {}", item);
        self.items.push_back(item);
        self.items.len()
    }

    /// Obtiene el siguiente elemento (FIFO - First In, First Out)
    pub fn pop(&mut self) -> Option<QueueItem> {
        let next = self.items.pop_front();
        match &next {
            Some(item) => info!("➡️ Siguiente en cola: {}", item),
            None => info!("📭 Cola vacía, no hay siguiente track"),
        }
        next
    }

    pub fn clear(&mut self) {
        if !self.items.is_empty() {
            info!("🗑️ Cola limpiada ({} elementos)", self.items.len());
        }
        self.items.clear();
    }

    /// Primeros `limit` elementos, en orden de reproducción.
    pub fn peek(&self, limit: usize) -> Vec<QueueItem> {
        self.items.iter().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
