use parking_lot::RwLock;
use serenity::model::id::ChannelId;
use tracing::{debug, info};

/// Marca que antecede a los mensajes repetidos en el mismo canal
pub const ECHO_PREFIX: &str = "🔄 ";

/// Canal de origen y destino del relay. Sin origen, el relay está apagado.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayRoute {
    pub source: Option<ChannelId>,
    /// `None` repite en el mismo canal de origen.
    pub target: Option<ChannelId>,
}

/// The parts of an incoming chat message the relay cares about.
#[derive(Debug, Clone)]
pub struct IncomingMessage<'a> {
    pub channel_id: ChannelId,
    pub author_name: &'a str,
    pub author_is_bot: bool,
    pub content: &'a str,
    pub attachment_urls: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Forward {
    pub channel_id: ChannelId,
    pub content: String,
}

pub struct MessageRelay {
    route: RwLock<RelayRoute>,
}

impl MessageRelay {
    pub fn new(route: RelayRoute) -> Self {
        Self {
            route: RwLock::new(route),
        }
    }

    pub fn route(&self) -> RelayRoute {
        *self.route.read()
    }

    /// Cambia la ruta en caliente (solo para la sesión actual).
    pub fn configure(&self, source: ChannelId, target: Option<ChannelId>) {
        *self.route.write() = RelayRoute {
            source: Some(source),
            target,
        };
        info!("🔁 Relay configurado: {} -> {:?}", source, target);
    }

    /// Decide si un mensaje debe repetirse y cómo.
    pub fn forward_for(&self, message: &IncomingMessage<'_>) -> Option<Forward> {
        if message.author_is_bot {
            return None;
        }

        let route = self.route();
        if route.source != Some(message.channel_id) {
            return None;
        }

        let forward = match route.target {
            Some(target) => {
                let mut content = format!("**{}**: {}", message.author_name, message.content);
                for url in &message.attachment_urls {
                    content.push('\n');
                    content.push_str(url);
                }
                Forward {
                    channel_id: target,
                    content,
                }
            }
            None if message.content.is_empty() => return None,
            None => Forward {
                channel_id: message.channel_id,
                content: format!("{ECHO_PREFIX}{}", message.content),
            },
        };

        debug!("Relay de mensaje de {} a {}", message.author_name, forward.channel_id);
        Some(forward)
    }
}
