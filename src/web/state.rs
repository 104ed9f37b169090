use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::{Arc, OnceLock};

use super::error::{ApiError, ApiResult};
use crate::{audio::session::VoiceSessions, hub::HubProvisioner};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuildSummary {
    #[serde(serialize_with = "id_as_string")]
    pub id: GuildId,
    pub name: String,
    pub member_count: u64,
}

pub(crate) fn id_as_string<S, T>(id: &T, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
    T: std::fmt::Display,
{
    serializer.collect_str(id)
}

/// Read-only view of the gateway connection (serenity cache in production).
///
/// Published once the bot is ready; until then the panel answers 503.
pub trait BotDirectory: Send + Sync {
    fn bot_name(&self) -> Option<String>;

    fn guilds(&self) -> Vec<GuildSummary>;

    fn guild(&self, guild_id: GuildId) -> Option<GuildSummary>;

    fn channel_name(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<String>;

    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;
}

/// Estado compartido de los handlers HTTP.
#[derive(Clone)]
pub struct AppState {
    pub bot: Arc<OnceLock<Arc<dyn BotDirectory>>>,
    pub sessions: Arc<VoiceSessions>,
    pub hub: Arc<HubProvisioner>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(sessions: Arc<VoiceSessions>, hub: Arc<HubProvisioner>) -> Self {
        Self {
            bot: Arc::new(OnceLock::new()),
            sessions,
            hub,
            started_at: Utc::now(),
        }
    }

    pub fn publish(&self, directory: Arc<dyn BotDirectory>) {
        if self.bot.set(directory).is_err() {
            tracing::warn!("Directorio del bot ya publicado");
        }
    }

    pub fn bot(&self) -> ApiResult<&Arc<dyn BotDirectory>> {
        self.bot.get().ok_or(ApiError::Unavailable)
    }
}
