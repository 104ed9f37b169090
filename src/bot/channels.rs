//! Serenity-backed implementations of the channel and directory seams.

use async_trait::async_trait;
use serenity::{
    all::{Cache, ChannelType, Http, PremiumTier},
    builder::CreateChannel,
    model::id::{ChannelId, GuildId, UserId},
    prelude::Context,
};
use std::sync::Arc;

use crate::{
    error::ChannelOpError,
    hub::{ChannelOps, NewVoiceChannel},
    web::{BotDirectory, GuildSummary},
};

/// Feature que da a un servidor el bitrate de nivel 1 sin boosts
const VIP_FEATURE: &str = "VIP_REGIONS";

/// Bitrate máximo de voz según el nivel de boost del servidor.
pub fn bitrate_ceiling(tier: PremiumTier, vip: bool) -> u32 {
    let by_tier = match tier {
        PremiumTier::Tier1 => 128_000,
        PremiumTier::Tier2 => 256_000,
        PremiumTier::Tier3 => 384_000,
        _ => 96_000,
    };
    if vip {
        by_tier.max(128_000)
    } else {
        by_tier
    }
}

/// Miembros humanos presentes en un canal de voz según la caché.
fn count_non_bot_members(cache: &Cache, guild_id: GuildId, channel_id: ChannelId) -> usize {
    let Some(guild) = cache.guild(guild_id) else {
        return 0;
    };

    guild
        .voice_states
        .values()
        .filter(|state| state.channel_id == Some(channel_id))
        .filter(|state| {
            let is_bot = guild
                .members
                .get(&state.user_id)
                .or(state.member.as_ref())
                .map(|member| member.user.bot)
                .unwrap_or(false);
            !is_bot
        })
        .count()
}

fn channel_error(err: serenity::Error) -> ChannelOpError {
    let forbidden = matches!(
        &err,
        serenity::Error::Http(http) if http.status_code().map(|s| s.as_u16()) == Some(403)
    );
    if forbidden {
        ChannelOpError::Forbidden(err.to_string())
    } else {
        ChannelOpError::Failed(err.to_string())
    }
}

/// Operaciones de canales sobre la API de Discord.
pub struct SerenityChannels {
    http: Arc<Http>,
    cache: Arc<Cache>,
}

impl SerenityChannels {
    pub fn new(ctx: &Context) -> Self {
        Self {
            http: Arc::clone(&ctx.http),
            cache: Arc::clone(&ctx.cache),
        }
    }
}

#[async_trait]
impl ChannelOps for SerenityChannels {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        channel: NewVoiceChannel,
    ) -> Result<ChannelId, ChannelOpError> {
        let mut builder = CreateChannel::new(channel.name)
            .kind(ChannelType::Voice)
            .bitrate(channel.bitrate)
            .user_limit(0);
        if let Some(category) = channel.category {
            builder = builder.category(category);
        }

        guild_id
            .create_channel(&self.http, builder)
            .await
            .map(|created| created.id)
            .map_err(channel_error)
    }

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<(), ChannelOpError> {
        guild_id
            .move_member(&self.http, user_id, channel_id)
            .await
            .map(|_| ())
            .map_err(channel_error)
    }

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<(), ChannelOpError> {
        channel_id
            .delete(&self.http)
            .await
            .map(|_| ())
            .map_err(channel_error)
    }

    fn non_bot_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        count_non_bot_members(&self.cache, guild_id, channel_id)
    }

    fn bitrate_ceiling(&self, guild_id: GuildId) -> u32 {
        self.cache
            .guild(guild_id)
            .map(|guild| {
                let vip = guild.features.iter().any(|f| f == VIP_FEATURE);
                bitrate_ceiling(guild.premium_tier, vip)
            })
            .unwrap_or_else(|| bitrate_ceiling(PremiumTier::Tier0, false))
    }

    fn category_of(&self, channel_id: ChannelId) -> Option<ChannelId> {
        self.cache.channel(channel_id).and_then(|channel| channel.parent_id)
    }
}

/// Vista de la caché de serenity para el panel web.
pub struct SerenityDirectory {
    cache: Arc<Cache>,
}

impl SerenityDirectory {
    pub fn new(cache: Arc<Cache>) -> Self {
        Self { cache }
    }
}

impl BotDirectory for SerenityDirectory {
    fn bot_name(&self) -> Option<String> {
        Some(self.cache.current_user().name.clone())
    }

    fn guilds(&self) -> Vec<GuildSummary> {
        let mut guilds: Vec<GuildSummary> = self
            .cache
            .guilds()
            .into_iter()
            .filter_map(|guild_id| self.guild(guild_id))
            .collect();
        guilds.sort_by_key(|guild| guild.id);
        guilds
    }

    fn guild(&self, guild_id: GuildId) -> Option<GuildSummary> {
        self.cache.guild(guild_id).map(|guild| GuildSummary {
            id: guild_id,
            name: guild.name.clone(),
            member_count: guild.member_count,
        })
    }

    fn channel_name(&self, guild_id: GuildId, channel_id: ChannelId) -> Option<String> {
        self.cache
            .guild(guild_id)
            .and_then(|guild| guild.channels.get(&channel_id).map(|c| c.name.clone()))
    }

    fn non_bot_members(&self, guild_id: GuildId, channel_id: ChannelId) -> usize {
        count_non_bot_members(&self.cache, guild_id, channel_id)
    }
}
