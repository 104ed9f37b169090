//! # Bot Module
//!
//! Discord event handling for Relay Tune.
//!
//! - Slash commands and `/play` autocomplete ([`handlers`])
//! - Message relay from the configured source channel
//! - Voice state tracking: the bot's own session and hub channel provisioning
//! - The playback driver loop that advances queues when streams end ([`events`])
//!
//! [`RelayTuneBot`] implements Serenity's [`EventHandler`]; all state it
//! touches is shared with the web panel through `Arc`s.

use anyhow::Result;
use serenity::{
    all::{Context, EventHandler, GuildChannel, GuildId, Interaction, Message, Ready, VoiceState},
    async_trait,
    gateway::ShardManager,
    prelude::TypeMapKey,
};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub mod channels;
pub mod commands;
pub mod events;
pub mod handlers;

use crate::{
    audio::session::VoiceSessions,
    config::Config,
    hub::{HubProvisioner, VoiceTransition},
    relay::{IncomingMessage, MessageRelay},
    sources::SmartResolver,
    web::AppState,
};
use channels::{SerenityChannels, SerenityDirectory};

/// Shard manager del cliente, para leer la latencia del gateway en `/ping`.
pub struct ShardManagerContainer;

impl TypeMapKey for ShardManagerContainer {
    type Value = Arc<ShardManager>;
}

/// Main Discord event handler.
pub struct RelayTuneBot {
    config: Arc<Config>,
    sessions: Arc<VoiceSessions>,
    hub: Arc<HubProvisioner>,
    relay: MessageRelay,
    /// Usado por el autocompletado de `/play`
    resolver: Arc<SmartResolver>,
    /// Panel web al que se publica la caché cuando el bot está listo
    panel: Option<AppState>,
}

impl RelayTuneBot {
    pub fn new(
        config: Arc<Config>,
        sessions: Arc<VoiceSessions>,
        hub: Arc<HubProvisioner>,
        relay: MessageRelay,
        resolver: Arc<SmartResolver>,
        panel: Option<AppState>,
    ) -> Self {
        Self {
            config,
            sessions,
            hub,
            relay,
            resolver,
            panel,
        }
    }

    /// Registers slash commands with Discord.
    ///
    /// Per guild when `GUILD_ID` is set (instant propagation), globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                // Verificar que el bot esté en la guild
                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                }

                commands::register_guild_commands(ctx, guild_id)
                    .await
                    .map_err(|e| {
                        error!("❌ Error registrando comandos de guild: {:?}", e);
                        anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                    })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Cambios de voz del propio bot: desconexión o movimiento externo.
    fn own_voice_update(&self, guild_id: GuildId, new: &VoiceState) {
        match new.channel_id {
            None => self.sessions.forget(guild_id),
            Some(channel_id) => self.sessions.moved(guild_id, channel_id),
        }
    }
}

#[async_trait]
impl EventHandler for RelayTuneBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Some(panel) = &self.panel {
            panel.publish(Arc::new(SerenityDirectory::new(Arc::clone(&ctx.cache))));
        }

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Autocomplete(autocomplete) => {
                if let Err(e) = handlers::handle_autocomplete(&ctx, autocomplete, self).await {
                    error!("Error manejando autocompletado: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn message(&self, ctx: Context, msg: Message) {
        let incoming = IncomingMessage {
            channel_id: msg.channel_id,
            author_name: msg.author.display_name(),
            author_is_bot: msg.author.bot,
            content: &msg.content,
            attachment_urls: msg.attachments.iter().map(|a| a.url.as_str()).collect(),
        };

        let Some(forward) = self.relay.forward_for(&incoming) else {
            return;
        };

        if let Err(e) = forward.channel_id.say(&ctx.http, forward.content).await {
            error!(
                "❌ Error reenviando mensaje de {} a {}: {:?}",
                msg.channel_id, forward.channel_id, e
            );
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let Some(guild_id) = new.guild_id else {
            return;
        };

        if new.user_id == ctx.cache.current_user().id {
            self.own_voice_update(guild_id, &new);
            return;
        }

        let (display_name, is_bot) = match &new.member {
            Some(member) => (member.display_name().to_string(), member.user.bot),
            None => {
                debug!("Voice state sin miembro para {}", new.user_id);
                (new.user_id.to_string(), false)
            }
        };

        let transition = VoiceTransition {
            guild_id,
            user_id: new.user_id,
            display_name,
            is_bot,
            from: old.and_then(|state| state.channel_id),
            to: new.channel_id,
        };

        let ops = SerenityChannels::new(&ctx);
        let outcome = self.hub.handle_transition(&ops, &transition).await;
        if outcome.created.is_some() || outcome.deleted.is_some() {
            debug!("Transición de voz en guild {}: {:?}", guild_id, outcome);
        }
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        self.hub.channel_deleted(channel.guild_id, channel.id);
    }
}
