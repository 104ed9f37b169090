use anyhow::Result;
use serenity::{
    builder::{
        CreateAutocompleteResponse, CreateEmbed, CreateInteractionResponse,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::CommandInteraction,
        channel::ChannelType,
        id::{ChannelId, GuildId, UserId},
    },
    prelude::Context,
};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::{
    audio::{
        player::{Enqueued, PlayFailure},
        queue::QueueItem,
    },
    bot::{events, RelayTuneBot, ShardManagerContainer},
    error::PlayerError,
    sources::{spotify, CatalogTrack},
    ui::embeds,
};

/// Sugerencias máximas que acepta Discord
const MAX_CHOICES: usize = 25;
/// Largo máximo de la etiqueta de una sugerencia
const MAX_CHOICE_LABEL: usize = 100;
/// Caracteres mínimos antes de buscar sugerencias
const MIN_AUTOCOMPLETE_INPUT: usize = 2;

/// Maneja comandos slash
pub async fn handle_command(
    ctx: &Context,
    command: CommandInteraction,
    bot: &RelayTuneBot,
) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| anyhow::anyhow!("Comando usado fuera de un servidor"))?;

    info!(
        "📝 Comando /{} usado por {} en guild {}",
        command.data.name, command.user.name, guild_id
    );

    match command.data.name.as_str() {
        "ping" => handle_ping(ctx, &command).await?,
        "help" => reply_embed(ctx, &command, embeds::create_help_embed(), true).await?,
        "setup" => handle_setup(ctx, &command, bot).await?,
        "join" => handle_join(ctx, &command, guild_id, bot).await?,
        "leave" => handle_leave(ctx, &command, guild_id, bot).await?,
        "play" => handle_play(ctx, &command, guild_id, bot).await?,
        "pause" => handle_pause(ctx, &command, guild_id, bot).await?,
        "resume" => handle_resume(ctx, &command, guild_id, bot).await?,
        "stop" => handle_stop(ctx, &command, guild_id, bot).await?,
        "skip" => handle_skip(ctx, &command, guild_id, bot).await?,
        "volume" => handle_volume(ctx, &command, guild_id, bot).await?,
        "queue" => handle_queue(ctx, &command, guild_id, bot).await?,
        "setvoicechannel" => handle_set_voice_channel(ctx, &command, guild_id, bot).await?,
        "removevoicechannel" => handle_remove_voice_channel(ctx, &command, guild_id, bot).await?,
        _ => reply(ctx, &command, "❌ Comando no reconocido", true).await?,
    }

    Ok(())
}

/// Sugerencias de Spotify para la opción `query` de `/play`
pub async fn handle_autocomplete(
    ctx: &Context,
    interaction: CommandInteraction,
    bot: &RelayTuneBot,
) -> Result<()> {
    let input = interaction
        .data
        .autocomplete()
        .map(|focused| focused.value.to_string())
        .unwrap_or_default();

    let mut response = CreateAutocompleteResponse::new();
    if wants_suggestions(&input) {
        if let Some(catalog) = bot.resolver.catalog() {
            match catalog.search(&input, MAX_CHOICES).await {
                Ok(tracks) => {
                    for (label, url) in autocomplete_choices(tracks) {
                        response = response.add_string_choice(label, url);
                    }
                }
                Err(e) => warn!("⚠️ Error en autocompletado de Spotify: {}", e),
            }
        }
    }

    interaction
        .create_response(&ctx.http, CreateInteractionResponse::Autocomplete(response))
        .await?;

    Ok(())
}

fn wants_suggestions(input: &str) -> bool {
    input.chars().count() >= MIN_AUTOCOMPLETE_INPUT && !spotify::is_catalog_link(input)
}

/// Pares (etiqueta, enlace) para el autocompletado; los tracks sin enlace se omiten.
fn autocomplete_choices(tracks: Vec<CatalogTrack>) -> Vec<(String, String)> {
    tracks
        .into_iter()
        .filter_map(|track| {
            let label: String = track.label().chars().take(MAX_CHOICE_LABEL).collect();
            track.url.map(|url| (label, url))
        })
        .take(MAX_CHOICES)
        .collect()
}

// Handlers específicos para cada comando

async fn handle_ping(ctx: &Context, command: &CommandInteraction) -> Result<()> {
    let started = Instant::now();
    reply(ctx, command, "🏓 Pong!", false).await?;
    let round_trip = started.elapsed();

    let gateway = gateway_latency(ctx).await;
    command
        .edit_response(
            &ctx.http,
            EditInteractionResponse::new().content(pong_message(gateway, round_trip)),
        )
        .await?;

    Ok(())
}

/// Latencia del heartbeat del shard que atendió la interacción.
async fn gateway_latency(ctx: &Context) -> Option<Duration> {
    let manager = ctx.data.read().await.get::<ShardManagerContainer>().cloned()?;
    let runners = manager.runners.lock().await;
    runners.get(&ctx.shard_id).and_then(|runner| runner.latency)
}

/// El shard no tiene latencia hasta el primer heartbeat confirmado.
fn pong_message(gateway: Option<Duration>, round_trip: Duration) -> String {
    match gateway {
        Some(latency) => format!("🏓 Pong! Latencia del gateway: {}ms", latency.as_millis()),
        None => format!(
            "🏓 Pong! Latencia del gateway aún no disponible (ida y vuelta HTTP: {}ms)",
            round_trip.as_millis()
        ),
    }
}

async fn handle_setup(ctx: &Context, command: &CommandInteraction, bot: &RelayTuneBot) -> Result<()> {
    let Some(source) = channel_option(command, "source") else {
        return reply(ctx, command, "❌ Uso: `/setup <origen> [destino]`", true).await;
    };
    let target = channel_option(command, "target");

    bot.relay.configure(source, target);

    let destination = match target {
        Some(target) => format!("<#{}>", target),
        None => "el mismo canal".to_string(),
    };
    let embed = embeds::create_success_embed(
        "Reenvío Configurado",
        &format!("**Origen:** <#{}>\n**Destino:** {}", source, destination),
    );
    reply_embed(ctx, command, embed, false).await
}

async fn handle_join(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    let Some(channel_id) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return reply(ctx, command, "❌ Debes estar en un canal de voz", true).await;
    };

    match bot.sessions.join(guild_id, channel_id).await {
        Ok(()) => {
            reply(ctx, command, format!("✅ Conectado a <#{}>", channel_id), false).await
        }
        Err(e) => {
            error!("❌ Error al conectar en guild {}: {}", guild_id, e);
            reply(ctx, command, player_error_message(&e), true).await
        }
    }
}

async fn handle_leave(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    match bot.sessions.leave(guild_id).await {
        Ok(()) => reply(ctx, command, "👋 Desconectado del canal de voz", false).await,
        Err(e) => reply(ctx, command, player_error_message(&e), true).await,
    }
}

async fn handle_play(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    let query = string_option(command, "query")
        .ok_or_else(|| anyhow::anyhow!("Query no proporcionado"))?;

    // Defer la respuesta ya que puede tomar tiempo
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    let Some(voice_channel) = user_voice_channel(ctx, guild_id, command.user.id) else {
        return edit(ctx, command, EditInteractionResponse::new().content("❌ Debes estar en un canal de voz")).await;
    };

    if !bot.sessions.is_connected(guild_id) {
        if let Err(e) = bot.sessions.join(guild_id, voice_channel).await {
            error!("❌ Error al conectar en guild {}: {}", guild_id, e);
            return edit(ctx, command, EditInteractionResponse::new().content(player_error_message(&e))).await;
        }
    }

    let player = bot.sessions.player();
    player.set_announce_channel(guild_id, command.channel_id);

    let item = QueueItem::from_query(query);
    info!("🔍 Solicitud de reproducción en guild {}: {}", guild_id, item);

    let (response, advanced) = match player.enqueue(guild_id, item).await {
        Ok(Enqueued::NowPlaying(now)) => (
            EditInteractionResponse::new().embed(embeds::create_now_playing_embed(&now)),
            None,
        ),
        Ok(Enqueued::Queued { position, item }) => (
            EditInteractionResponse::new().embed(embeds::create_track_queued_embed(&item, position)),
            None,
        ),
        Err(PlayFailure { error, advanced }) => {
            warn!("⚠️ No se pudo reproducir en guild {}: {}", guild_id, error);
            let response = EditInteractionResponse::new().embed(embeds::create_error_embed(
                "Error de Reproducción",
                &player_error_message(&error),
            ));
            (response, advanced)
        }
    };

    edit(ctx, command, response).await?;

    // La cola siguió con lo encolado mientras cargaba el elemento fallido
    if let Some(report) = advanced {
        events::announce(&ctx.http, guild_id, command.channel_id, &report).await;
    }

    Ok(())
}

async fn handle_pause(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    match bot.sessions.player().pause(guild_id) {
        Ok(()) => reply(ctx, command, "⏸️ Reproducción pausada", false).await,
        Err(e) => reply(ctx, command, player_error_message(&e), true).await,
    }
}

async fn handle_resume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    match bot.sessions.player().resume(guild_id) {
        Ok(()) => reply(ctx, command, "▶️ Reproducción reanudada", false).await,
        Err(e) => reply(ctx, command, player_error_message(&e), true).await,
    }
}

async fn handle_stop(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    if !bot.sessions.is_connected(guild_id) {
        return reply(ctx, command, player_error_message(&PlayerError::NotConnected), true).await;
    }

    bot.sessions.player().stop(guild_id);
    reply(ctx, command, "⏹️ Reproducción detenida y cola limpiada", false).await
}

async fn handle_skip(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    match bot.sessions.player().skip(guild_id) {
        Ok(title) => reply(ctx, command, format!("⏭️ Saltada: **{}**", title), false).await,
        Err(e) => reply(ctx, command, player_error_message(&e), true).await,
    }
}

async fn handle_volume(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    let sessions = &bot.sessions;

    let Some(level) = integer_option(command, "level") else {
        let playing = sessions.is_playing(guild_id) || sessions.is_paused(guild_id);
        let embed = embeds::create_volume_embed(sessions.volume(guild_id), playing);
        return reply_embed(ctx, command, embed, false).await;
    };

    if !sessions.is_connected(guild_id) {
        return reply(ctx, command, player_error_message(&PlayerError::NotConnected), true).await;
    }

    match sessions.set_volume(guild_id, level) {
        Ok(volume) => {
            reply_embed(ctx, command, embeds::create_volume_embed(volume, true), false).await
        }
        Err(e) => reply(ctx, command, player_error_message(&e), true).await,
    }
}

async fn handle_queue(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    let snapshot = bot
        .sessions
        .player()
        .snapshot(guild_id, embeds::QUEUE_PREVIEW);
    reply_embed(ctx, command, embeds::create_queue_embed(&snapshot), false).await
}

async fn handle_set_voice_channel(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    let requested = channel_option(command, "channel")
        .or_else(|| user_voice_channel(ctx, guild_id, command.user.id));

    let Some(channel_id) = requested else {
        return reply(
            ctx,
            command,
            "❌ Indica un canal de voz o entra en uno y usa el comando sin parámetros",
            true,
        )
        .await;
    };

    if !is_voice_channel(ctx, guild_id, channel_id) {
        return reply(ctx, command, "❌ El canal indicado no es un canal de voz", true).await;
    }

    if let Err(e) = bot.hub.store().set(guild_id, channel_id).await {
        error!("❌ Error guardando canal hub de guild {}: {:?}", guild_id, e);
        return reply(ctx, command, "❌ No se pudo guardar la configuración", true).await;
    }

    let embed = embeds::create_success_embed(
        "Canal Hub Configurado",
        &format!(
            "Canal: <#{}>\nAl entrar se creará un canal nuevo con la máxima calidad de audio.",
            channel_id
        ),
    );
    reply_embed(ctx, command, embed, false).await
}

async fn handle_remove_voice_channel(
    ctx: &Context,
    command: &CommandInteraction,
    guild_id: GuildId,
    bot: &RelayTuneBot,
) -> Result<()> {
    match bot.hub.store().remove(guild_id).await {
        Ok(Some(_)) => reply(ctx, command, "✅ Canal hub eliminado", false).await,
        Ok(None) => reply(ctx, command, "❌ No hay un canal hub configurado", true).await,
        Err(e) => {
            error!("❌ Error guardando canal hub de guild {}: {:?}", guild_id, e);
            reply(ctx, command, "❌ No se pudo guardar la configuración", true).await
        }
    }
}

// Funciones auxiliares

/// Texto para el usuario a partir de un error del reproductor.
fn player_error_message(err: &PlayerError) -> String {
    match err {
        PlayerError::NothingPlaying => "❌ No hay nada reproduciéndose".to_string(),
        PlayerError::NotPaused => "❌ La reproducción no está pausada".to_string(),
        PlayerError::InvalidVolume(_) => "❌ El volumen debe estar entre 0 y 100".to_string(),
        PlayerError::NotConnected => "❌ El bot no está conectado a un canal de voz".to_string(),
        PlayerError::Superseded => "⏹️ La reproducción se detuvo antes de empezar".to_string(),
        other => format!("❌ Error: {}", other),
    }
}

async fn reply(
    ctx: &Context,
    command: &CommandInteraction,
    content: impl Into<String>,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .content(content)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn reply_embed(
    ctx: &Context,
    command: &CommandInteraction,
    embed: CreateEmbed,
    ephemeral: bool,
) -> Result<()> {
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Message(
                CreateInteractionResponseMessage::new()
                    .embed(embed)
                    .ephemeral(ephemeral),
            ),
        )
        .await?;
    Ok(())
}

async fn edit(
    ctx: &Context,
    command: &CommandInteraction,
    response: EditInteractionResponse,
) -> Result<()> {
    command.edit_response(&ctx.http, response).await?;
    Ok(())
}

fn string_option<'a>(command: &'a CommandInteraction, name: &str) -> Option<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
}

fn integer_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn channel_option(command: &CommandInteraction, name: &str) -> Option<ChannelId> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_channel_id())
}

fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    guild
        .voice_states
        .get(&user_id)
        .and_then(|voice_state| voice_state.channel_id)
}

fn is_voice_channel(ctx: &Context, guild_id: GuildId, channel_id: ChannelId) -> bool {
    guild_id
        .to_guild_cached(&ctx.cache)
        .and_then(|guild| {
            guild
                .channels
                .get(&channel_id)
                .map(|channel| channel.kind == ChannelType::Voice)
        })
        .unwrap_or(false)
}
