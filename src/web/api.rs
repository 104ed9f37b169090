use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;

use super::{
    error::{ApiError, ApiResult},
    state::{id_as_string, AppState, GuildSummary},
};
use crate::audio::{player::PlaybackState, queue::QueueItem};

/// Elementos de la cola que se muestran en el panel
const QUEUE_PREVIEW: usize = 10;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub status: &'static str,
    pub guilds: usize,
    pub active_voice_connections: usize,
    pub bot_name: String,
    pub uptime: String,
    pub started_at: DateTime<Utc>,
}

/// GET /api/status
pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let bot = state.bot()?;

    let elapsed = (Utc::now() - state.started_at).to_std().unwrap_or_default();
    let uptime = humantime::format_duration(Duration::from_secs(elapsed.as_secs())).to_string();

    Ok(Json(StatusResponse {
        status: "online",
        guilds: bot.guilds().len(),
        active_voice_connections: state.sessions.connection_count(),
        bot_name: bot.bot_name().unwrap_or_else(|| "Unknown".to_string()),
        uptime,
        started_at: state.started_at,
    }))
}

#[derive(Debug, Serialize)]
pub struct GuildEntry {
    #[serde(flatten)]
    pub guild: GuildSummary,
    pub has_voice: bool,
    pub source_channel_set: bool,
    pub created_channels_count: usize,
}

#[derive(Debug, Serialize)]
pub struct GuildsResponse {
    pub guilds: Vec<GuildEntry>,
}

/// GET /api/guilds
pub async fn guilds(State(state): State<AppState>) -> ApiResult<Json<GuildsResponse>> {
    let bot = state.bot()?;

    let guilds = bot
        .guilds()
        .into_iter()
        .map(|guild| GuildEntry {
            has_voice: state.sessions.is_connected(guild.id),
            source_channel_set: state.hub.store().get(guild.id).is_some(),
            created_channels_count: state.hub.created().count(guild.id),
            guild,
        })
        .collect();

    Ok(Json(GuildsResponse { guilds }))
}

#[derive(Debug, Serialize)]
pub struct MusicResponse {
    pub connected: bool,
    pub is_playing: bool,
    pub is_paused: bool,
    pub current_track: Option<String>,
    pub volume: u8,
    pub queue: Vec<QueueItem>,
    pub queue_length: usize,
}

/// GET /api/guild/:id/music
pub async fn music(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<MusicResponse>> {
    let guild_id = lookup_guild(&state, &id)?;
    let snapshot = state.sessions.player().snapshot(guild_id, QUEUE_PREVIEW);

    Ok(Json(MusicResponse {
        connected: state.sessions.is_connected(guild_id),
        is_playing: snapshot.state == PlaybackState::Playing,
        is_paused: snapshot.state == PlaybackState::Paused,
        current_track: snapshot.current_title,
        volume: snapshot.volume,
        queue: snapshot.queue,
        queue_length: snapshot.queue_len,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ControlRequest {
    pub action: String,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    pub success: bool,
    pub message: String,
}

/// POST /api/guild/:id/music/control
pub async fn control(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<ControlRequest>, JsonRejection>,
) -> ApiResult<Json<ActionResponse>> {
    let guild_id = lookup_guild(&state, &id)?;
    let Json(request) = body?;

    if !state.sessions.is_connected(guild_id) {
        return Err(ApiError::BadRequest("Bot not connected to voice channel".into()));
    }

    let player = state.sessions.player();
    let message = match request.action.as_str() {
        "pause" => {
            player.pause(guild_id)?;
            "Playback paused"
        }
        "resume" => {
            player.resume(guild_id)?;
            "Playback resumed"
        }
        "stop" => {
            player.stop(guild_id);
            "Playback stopped"
        }
        "skip" => {
            player.skip(guild_id)?;
            "Track skipped"
        }
        _ => return Err(ApiError::BadRequest("Invalid action".into())),
    };

    Ok(Json(ActionResponse {
        success: true,
        message: message.to_string(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct VolumeRequest {
    pub volume: i64,
}

#[derive(Debug, Serialize)]
pub struct VolumeResponse {
    pub success: bool,
    pub volume: u8,
}

/// POST /api/guild/:id/music/volume
pub async fn volume(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<VolumeRequest>, JsonRejection>,
) -> ApiResult<Json<VolumeResponse>> {
    let guild_id = lookup_guild(&state, &id)?;
    let Json(request) = body?;

    let volume = state.sessions.set_volume(guild_id, request.volume)?;
    Ok(Json(VolumeResponse {
        success: true,
        volume,
    }))
}

#[derive(Debug, Serialize)]
pub struct HubChannelInfo {
    #[serde(serialize_with = "id_as_string")]
    pub id: ChannelId,
    pub name: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CreatedChannelInfo {
    #[serde(serialize_with = "id_as_string")]
    pub id: ChannelId,
    pub name: String,
    pub members: usize,
}

#[derive(Debug, Serialize)]
pub struct VoiceChannelsResponse {
    pub source_channel: Option<HubChannelInfo>,
    pub created_channels: Vec<CreatedChannelInfo>,
    pub created_channels_count: usize,
}

/// GET /api/guild/:id/voice-channels
pub async fn voice_channels(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<VoiceChannelsResponse>> {
    let guild_id = lookup_guild(&state, &id)?;
    let bot = state.bot()?;

    let source_channel = state.hub.store().get(guild_id).map(|id| HubChannelInfo {
        id,
        name: bot.channel_name(guild_id, id),
    });

    // canales registrados que ya no existen no se listan
    let created_channels: Vec<CreatedChannelInfo> = state
        .hub
        .created()
        .list(guild_id)
        .into_iter()
        .filter_map(|id| {
            let name = bot.channel_name(guild_id, id)?;
            Some(CreatedChannelInfo {
                id,
                name,
                members: bot.non_bot_members(guild_id, id),
            })
        })
        .collect();

    Ok(Json(VoiceChannelsResponse {
        source_channel,
        created_channels_count: created_channels.len(),
        created_channels,
    }))
}

/// Valida el id del path y que el bot esté en ese servidor.
fn lookup_guild(state: &AppState, raw: &str) -> ApiResult<GuildId> {
    let bot = state.bot()?;
    let guild_id = raw
        .parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(GuildId::new)
        .ok_or_else(|| ApiError::BadRequest(format!("Invalid guild id: {raw}")))?;

    bot.guild(guild_id)
        .map(|guild| guild.id)
        .ok_or_else(|| ApiError::NotFound("Guild not found".into()))
}
