use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::{Track, TrackHandle},
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error};

use super::{
    player::{PlayerEvent, StreamHandle, VoiceOutput},
    session::VoiceConnector,
};
use crate::{error::PlayerError, sources::ResolvedTrack};

/// Salida de audio sobre las conexiones de voz de songbird.
pub struct SongbirdOutput {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    events: UnboundedSender<PlayerEvent>,
}

impl SongbirdOutput {
    pub fn new(
        manager: Arc<Songbird>,
        http: reqwest::Client,
        events: UnboundedSender<PlayerEvent>,
    ) -> Self {
        Self {
            manager,
            http,
            events,
        }
    }

    fn notifier(&self, guild_id: GuildId, generation: u64) -> StreamEndNotifier {
        StreamEndNotifier {
            guild_id,
            generation,
            events: self.events.clone(),
        }
    }
}

#[async_trait]
impl VoiceOutput for SongbirdOutput {
    async fn start(
        &self,
        guild_id: GuildId,
        track: &ResolvedTrack,
        volume: f32,
        generation: u64,
    ) -> Result<Box<dyn StreamHandle>, PlayerError> {
        let call = self.manager.get(guild_id).ok_or(PlayerError::NotConnected)?;

        let input = HttpRequest::new(self.http.clone(), track.stream_url.clone());
        let handle = {
            let mut call = call.lock().await;
            call.stop();
            call.play(Track::from(input).volume(volume))
        };

        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(Event::Track(event), self.notifier(guild_id, generation))
                .map_err(|e| PlayerError::Control(e.to_string()))?;
        }

        debug!("Stream iniciado en guild {} (gen {})", guild_id, generation);
        Ok(Box::new(SongbirdStream(handle)))
    }
}

struct SongbirdStream(TrackHandle);

fn control(result: songbird::tracks::TrackResult<()>) -> Result<(), PlayerError> {
    result.map_err(|e| PlayerError::Control(e.to_string()))
}

impl StreamHandle for SongbirdStream {
    fn pause(&self) -> Result<(), PlayerError> {
        control(self.0.pause())
    }

    fn resume(&self) -> Result<(), PlayerError> {
        control(self.0.play())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        control(self.0.stop())
    }

    fn set_volume(&self, volume: f32) -> Result<(), PlayerError> {
        control(self.0.set_volume(volume))
    }
}

/// Reenvía el fin (o error) de un track al driver de reproducción.
struct StreamEndNotifier {
    guild_id: GuildId,
    generation: u64,
    events: UnboundedSender<PlayerEvent>,
}

#[async_trait]
impl VoiceEventHandler for StreamEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                songbird::tracks::PlayMode::Errored(e) => Some(e.to_string()),
                _ => None,
            }),
            _ => None,
        };

        let event = PlayerEvent::StreamEnded {
            guild_id: self.guild_id,
            generation: self.generation,
            error,
        };
        if self.events.send(event).is_err() {
            error!("Driver de reproducción no disponible (guild {})", self.guild_id);
        }

        None
    }
}

/// Conexiones de voz a través del gestor de songbird.
pub struct SongbirdConnector {
    manager: Arc<Songbird>,
}

impl SongbirdConnector {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl VoiceConnector for SongbirdConnector {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayerError> {
        self.manager
            .join(guild_id, channel_id)
            .await
            .map(|_| ())
            .map_err(|e| PlayerError::Voice(e.to_string()))
    }

    async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        match self.manager.remove(guild_id).await {
            Ok(()) => Ok(()),
            Err(songbird::error::JoinError::NoCall) => Err(PlayerError::NotConnected),
            Err(e) => Err(PlayerError::Voice(e.to_string())),
        }
    }
}
