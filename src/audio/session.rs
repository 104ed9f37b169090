use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{info, warn};

use super::player::{AudioPlayer, PlaybackState};
use crate::error::PlayerError;

/// Conexión de voz por servidor (songbird en producción).
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayerError>;

    async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError>;
}

/// Tracks the bot's voice connection per guild and ties it to playback.
pub struct VoiceSessions {
    connector: Arc<dyn VoiceConnector>,
    player: Arc<AudioPlayer>,
    channels: DashMap<GuildId, ChannelId>,
}

impl VoiceSessions {
    pub fn new(connector: Arc<dyn VoiceConnector>, player: Arc<AudioPlayer>) -> Self {
        Self {
            connector,
            player,
            channels: DashMap::new(),
        }
    }

    pub fn player(&self) -> &Arc<AudioPlayer> {
        &self.player
    }

    /// Conecta (o mueve) el bot al canal indicado.
    pub async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayerError> {
        if self.channel(guild_id) == Some(channel_id) {
            return Ok(());
        }

        self.connector.join(guild_id, channel_id).await?;
        self.channels.insert(guild_id, channel_id);
        info!("🔊 Conectado a canal de voz {} en guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Desconecta el bot; detiene la reproducción y vacía la cola.
    pub async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        if !self.is_connected(guild_id) {
            return Err(PlayerError::NotConnected);
        }

        self.player.stop(guild_id);
        self.channels.remove(&guild_id);
        self.connector.leave(guild_id).await?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    /// El bot fue sacado del canal desde fuera (kick, canal borrado...).
    pub fn forget(&self, guild_id: GuildId) {
        if self.channels.remove(&guild_id).is_some() {
            warn!("🔌 Bot desconectado externamente en guild {}", guild_id);
            self.player.stop(guild_id);
        }
    }

    /// El bot fue movido a otro canal por un moderador.
    pub fn moved(&self, guild_id: GuildId, channel_id: ChannelId) {
        if let Some(mut current) = self.channels.get_mut(&guild_id) {
            *current = channel_id;
        }
    }

    pub fn channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.channels.get(&guild_id).map(|entry| *entry.value())
    }

    pub fn is_connected(&self, guild_id: GuildId) -> bool {
        self.channels.contains_key(&guild_id)
    }

    pub fn connection_count(&self) -> usize {
        self.channels.len()
    }

    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.is_connected(guild_id) && self.player.state(guild_id) == PlaybackState::Playing
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.is_connected(guild_id) && self.player.state(guild_id) == PlaybackState::Paused
    }

    pub fn volume(&self, guild_id: GuildId) -> u8 {
        self.player.volume(guild_id)
    }

    pub fn set_volume(&self, guild_id: GuildId, level: i64) -> Result<u8, PlayerError> {
        self.player.set_volume(guild_id, level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{
        queue::QueueItem,
        testing::{FakeOutput, FakeResolver},
    };
    use parking_lot::Mutex;
    use pretty_assertions::assert_eq;

    #[derive(Default)]
    struct RecordingConnector {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VoiceConnector for RecordingConnector {
        async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<(), PlayerError> {
            self.calls.lock().push(format!("join {guild_id} {channel_id}"));
            Ok(())
        }

        async fn leave(&self, guild_id: GuildId) -> Result<(), PlayerError> {
            self.calls.lock().push(format!("leave {guild_id}"));
            Ok(())
        }
    }

    const GUILD: GuildId = GuildId::new(42);

    fn sessions() -> (VoiceSessions, Arc<RecordingConnector>) {
        let connector = Arc::new(RecordingConnector::default());
        let player = Arc::new(AudioPlayer::new(FakeResolver::new(), FakeOutput::new(), 0.5));
        (VoiceSessions::new(connector.clone(), player), connector)
    }

    #[tokio::test]
    async fn join_is_idempotent_per_channel() {
        let (sessions, connector) = sessions();

        sessions.join(GUILD, ChannelId::new(1)).await.unwrap();
        sessions.join(GUILD, ChannelId::new(1)).await.unwrap();
        sessions.join(GUILD, ChannelId::new(2)).await.unwrap();

        assert_eq!(*connector.calls.lock(), vec!["join 42 1", "join 42 2"]);
        assert_eq!(sessions.channel(GUILD), Some(ChannelId::new(2)));
        assert_eq!(sessions.connection_count(), 1);
    }

    #[tokio::test]
    async fn leave_clears_the_queue() {
        let (sessions, _) = sessions();
        let player = Arc::clone(sessions.player());

        sessions.join(GUILD, ChannelId::new(1)).await.unwrap();
        player.enqueue(GUILD, QueueItem::Search("a".into())).await.unwrap();
        player.enqueue(GUILD, QueueItem::Search("b".into())).await.unwrap();
        assert!(sessions.is_playing(GUILD));

        sessions.leave(GUILD).await.unwrap();

        assert!(!sessions.is_connected(GUILD));
        assert_eq!(player.queue_len(GUILD), 0);
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn leave_without_connection_is_rejected() {
        let (sessions, connector) = sessions();
        assert!(matches!(sessions.leave(GUILD).await, Err(PlayerError::NotConnected)));
        assert!(connector.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn external_disconnect_forgets_the_session() {
        let (sessions, _) = sessions();
        let player = Arc::clone(sessions.player());

        sessions.join(GUILD, ChannelId::new(1)).await.unwrap();
        player.enqueue(GUILD, QueueItem::Search("a".into())).await.unwrap();

        sessions.forget(GUILD);

        assert!(!sessions.is_connected(GUILD));
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(sessions.volume(GUILD), 50);
    }
}
