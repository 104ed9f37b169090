use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;
use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::{
    audio::queue::{MusicQueue, QueueItem},
    error::PlayerError,
    sources::{ResolvedTrack, TrackResolver},
};

/// Volumen que se informa cuando no hay nada sonando (escala 0-100)
pub const IDLE_VOLUME: u8 = 50;

/// Control sobre un stream que ya está sonando en un canal de voz.
pub trait StreamHandle: Send + Sync {
    fn pause(&self) -> Result<(), PlayerError>;
    fn resume(&self) -> Result<(), PlayerError>;
    /// Detener cuenta como "terminó sin error": el backend debe emitir
    /// [`PlayerEvent::StreamEnded`] igual que al acabar el track.
    fn stop(&self) -> Result<(), PlayerError>;
    fn set_volume(&self, volume: f32) -> Result<(), PlayerError>;
}

/// Backend de salida de audio (songbird en producción).
#[async_trait]
pub trait VoiceOutput: Send + Sync {
    /// Empieza a reproducir `track` en la conexión de voz del servidor.
    ///
    /// `generation` debe viajar de vuelta en el evento de fin de stream.
    async fn start(
        &self,
        guild_id: GuildId,
        track: &ResolvedTrack,
        volume: f32,
        generation: u64,
    ) -> Result<Box<dyn StreamHandle>, PlayerError>;
}

/// Notificaciones que el backend envía al driver de reproducción.
#[derive(Debug, Clone, PartialEq)]
pub enum PlayerEvent {
    StreamEnded {
        guild_id: GuildId,
        generation: u64,
        error: Option<String>,
    },
}

pub struct ActiveSource {
    pub title: String,
    pub catalog_url: Option<String>,
    /// Fracción 0.0-1.0
    pub volume: f32,
    pub paused: bool,
    stream: Box<dyn StreamHandle>,
}

/// What the guild's voice connection is currently fed with.
pub enum CurrentSource {
    NoSource,
    /// A track is being resolved; counts as busy so enqueues only append.
    Loading,
    Active(ActiveSource),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NowPlaying {
    pub title: String,
    pub catalog_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Enqueued {
    /// El servidor estaba inactivo y el elemento empezó a sonar de inmediato.
    NowPlaying(NowPlaying),
    /// Había algo sonando; el elemento quedó en la posición indicada.
    Queued { position: usize, item: QueueItem },
}

/// Fallo de una reproducción inmediata.
///
/// Si mientras se cargaba el elemento se encolaron otros, la cola avanza y
/// `advanced` indica qué empezó a sonar o qué más falló.
#[derive(Debug)]
pub struct PlayFailure {
    pub error: PlayerError,
    pub advanced: Option<AdvanceReport>,
}

/// Resultado de avanzar la cola tras el fin de un stream.
#[derive(Debug, Default)]
pub struct AdvanceReport {
    pub started: Option<NowPlaying>,
    pub failures: Vec<(QueueItem, PlayerError)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    pub state: PlaybackState,
    pub current_title: Option<String>,
    pub volume: u8,
    pub queue: Vec<QueueItem>,
    pub queue_len: usize,
}

struct GuildPlayback {
    queue: MusicQueue,
    source: CurrentSource,
    /// Se incrementa en cada stop/avance; invalida resoluciones en vuelo
    /// y eventos de fin de streams anteriores.
    generation: u64,
    announce_channel: Option<ChannelId>,
}

impl GuildPlayback {
    fn new() -> Self {
        Self {
            queue: MusicQueue::new(),
            source: CurrentSource::NoSource,
            generation: 0,
            announce_channel: None,
        }
    }

    fn state(&self) -> PlaybackState {
        match &self.source {
            CurrentSource::NoSource => PlaybackState::Idle,
            CurrentSource::Loading => PlaybackState::Loading,
            CurrentSource::Active(active) if active.paused => PlaybackState::Paused,
            CurrentSource::Active(_) => PlaybackState::Playing,
        }
    }
}

/// Per-guild playback registry and sequential playback driver.
///
/// At most one stream is active per guild: a guild is only started from the
/// idle state, and every later request is appended to its FIFO queue.
pub struct AudioPlayer {
    guilds: DashMap<GuildId, Arc<Mutex<GuildPlayback>>>,
    resolver: Arc<dyn TrackResolver>,
    output: Arc<dyn VoiceOutput>,
    default_volume: f32,
}

impl AudioPlayer {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        output: Arc<dyn VoiceOutput>,
        default_volume: f32,
    ) -> Self {
        Self {
            guilds: DashMap::new(),
            resolver,
            output,
            default_volume,
        }
    }

    /// Agrega un elemento; si el servidor está inactivo lo reproduce ya.
    pub async fn enqueue(&self, guild_id: GuildId, item: QueueItem) -> Result<Enqueued, PlayFailure> {
        let state = self.guild(guild_id);

        let generation = {
            let mut guild = state.lock();
            if !matches!(guild.source, CurrentSource::NoSource) {
                let position = guild.queue.push(item.clone());
                return Ok(Enqueued::Queued { position, item });
            }
            guild.generation += 1;
            guild.source = CurrentSource::Loading;
            guild.generation
        };

        let error = match self.load_and_start(guild_id, &item, generation).await {
            Ok(now) => return Ok(Enqueued::NowPlaying(now)),
            Err(e) => e,
        };

        if matches!(error, PlayerError::Superseded) {
            return Err(PlayFailure { error, advanced: None });
        }

        // Lo que se encoló durante la carga sigue su turno
        let pending = {
            let mut guild = state.lock();
            if guild.generation != generation {
                false
            } else if guild.queue.is_empty() {
                guild.source = CurrentSource::NoSource;
                false
            } else {
                true
            }
        };

        let advanced = if pending {
            warn!(
                "⚠️ No se pudo reproducir '{}' en guild {}, pasando al siguiente: {}",
                item, guild_id, error
            );
            Some(self.advance(guild_id, generation).await)
        } else {
            None
        };

        Err(PlayFailure { error, advanced })
    }

    /// Reacciona al fin de un stream.
    ///
    /// Solo avanza si el evento corresponde al stream activo; los eventos de
    /// streams detenidos por `stop` llegan con una generación vieja y se ignoran.
    pub async fn handle_stream_end(
        &self,
        guild_id: GuildId,
        generation: u64,
        error: Option<String>,
    ) -> Option<AdvanceReport> {
        let state = self.guild(guild_id);

        let next_generation = {
            let mut guild = state.lock();
            let is_current =
                guild.generation == generation && matches!(guild.source, CurrentSource::Active(_));
            if !is_current {
                debug!("Evento de fin obsoleto en guild {} (gen {})", guild_id, generation);
                return None;
            }

            guild.generation += 1;
            if let Some(error) = error {
                warn!("❌ Error de reproducción en guild {}: {}", guild_id, error);
                guild.source = CurrentSource::NoSource;
                return None;
            }
            guild.source = CurrentSource::Loading;
            guild.generation
        };

        Some(self.advance(guild_id, next_generation).await)
    }

    /// Saca elementos de la cola hasta que uno arranca o la cola se vacía.
    ///
    /// Un elemento que no se puede resolver se reporta y se pasa al siguiente.
    async fn advance(&self, guild_id: GuildId, generation: u64) -> AdvanceReport {
        let state = self.guild(guild_id);
        let mut report = AdvanceReport::default();

        loop {
            let next = {
                let mut guild = state.lock();
                if guild.generation != generation {
                    return report;
                }
                let next = guild.queue.pop();
                if next.is_none() {
                    guild.source = CurrentSource::NoSource;
                }
                next
            };

            let Some(item) = next else {
                debug!("Cola vacía para guild {}", guild_id);
                return report;
            };

            match self.load_and_start(guild_id, &item, generation).await {
                Ok(now) => {
                    report.started = Some(now);
                    return report;
                }
                Err(PlayerError::Superseded) => return report,
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir '{}' en guild {}: {}", item, guild_id, e);
                    report.failures.push((item, e));
                }
            }
        }
    }

    async fn load_and_start(
        &self,
        guild_id: GuildId,
        item: &QueueItem,
        generation: u64,
    ) -> Result<NowPlaying, PlayerError> {
        let track = self.resolver.resolve(item).await?;

        if self.generation(guild_id) != generation {
            info!("⏹️ '{}' descartado: reproducción detenida durante la resolución", track.title);
            return Err(PlayerError::Superseded);
        }

        let stream = self
            .output
            .start(guild_id, &track, self.default_volume, generation)
            .await?;

        let state = self.guild(guild_id);
        let mut guild = state.lock();
        if guild.generation != generation {
            drop(guild);
            if let Err(e) = stream.stop() {
                warn!("Error al detener stream descartado: {}", e);
            }
            return Err(PlayerError::Superseded);
        }

        info!("🎵 Reproduciendo: {} (guild {})", track.title, guild_id);
        guild.source = CurrentSource::Active(ActiveSource {
            title: track.title.clone(),
            catalog_url: track.catalog_url.clone(),
            volume: self.default_volume,
            paused: false,
            stream,
        });

        Ok(NowPlaying {
            title: track.title,
            catalog_url: track.catalog_url,
        })
    }

    /// Detiene la reproducción y limpia la cola. Devuelve si había un stream activo.
    pub fn stop(&self, guild_id: GuildId) -> bool {
        let Some(state) = self.existing(guild_id) else {
            return false;
        };

        let previous = {
            let mut guild = state.lock();
            guild.queue.clear();
            guild.generation += 1;
            std::mem::replace(&mut guild.source, CurrentSource::NoSource)
        };

        match previous {
            CurrentSource::Active(active) => {
                if let Err(e) = active.stream.stop() {
                    warn!("Error al detener stream: {}", e);
                }
                info!("⏹️ Reproducción detenida en guild {}", guild_id);
                true
            }
            _ => false,
        }
    }

    /// Detiene el track actual; el evento de fin resultante avanza la cola.
    pub fn skip(&self, guild_id: GuildId) -> Result<String, PlayerError> {
        self.with_active(guild_id, PlayerError::NothingPlaying, |active| {
            active.stream.stop()?;
            info!("⏭️ Saltado: {}", active.title);
            Ok(active.title.clone())
        })
    }

    pub fn pause(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        self.with_active(guild_id, PlayerError::NothingPlaying, |active| {
            if active.paused {
                return Err(PlayerError::NothingPlaying);
            }
            active.stream.pause()?;
            active.paused = true;
            info!("⏸️ Reproducción pausada");
            Ok(())
        })
    }

    pub fn resume(&self, guild_id: GuildId) -> Result<(), PlayerError> {
        self.with_active(guild_id, PlayerError::NotPaused, |active| {
            if !active.paused {
                return Err(PlayerError::NotPaused);
            }
            active.stream.resume()?;
            active.paused = false;
            info!("▶️ Reproducción reanudada");
            Ok(())
        })
    }

    /// Volumen actual en escala 0-100; 50 si no hay nada sonando.
    pub fn volume(&self, guild_id: GuildId) -> u8 {
        let Some(state) = self.existing(guild_id) else {
            return IDLE_VOLUME;
        };
        let guild = state.lock();
        match &guild.source {
            CurrentSource::Active(active) => to_percent(active.volume),
            _ => IDLE_VOLUME,
        }
    }

    /// Ajusta el volumen (0-100) de la fuente activa.
    pub fn set_volume(&self, guild_id: GuildId, level: i64) -> Result<u8, PlayerError> {
        if !(0..=100).contains(&level) {
            return Err(PlayerError::InvalidVolume(level));
        }

        self.with_active(guild_id, PlayerError::NothingPlaying, |active| {
            let fraction = level as f32 / 100.0;
            active.stream.set_volume(fraction)?;
            active.volume = fraction;
            info!("🔊 Volumen ajustado a {}%", level);
            Ok(level as u8)
        })
    }

    pub fn state(&self, guild_id: GuildId) -> PlaybackState {
        self.existing(guild_id)
            .map(|state| state.lock().state())
            .unwrap_or(PlaybackState::Idle)
    }

    pub fn is_playing(&self, guild_id: GuildId) -> bool {
        self.state(guild_id) == PlaybackState::Playing
    }

    pub fn is_paused(&self, guild_id: GuildId) -> bool {
        self.state(guild_id) == PlaybackState::Paused
    }

    pub fn queue_len(&self, guild_id: GuildId) -> usize {
        self.existing(guild_id)
            .map(|state| state.lock().queue.len())
            .unwrap_or(0)
    }

    /// Estado completo con los primeros `limit` elementos de la cola.
    pub fn snapshot(&self, guild_id: GuildId, limit: usize) -> PlaybackSnapshot {
        let Some(state) = self.existing(guild_id) else {
            return PlaybackSnapshot {
                state: PlaybackState::Idle,
                current_title: None,
                volume: IDLE_VOLUME,
                queue: Vec::new(),
                queue_len: 0,
            };
        };

        let guild = state.lock();
        let (current_title, volume) = match &guild.source {
            CurrentSource::Active(active) => (Some(active.title.clone()), to_percent(active.volume)),
            _ => (None, IDLE_VOLUME),
        };

        PlaybackSnapshot {
            state: guild.state(),
            current_title,
            volume,
            queue: guild.queue.peek(limit),
            queue_len: guild.queue.len(),
        }
    }

    /// Canal de texto donde anunciar "now playing" y errores del driver.
    pub fn set_announce_channel(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.guild(guild_id).lock().announce_channel = Some(channel_id);
    }

    pub fn announce_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.existing(guild_id)
            .and_then(|state| state.lock().announce_channel)
    }

    fn with_active<T>(
        &self,
        guild_id: GuildId,
        when_missing: PlayerError,
        f: impl FnOnce(&mut ActiveSource) -> Result<T, PlayerError>,
    ) -> Result<T, PlayerError> {
        let Some(state) = self.existing(guild_id) else {
            return Err(when_missing);
        };
        let mut guild = state.lock();
        match &mut guild.source {
            CurrentSource::Active(active) => f(active),
            _ => Err(when_missing),
        }
    }

    fn generation(&self, guild_id: GuildId) -> u64 {
        self.guild(guild_id).lock().generation
    }

    fn existing(&self, guild_id: GuildId) -> Option<Arc<Mutex<GuildPlayback>>> {
        self.guilds.get(&guild_id).map(|entry| Arc::clone(entry.value()))
    }

    fn guild(&self, guild_id: GuildId) -> Arc<Mutex<GuildPlayback>> {
        self.guilds
            .entry(guild_id)
            .or_insert_with(|| Arc::new(Mutex::new(GuildPlayback::new())))
            .clone()
    }
}

fn to_percent(fraction: f32) -> u8 {
    (fraction * 100.0).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::testing::{FakeOutput, FakeResolver};
    use pretty_assertions::assert_eq;

    const GUILD: GuildId = GuildId::new(42);

    fn player(resolver: Arc<FakeResolver>, output: Arc<FakeOutput>) -> Arc<AudioPlayer> {
        Arc::new(AudioPlayer::new(resolver, output, 0.5))
    }

    fn search(text: &str) -> QueueItem {
        QueueItem::Search(text.to_string())
    }

    /// Entrega al player todos los eventos de fin pendientes.
    async fn pump(player: &AudioPlayer, output: &FakeOutput) -> Vec<AdvanceReport> {
        let mut reports = Vec::new();
        while let Some(PlayerEvent::StreamEnded {
            guild_id,
            generation,
            error,
        }) = output.next_event()
        {
            if let Some(report) = player.handle_stream_end(guild_id, generation, error).await {
                reports.push(report);
            }
        }
        reports
    }

    #[tokio::test]
    async fn enqueue_on_idle_guild_plays_immediately() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        let outcome = player.enqueue(GUILD, search("some song")).await.unwrap();

        assert_eq!(
            outcome,
            Enqueued::NowPlaying(NowPlaying {
                title: "Resolved: some song".into(),
                catalog_url: None,
            })
        );
        assert_eq!(player.state(GUILD), PlaybackState::Playing);
        assert_eq!(output.started(), vec!["Resolved: some song".to_string()]);
    }

    #[tokio::test]
    async fn enqueue_while_playing_only_appends() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("some song")).await.unwrap();
        let outcome = player.enqueue(GUILD, search("another song")).await.unwrap();

        assert_eq!(
            outcome,
            Enqueued::Queued {
                position: 1,
                item: search("another song")
            }
        );
        assert_eq!(player.queue_len(GUILD), 1);
        assert_eq!(output.started().len(), 1);
        assert_eq!(player.snapshot(GUILD, 10).current_title.as_deref(), Some("Resolved: some song"));
    }

    #[tokio::test]
    async fn natural_end_advances_in_fifo_order() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("one")).await.unwrap();
        player.enqueue(GUILD, search("two")).await.unwrap();
        player.enqueue(GUILD, search("three")).await.unwrap();

        output.finish_current(GUILD);
        let reports = pump(&player, &output).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].started.as_ref().map(|n| n.title.as_str()), Some("Resolved: two"));

        output.finish_current(GUILD);
        pump(&player, &output).await;
        output.finish_current(GUILD);
        pump(&player, &output).await;

        assert_eq!(
            output.started(),
            vec!["Resolved: one", "Resolved: two", "Resolved: three"]
        );
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(output.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn failed_items_are_reported_and_skipped() {
        let output = FakeOutput::new();
        let resolver = FakeResolver::failing(&["broken", "also broken"]);
        let player = player(resolver, output.clone());

        player.enqueue(GUILD, search("first")).await.unwrap();
        player.enqueue(GUILD, search("broken")).await.unwrap();
        player.enqueue(GUILD, search("also broken")).await.unwrap();
        player.enqueue(GUILD, search("last")).await.unwrap();

        output.finish_current(GUILD);
        let reports = pump(&player, &output).await;

        let report = &reports[0];
        assert_eq!(
            report.failures.iter().map(|(item, _)| item.clone()).collect::<Vec<_>>(),
            vec![search("broken"), search("also broken")]
        );
        assert_eq!(report.started.as_ref().map(|n| n.title.as_str()), Some("Resolved: last"));
        assert_eq!(player.queue_len(GUILD), 0);
    }

    #[tokio::test]
    async fn queue_of_only_failures_returns_to_idle() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::failing(&["bad"]), output.clone());

        player.enqueue(GUILD, search("good")).await.unwrap();
        player.enqueue(GUILD, search("bad")).await.unwrap();

        output.finish_current(GUILD);
        let reports = pump(&player, &output).await;

        assert_eq!(reports[0].failures.len(), 1);
        assert!(reports[0].started.is_none());
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn failed_immediate_play_leaves_guild_idle() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::failing(&["bad"]), output.clone());

        let result = player.enqueue(GUILD, search("bad")).await;

        assert!(matches!(
            result,
            Err(PlayFailure {
                error: PlayerError::Resolve(_),
                advanced: None
            })
        ));
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert!(output.started().is_empty());
    }

    #[tokio::test]
    async fn stop_clears_queue_and_returns_to_idle() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("one")).await.unwrap();
        for i in 0..5 {
            player.enqueue(GUILD, search(&format!("queued {i}"))).await.unwrap();
        }

        assert!(player.stop(GUILD));
        // el evento del stream detenido no debe avanzar la cola
        assert!(pump(&player, &output).await.is_empty());

        assert_eq!(player.queue_len(GUILD), 0);
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(output.live(), 0);
        assert_eq!(output.started().len(), 1);
    }

    #[tokio::test]
    async fn stop_on_unknown_guild_is_harmless() {
        let player = player(FakeResolver::new(), FakeOutput::new());
        assert!(!player.stop(GuildId::new(7)));
        assert_eq!(player.state(GuildId::new(7)), PlaybackState::Idle);
    }

    #[tokio::test]
    async fn skip_on_idle_reports_nothing_playing() {
        let player = player(FakeResolver::new(), FakeOutput::new());
        assert!(matches!(player.skip(GUILD), Err(PlayerError::NothingPlaying)));
    }

    #[tokio::test]
    async fn skip_triggers_exactly_one_advance() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("one")).await.unwrap();
        player.enqueue(GUILD, search("two")).await.unwrap();
        player.enqueue(GUILD, search("three")).await.unwrap();

        assert_eq!(player.skip(GUILD).unwrap(), "Resolved: one");
        let reports = pump(&player, &output).await;

        assert_eq!(reports.len(), 1);
        assert_eq!(output.started(), vec!["Resolved: one", "Resolved: two"]);
        assert_eq!(player.queue_len(GUILD), 1);
        assert_eq!(output.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn duplicate_end_events_advance_once() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("one")).await.unwrap();
        player.enqueue(GUILD, search("two")).await.unwrap();
        player.enqueue(GUILD, search("three")).await.unwrap();

        let generation = output.current_generation(GUILD).unwrap();
        assert!(player.handle_stream_end(GUILD, generation, None).await.is_some());
        assert!(player.handle_stream_end(GUILD, generation, None).await.is_none());
        assert_eq!(player.queue_len(GUILD), 1);
    }

    #[tokio::test]
    async fn stream_error_returns_to_idle_without_advancing() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        player.enqueue(GUILD, search("one")).await.unwrap();
        player.enqueue(GUILD, search("two")).await.unwrap();

        let generation = output.current_generation(GUILD).unwrap();
        let report = player
            .handle_stream_end(GUILD, generation, Some("decoder exploded".into()))
            .await;

        assert!(report.is_none());
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(player.queue_len(GUILD), 1);
    }

    #[tokio::test]
    async fn pause_and_resume_only_apply_to_the_right_state() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        assert!(matches!(player.pause(GUILD), Err(PlayerError::NothingPlaying)));
        assert!(matches!(player.resume(GUILD), Err(PlayerError::NotPaused)));

        player.enqueue(GUILD, search("one")).await.unwrap();
        player.enqueue(GUILD, search("two")).await.unwrap();

        assert!(matches!(player.resume(GUILD), Err(PlayerError::NotPaused)));
        player.pause(GUILD).unwrap();
        assert!(player.is_paused(GUILD));
        assert!(matches!(player.pause(GUILD), Err(PlayerError::NothingPlaying)));
        player.resume(GUILD).unwrap();
        assert!(player.is_playing(GUILD));

        assert_eq!(player.queue_len(GUILD), 1);
    }

    #[tokio::test]
    async fn volume_defaults_and_validation() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());

        assert_eq!(player.volume(GUILD), 50);
        assert!(matches!(player.set_volume(GUILD, 30), Err(PlayerError::NothingPlaying)));

        player.enqueue(GUILD, search("one")).await.unwrap();
        assert_eq!(player.volume(GUILD), 50);

        assert_eq!(player.set_volume(GUILD, 80).unwrap(), 80);
        assert_eq!(player.volume(GUILD), 80);
        assert_eq!(output.last_volume(GUILD), Some(0.8));

        for bad in [-1, 101, 1000] {
            assert!(matches!(
                player.set_volume(GUILD, bad),
                Err(PlayerError::InvalidVolume(v)) if v == bad
            ));
        }
        assert_eq!(player.volume(GUILD), 80);
    }

    #[tokio::test]
    async fn stop_during_resolution_prevents_playback() {
        let output = FakeOutput::new();
        let resolver = FakeResolver::gated();
        let player = player(resolver.clone(), output.clone());

        let pending = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.enqueue(GUILD, search("slow")).await })
        };

        resolver.wait_until_resolving().await;
        assert_eq!(player.state(GUILD), PlaybackState::Loading);

        // mientras resuelve, otro play solo se encola
        let queued = player.enqueue(GUILD, search("next")).await.unwrap();
        assert!(matches!(queued, Enqueued::Queued { position: 1, .. }));

        player.stop(GUILD);
        resolver.release();

        let result = pending.await.unwrap();
        assert!(matches!(
            result,
            Err(PlayFailure {
                error: PlayerError::Superseded,
                advanced: None
            })
        ));
        assert!(output.started().is_empty());
        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(player.queue_len(GUILD), 0);
    }

    #[tokio::test]
    async fn failed_immediate_play_moves_on_to_items_queued_meanwhile() {
        let output = FakeOutput::new();
        let resolver = FakeResolver::gated_failing(&["bad"]);
        let player = player(resolver.clone(), output.clone());

        let pending = {
            let player = Arc::clone(&player);
            tokio::spawn(async move { player.enqueue(GUILD, search("bad")).await })
        };

        resolver.wait_until_resolving().await;
        let queued = player.enqueue(GUILD, search("queued")).await.unwrap();
        assert!(matches!(queued, Enqueued::Queued { position: 1, .. }));

        // uno para "bad" y otro para "queued"
        resolver.release();
        resolver.release();

        let failure = pending.await.unwrap().unwrap_err();
        assert!(matches!(failure.error, PlayerError::Resolve(_)));
        let report = failure.advanced.expect("queue should advance");
        assert!(report.failures.is_empty());
        assert_eq!(
            report.started.map(|now| now.title),
            Some("Resolved: queued".to_string())
        );

        assert_eq!(player.state(GUILD), PlaybackState::Playing);
        assert_eq!(player.queue_len(GUILD), 0);
        assert_eq!(output.started(), vec!["Resolved: queued".to_string()]);

        // un play posterior respeta el orden y se encola
        let later = player.enqueue(GUILD, search("later")).await.unwrap();
        assert!(matches!(later, Enqueued::Queued { position: 1, .. }));
    }

    #[tokio::test]
    async fn guilds_are_independent() {
        let output = FakeOutput::new();
        let player = player(FakeResolver::new(), output.clone());
        let other = GuildId::new(43);

        player.enqueue(GUILD, search("a")).await.unwrap();
        player.enqueue(other, search("b")).await.unwrap();
        player.stop(GUILD);

        assert_eq!(player.state(GUILD), PlaybackState::Idle);
        assert_eq!(player.state(other), PlaybackState::Playing);
    }

    #[tokio::test]
    async fn announce_channel_is_remembered() {
        let player = player(FakeResolver::new(), FakeOutput::new());
        assert_eq!(player.announce_channel(GUILD), None);
        player.set_announce_channel(GUILD, ChannelId::new(9));
        assert_eq!(player.announce_channel(GUILD), Some(ChannelId::new(9)));
    }
}
