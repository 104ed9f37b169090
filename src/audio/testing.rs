//! In-memory resolver, voice output and connector used by the tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
};
use tokio::sync::{Notify, Semaphore};

use super::{
    player::{PlayerEvent, StreamHandle, VoiceOutput},
    queue::QueueItem,
    session::VoiceConnector,
};
use crate::{
    error::{PlayerError, ResolveError},
    sources::{ResolvedTrack, TrackResolver},
};

/// Resolves every item to `"Resolved: <text>"` unless listed as failing.
pub struct FakeResolver {
    failing: HashSet<String>,
    gate: Option<Semaphore>,
    resolving: Notify,
}

impl FakeResolver {
    pub fn new() -> Arc<Self> {
        Self::build(&[], false)
    }

    pub fn failing(items: &[&str]) -> Arc<Self> {
        Self::build(items, false)
    }

    /// Blocks inside `resolve` until [`FakeResolver::release`] is called.
    pub fn gated() -> Arc<Self> {
        Self::build(&[], true)
    }

    /// Gated, and fails the listed items once released.
    pub fn gated_failing(items: &[&str]) -> Arc<Self> {
        Self::build(items, true)
    }

    fn build(failing: &[&str], gated: bool) -> Arc<Self> {
        Arc::new(Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            gate: gated.then(|| Semaphore::new(0)),
            resolving: Notify::new(),
        })
    }

    pub async fn wait_until_resolving(&self) {
        self.resolving.notified().await;
    }

    pub fn release(&self) {
        if let Some(gate) = &self.gate {
            gate.add_permits(1);
        }
    }
}

#[async_trait]
impl TrackResolver for FakeResolver {
    async fn resolve(&self, item: &QueueItem) -> Result<ResolvedTrack, ResolveError> {
        self.resolving.notify_one();
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ResolveError::Extraction(e.to_string()))?
                .forget();
        }

        if self.failing.contains(item.as_str()) {
            return Err(ResolveError::NoResults(item.to_string()));
        }

        Ok(ResolvedTrack {
            title: format!("Resolved: {item}"),
            stream_url: format!("https://stream.test/{item}"),
            catalog_url: None,
        })
    }
}

struct StreamRecord {
    guild_id: GuildId,
    generation: u64,
    volume: f32,
    stopped: bool,
}

#[derive(Default)]
struct OutputState {
    started: Vec<String>,
    streams: Vec<StreamRecord>,
    events: VecDeque<PlayerEvent>,
    max_concurrent: usize,
}

impl OutputState {
    fn end(&mut self, index: usize) {
        let record = &mut self.streams[index];
        if record.stopped {
            return;
        }
        record.stopped = true;
        let event = PlayerEvent::StreamEnded {
            guild_id: record.guild_id,
            generation: record.generation,
            error: None,
        };
        self.events.push_back(event);
    }

    fn live_in(&self, guild_id: GuildId) -> Option<usize> {
        self.streams
            .iter()
            .rposition(|s| s.guild_id == guild_id && !s.stopped)
    }
}

/// Records started streams and queues an end event whenever one stops,
/// the way the songbird track handlers do.
#[derive(Default)]
pub struct FakeOutput {
    state: Arc<Mutex<OutputState>>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> Vec<String> {
        self.state.lock().started.clone()
    }

    pub fn live(&self) -> usize {
        self.state.lock().streams.iter().filter(|s| !s.stopped).count()
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    /// Simula que el track actual del servidor terminó solo.
    pub fn finish_current(&self, guild_id: GuildId) {
        let mut state = self.state.lock();
        if let Some(index) = state.live_in(guild_id) {
            state.end(index);
        }
    }

    pub fn current_generation(&self, guild_id: GuildId) -> Option<u64> {
        let state = self.state.lock();
        state.live_in(guild_id).map(|i| state.streams[i].generation)
    }

    pub fn last_volume(&self, guild_id: GuildId) -> Option<f32> {
        let state = self.state.lock();
        state.live_in(guild_id).map(|i| state.streams[i].volume)
    }

    pub fn next_event(&self) -> Option<PlayerEvent> {
        self.state.lock().events.pop_front()
    }
}

#[async_trait]
impl VoiceOutput for FakeOutput {
    async fn start(
        &self,
        guild_id: GuildId,
        track: &ResolvedTrack,
        volume: f32,
        generation: u64,
    ) -> Result<Box<dyn StreamHandle>, PlayerError> {
        let mut state = self.state.lock();
        state.started.push(track.title.clone());
        state.streams.push(StreamRecord {
            guild_id,
            generation,
            volume,
            stopped: false,
        });

        let concurrent = state
            .streams
            .iter()
            .filter(|s| s.guild_id == guild_id && !s.stopped)
            .count();
        state.max_concurrent = state.max_concurrent.max(concurrent);

        Ok(Box::new(FakeStream {
            state: Arc::clone(&self.state),
            index: state.streams.len() - 1,
        }))
    }
}

struct FakeStream {
    state: Arc<Mutex<OutputState>>,
    index: usize,
}

impl StreamHandle for FakeStream {
    fn pause(&self) -> Result<(), PlayerError> {
        Ok(())
    }

    fn resume(&self) -> Result<(), PlayerError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), PlayerError> {
        self.state.lock().end(self.index);
        Ok(())
    }

    fn set_volume(&self, volume: f32) -> Result<(), PlayerError> {
        self.state.lock().streams[self.index].volume = volume;
        Ok(())
    }
}

/// Voice connector that always succeeds.
pub struct NullConnector;

#[async_trait]
impl VoiceConnector for NullConnector {
    async fn join(&self, _guild_id: GuildId, _channel_id: ChannelId) -> Result<(), PlayerError> {
        Ok(())
    }

    async fn leave(&self, _guild_id: GuildId) -> Result<(), PlayerError> {
        Ok(())
    }
}
