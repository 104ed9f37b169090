//! Temporary voice channels spawned from a per-guild "hub" channel.
//!
//! Joining the hub creates a personal channel next to it and moves the user
//! there; a bot-created channel is deleted once its last non-bot member leaves.

use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId, UserId};
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, error, info, warn};

use crate::{error::ChannelOpError, storage::HubChannelStore};

/// Techo absoluto de bitrate para canales de voz
pub const MAX_BITRATE: u32 = 384_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoiceChannel {
    pub name: String,
    pub category: Option<ChannelId>,
    pub bitrate: u32,
}

/// Operaciones sobre canales del servidor (serenity en producción).
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelOps: Send + Sync {
    async fn create_voice_channel(
        &self,
        guild_id: GuildId,
        channel: NewVoiceChannel,
    ) -> Result<ChannelId, ChannelOpError>;

    async fn move_member(
        &self,
        guild_id: GuildId,
        user_id: UserId,
        channel_id: ChannelId,
    ) -> Result<(), ChannelOpError>;

    async fn delete_channel(&self, channel_id: ChannelId) -> Result<(), ChannelOpError>;

    fn non_bot_member_count(&self, guild_id: GuildId, channel_id: ChannelId) -> usize;

    /// Bitrate máximo que permite el plan del servidor.
    fn bitrate_ceiling(&self, guild_id: GuildId) -> u32;

    fn category_of(&self, channel_id: ChannelId) -> Option<ChannelId>;
}

/// A member's voice presence changed.
#[derive(Debug, Clone)]
pub struct VoiceTransition {
    pub guild_id: GuildId,
    pub user_id: UserId,
    pub display_name: String,
    pub is_bot: bool,
    pub from: Option<ChannelId>,
    pub to: Option<ChannelId>,
}

/// Canales creados por el bot, por servidor. Solo en memoria.
#[derive(Default)]
pub struct CreatedChannels {
    channels: DashMap<GuildId, HashSet<ChannelId>>,
}

impl CreatedChannels {
    pub fn register(&self, guild_id: GuildId, channel_id: ChannelId) {
        self.channels.entry(guild_id).or_default().insert(channel_id);
    }

    pub fn unregister(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        let Some(mut set) = self.channels.get_mut(&guild_id) else {
            return false;
        };
        set.remove(&channel_id)
    }

    pub fn contains(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.channels
            .get(&guild_id)
            .is_some_and(|set| set.contains(&channel_id))
    }

    pub fn list(&self, guild_id: GuildId) -> Vec<ChannelId> {
        let mut list: Vec<ChannelId> = self
            .channels
            .get(&guild_id)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        list.sort();
        list
    }

    pub fn count(&self, guild_id: GuildId) -> usize {
        self.channels.get(&guild_id).map_or(0, |set| set.len())
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct TransitionOutcome {
    pub created: Option<ChannelId>,
    pub deleted: Option<ChannelId>,
}

/// Reacts to voice presence changes. Channel operations are passed per call
/// since they are bound to the gateway context of the event being handled.
pub struct HubProvisioner {
    store: Arc<HubChannelStore>,
    created: CreatedChannels,
}

impl HubProvisioner {
    pub fn new(store: Arc<HubChannelStore>) -> Self {
        Self {
            store,
            created: CreatedChannels::default(),
        }
    }

    pub fn store(&self) -> &HubChannelStore {
        &self.store
    }

    pub fn created(&self) -> &CreatedChannels {
        &self.created
    }

    pub async fn handle_transition(
        &self,
        ops: &dyn ChannelOps,
        transition: &VoiceTransition,
    ) -> TransitionOutcome {
        let mut outcome = TransitionOutcome::default();
        if transition.is_bot || transition.from == transition.to {
            return outcome;
        }

        if let Some(to) = transition.to {
            if self.store.is_hub(transition.guild_id, to) {
                outcome.created = self.provision(ops, transition, to).await;
            }
        }

        if let Some(from) = transition.from {
            if self.cleanup_if_empty(ops, transition.guild_id, from).await {
                outcome.deleted = Some(from);
            }
        }

        outcome
    }

    async fn provision(
        &self,
        ops: &dyn ChannelOps,
        transition: &VoiceTransition,
        hub: ChannelId,
    ) -> Option<ChannelId> {
        let guild_id = transition.guild_id;
        let bitrate = MAX_BITRATE.min(ops.bitrate_ceiling(guild_id));
        let request = NewVoiceChannel {
            name: format!("🎵 {}", transition.display_name),
            category: ops.category_of(hub),
            bitrate,
        };

        let channel_id = match ops.create_voice_channel(guild_id, request).await {
            Ok(id) => id,
            Err(e) => {
                error!("❌ No se pudo crear canal de voz en guild {}: {}", guild_id, e);
                return None;
            }
        };
        self.created.register(guild_id, channel_id);

        // Si el movimiento falla el canal queda registrado y se limpia al quedar vacío
        if let Err(e) = ops
            .move_member(guild_id, transition.user_id, channel_id)
            .await
        {
            warn!(
                "⚠️ Canal {} creado pero no se pudo mover a {}: {}",
                channel_id, transition.display_name, e
            );
        } else {
            info!(
                "✅ Canal '🎵 {}' creado ({} bps) en guild {}",
                transition.display_name, bitrate, guild_id
            );
        }

        Some(channel_id)
    }

    /// Borra `channel_id` si es un canal del bot y ya no quedan humanos.
    async fn cleanup_if_empty(
        &self,
        ops: &dyn ChannelOps,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> bool {
        if !self.created.contains(guild_id, channel_id) {
            return false;
        }
        if ops.non_bot_member_count(guild_id, channel_id) > 0 {
            return false;
        }

        self.created.unregister(guild_id, channel_id);
        match ops.delete_channel(channel_id).await {
            Ok(()) => {
                info!("🗑️ Canal vacío {} eliminado en guild {}", channel_id, guild_id);
                true
            }
            Err(e) => {
                error!("❌ No se pudo eliminar canal {}: {}", channel_id, e);
                false
            }
        }
    }

    /// Alguien borró a mano un canal que el bot había creado.
    pub fn channel_deleted(&self, guild_id: GuildId, channel_id: ChannelId) {
        if self.created.unregister(guild_id, channel_id) {
            debug!("Canal {} eliminado externamente, fuera del registro", channel_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const GUILD: GuildId = GuildId::new(1);
    const HUB: ChannelId = ChannelId::new(500);
    const CATEGORY: ChannelId = ChannelId::new(50);

    async fn store_with_hub() -> (Arc<HubChannelStore>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let store = HubChannelStore::load(dir.path().join("voice_channels.json"))
            .await
            .unwrap();
        store.set(GUILD, HUB).await.unwrap();
        (Arc::new(store), dir)
    }

    fn transition(from: Option<u64>, to: Option<u64>) -> VoiceTransition {
        VoiceTransition {
            guild_id: GUILD,
            user_id: UserId::new(7),
            display_name: "Alice".into(),
            is_bot: false,
            from: from.map(ChannelId::new),
            to: to.map(ChannelId::new),
        }
    }

    #[tokio::test]
    async fn joining_the_hub_creates_and_moves() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_bitrate_ceiling().return_const(256_000u32);
        ops.expect_category_of().with(eq(HUB)).return_const(Some(CATEGORY));
        ops.expect_create_voice_channel()
            .withf(|guild, channel| {
                *guild == GUILD
                    && *channel
                        == NewVoiceChannel {
                            name: "🎵 Alice".into(),
                            category: Some(CATEGORY),
                            bitrate: 256_000,
                        }
            })
            .times(1)
            .returning(|_, _| Ok(ChannelId::new(900)));
        ops.expect_move_member()
            .with(eq(GUILD), eq(UserId::new(7)), eq(ChannelId::new(900)))
            .times(1)
            .returning(|_, _, _| Ok(()));

        let hub = HubProvisioner::new(store);
        let outcome = hub.handle_transition(&ops, &transition(None, Some(500))).await;

        assert_eq!(outcome.created, Some(ChannelId::new(900)));
        assert!(hub.created().contains(GUILD, ChannelId::new(900)));
        assert_eq!(hub.created().count(GUILD), 1);
    }

    #[tokio::test]
    async fn bitrate_is_capped() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_bitrate_ceiling().return_const(512_000u32);
        ops.expect_category_of().return_const(None::<ChannelId>);
        ops.expect_create_voice_channel()
            .withf(|_, channel| channel.bitrate == MAX_BITRATE && channel.category.is_none())
            .times(1)
            .returning(|_, _| Ok(ChannelId::new(901)));
        ops.expect_move_member().returning(|_, _, _| Ok(()));

        let hub = HubProvisioner::new(store);
        hub.handle_transition(&ops, &transition(None, Some(500))).await;
    }

    #[tokio::test]
    async fn failed_move_keeps_channel_registered() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_bitrate_ceiling().return_const(96_000u32);
        ops.expect_category_of().return_const(None::<ChannelId>);
        ops.expect_create_voice_channel()
            .returning(|_, _| Ok(ChannelId::new(902)));
        ops.expect_move_member()
            .returning(|_, _, _| Err(ChannelOpError::Forbidden("Move Members".into())));

        let hub = HubProvisioner::new(store);
        let outcome = hub.handle_transition(&ops, &transition(None, Some(500))).await;

        assert_eq!(outcome.created, Some(ChannelId::new(902)));
        assert!(hub.created().contains(GUILD, ChannelId::new(902)));
    }

    #[tokio::test]
    async fn failed_creation_registers_nothing() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_bitrate_ceiling().return_const(96_000u32);
        ops.expect_category_of().return_const(None::<ChannelId>);
        ops.expect_create_voice_channel()
            .returning(|_, _| Err(ChannelOpError::Forbidden("Manage Channels".into())));
        ops.expect_move_member().never();

        let hub = HubProvisioner::new(store);
        let outcome = hub.handle_transition(&ops, &transition(None, Some(500))).await;

        assert_eq!(outcome, TransitionOutcome::default());
        assert_eq!(hub.created().count(GUILD), 0);
    }

    #[tokio::test]
    async fn last_member_leaving_deletes_managed_channel() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_non_bot_member_count()
            .with(eq(GUILD), eq(ChannelId::new(900)))
            .return_const(0usize);
        ops.expect_delete_channel()
            .with(eq(ChannelId::new(900)))
            .times(1)
            .returning(|_| Ok(()));

        let hub = HubProvisioner::new(store);
        hub.created().register(GUILD, ChannelId::new(900));

        let outcome = hub.handle_transition(&ops, &transition(Some(900), None)).await;

        assert_eq!(outcome.deleted, Some(ChannelId::new(900)));
        assert!(!hub.created().contains(GUILD, ChannelId::new(900)));
    }

    #[tokio::test]
    async fn occupied_or_plain_channels_are_kept() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_non_bot_member_count()
            .with(eq(GUILD), eq(ChannelId::new(900)))
            .return_const(2usize);
        ops.expect_delete_channel().never();

        let hub = HubProvisioner::new(store);
        hub.created().register(GUILD, ChannelId::new(900));

        // sigue habiendo gente
        let outcome = hub.handle_transition(&ops, &transition(Some(900), None)).await;
        assert_eq!(outcome.deleted, None);
        // canal que no es del bot
        let outcome = hub.handle_transition(&ops, &transition(Some(333), Some(334))).await;
        assert_eq!(outcome, TransitionOutcome::default());
    }

    #[tokio::test]
    async fn bots_and_non_moves_are_ignored() {
        let (store, _dir) = store_with_hub().await;
        let mut ops = MockChannelOps::new();
        ops.expect_create_voice_channel().never();
        ops.expect_delete_channel().never();

        let hub = HubProvisioner::new(store);

        let mut bot = transition(None, Some(500));
        bot.is_bot = true;
        assert_eq!(hub.handle_transition(&ops, &bot).await, TransitionOutcome::default());

        // mute/deafen: mismo canal antes y después
        assert_eq!(
            hub.handle_transition(&ops, &transition(Some(500), Some(500))).await,
            TransitionOutcome::default()
        );
    }

    #[tokio::test]
    async fn externally_deleted_channel_is_forgotten() {
        let (store, _dir) = store_with_hub().await;
        let hub = HubProvisioner::new(store);
        hub.created().register(GUILD, ChannelId::new(900));
        hub.created().register(GUILD, ChannelId::new(901));

        hub.channel_deleted(GUILD, ChannelId::new(900));

        assert_eq!(hub.created().list(GUILD), vec![ChannelId::new(901)]);
    }
}
