use anyhow::{Context, Result};
use parking_lot::RwLock;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};
use tokio::{fs, sync::Mutex};
use tracing::{info, warn};

/// Canal "hub" configurado por servidor, persistido en un JSON plano.
///
/// Formato en disco: `{"<guild_id>": <channel_id>, ...}`. El archivo se
/// reescribe completo en cada cambio; si no existe, la configuración está vacía.
pub struct HubChannelStore {
    path: PathBuf,
    hubs: RwLock<HashMap<GuildId, ChannelId>>,
    // serializa las escrituras a disco
    write_lock: Mutex<()>,
}

impl HubChannelStore {
    pub async fn load(path: PathBuf) -> Result<Self> {
        let hubs = match fs::try_exists(&path).await {
            Ok(true) => Self::read_file(&path).await?,
            _ => {
                info!("📁 Sin configuración de canales hub en {}", path.display());
                HashMap::new()
            }
        };

        info!("📋 {} canales hub cargados", hubs.len());
        Ok(Self {
            path,
            hubs: RwLock::new(hubs),
            write_lock: Mutex::new(()),
        })
    }

    async fn read_file(path: &Path) -> Result<HashMap<GuildId, ChannelId>> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("reading {}", path.display()))?;
        let raw: HashMap<String, u64> = serde_json::from_str(&content)
            .with_context(|| format!("parsing {}", path.display()))?;

        let mut hubs = HashMap::new();
        for (guild, channel) in raw {
            match guild.parse::<u64>() {
                Ok(guild) if guild != 0 && channel != 0 => {
                    hubs.insert(GuildId::new(guild), ChannelId::new(channel));
                }
                _ => warn!("⚠️ Entrada inválida en configuración hub: {} -> {}", guild, channel),
            }
        }
        Ok(hubs)
    }

    pub fn get(&self, guild_id: GuildId) -> Option<ChannelId> {
        self.hubs.read().get(&guild_id).copied()
    }

    pub fn is_hub(&self, guild_id: GuildId, channel_id: ChannelId) -> bool {
        self.get(guild_id) == Some(channel_id)
    }

    /// Fija el hub del servidor (reemplaza el anterior) y persiste.
    pub async fn set(&self, guild_id: GuildId, channel_id: ChannelId) -> Result<()> {
        self.hubs.write().insert(guild_id, channel_id);
        self.save().await?;
        info!("💾 Canal hub {} configurado para guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Quita el hub del servidor. Devuelve el canal que estaba configurado.
    pub async fn remove(&self, guild_id: GuildId) -> Result<Option<ChannelId>> {
        let removed = self.hubs.write().remove(&guild_id);
        if removed.is_some() {
            self.save().await?;
            info!("🗑️ Canal hub eliminado para guild {}", guild_id);
        }
        Ok(removed)
    }

    async fn save(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let snapshot: BTreeMap<String, u64> = self
            .hubs
            .read()
            .iter()
            .map(|(guild, channel)| (guild.get().to_string(), channel.get()))
            .collect();
        let json = serde_json::to_string_pretty(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("writing {}", self.path.display()))?;
        Ok(())
    }
}
