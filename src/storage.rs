use async_trait::async_trait;
use serenity::model::id::GuildId;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

use crate::{
    audio::queue::GuildMusicState,
    error::{MusicError, MusicResult},
};

/// Almacén durable de estados de guild: lectura completa al arrancar y
/// escritura del registro entero después de cada mutación.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GuildStore: Send + Sync {
    async fn load_all(&self) -> MusicResult<HashMap<GuildId, GuildMusicState>>;

    async fn write(&self, guild_id: GuildId, state: &GuildMusicState) -> MusicResult<()>;
}

/// Almacenamiento basado en archivos JSON, uno por guild
pub struct JsonStorage {
    servers_dir: PathBuf,
}

impl JsonStorage {
    pub async fn new(data_dir: impl AsRef<Path>) -> MusicResult<Self> {
        let servers_dir = data_dir.as_ref().join("servers");
        fs::create_dir_all(&servers_dir)
            .await
            .map_err(|e| MusicError::Persistence(format!("{}: {}", servers_dir.display(), e)))?;

        info!("📁 Storage inicializado en: {}", data_dir.as_ref().display());
        Ok(Self { servers_dir })
    }

    fn guild_file_path(&self, guild_id: GuildId) -> PathBuf {
        self.servers_dir.join(format!("guild_{}.json", guild_id.get()))
    }

    async fn load_guild(&self, path: &Path) -> MusicResult<GuildMusicState> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| MusicError::Persistence(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| MusicError::Persistence(e.to_string()))
    }

    /// `guild_<id>.json` → id; cualquier otro nombre se ignora.
    fn guild_id_from_path(path: &Path) -> Option<GuildId> {
        if path.extension().map_or(true, |ext| ext != "json") {
            return None;
        }
        let stem = path.file_stem()?.to_str()?;
        let id: u64 = stem.strip_prefix("guild_")?.parse().ok()?;
        (id != 0).then(|| GuildId::new(id))
    }
}

#[async_trait]
impl GuildStore for JsonStorage {
    async fn load_all(&self) -> MusicResult<HashMap<GuildId, GuildMusicState>> {
        let mut guilds = HashMap::new();
        let mut files = fs::read_dir(&self.servers_dir)
            .await
            .map_err(|e| MusicError::Persistence(e.to_string()))?;

        while let Some(entry) = files
            .next_entry()
            .await
            .map_err(|e| MusicError::Persistence(e.to_string()))?
        {
            let path = entry.path();
            let Some(guild_id) = Self::guild_id_from_path(&path) else {
                continue;
            };

            match self.load_guild(&path).await {
                Ok(state) => {
                    guilds.insert(guild_id, state);
                }
                Err(e) => {
                    warn!("Error cargando estado para guild {}: {}", guild_id, e);
                }
            }
        }

        if !guilds.is_empty() {
            info!("📂 Cargados {} estados de guild", guilds.len());
        }
        Ok(guilds)
    }

    async fn write(&self, guild_id: GuildId, state: &GuildMusicState) -> MusicResult<()> {
        let path = self.guild_file_path(guild_id);
        let tmp_path = path.with_extension("json.tmp");
        let content =
            serde_json::to_string_pretty(state).map_err(|e| MusicError::Persistence(e.to_string()))?;

        // Escribir aparte y renombrar: nunca queda un registro a medias
        fs::write(&tmp_path, content)
            .await
            .map_err(|e| MusicError::Persistence(format!("{}: {}", tmp_path.display(), e)))?;
        fs::rename(&tmp_path, &path)
            .await
            .map_err(|e| MusicError::Persistence(format!("{}: {}", path.display(), e)))?;

        debug!("💾 Estado guardado para guild {}", guild_id);
        Ok(())
    }
}
