//! # Queue Engine
//!
//! Autoridad única sobre la cola de cada guild y sobre las transiciones
//! `Disconnected → Idle → Playing ⇄ Paused`.
//!
//! ## Concurrencia
//!
//! Cada guild tiene su propio `tokio::sync::Mutex<GuildSlot>`; los comandos y
//! la señal de fin de track toman el mismo lock antes de leer o mutar la cola.
//! Guilds distintas nunca comparten lock. El resolver corre fuera del lock.
//!
//! ## Avance de la cola
//!
//! Mientras hay un track iniciado, `queue[0]` sólo sale por
//! [`QueueEngine::on_track_finished`]. `skip` se limita a pedir `stop()` al
//! sink; la señal de fin que provoca ese stop es la que avanza. Cada `play`
//! lleva un [`PlayId`] y las señales con un id distinto al activo se ignoran,
//! así un mismo track nunca avanza la cola dos veces.

use dashmap::{mapref::entry::Entry, DashMap};
use serenity::model::id::{ChannelId, GuildId};
use std::{
    sync::{
        atomic::{AtomicU32, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    queue::{GuildMusicState, Track},
    sink::{AudioSink, Completion, CompletionReceiver, PlayId},
};
use crate::{
    error::{MusicError, MusicResult},
    sources::MediaResolver,
    storage::GuildStore,
};

/// A partir de cuántos fallos seguidos de escritura se avisa como problema de salud.
const PERSISTENCE_ALERT_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Disconnected,
    Idle,
    Playing,
    Paused,
}

impl PlaybackState {
    pub fn is_connected(self) -> bool {
        self != Self::Disconnected
    }
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub resolve_timeout: Duration,
    pub completion_lock_timeout: Duration,
    pub max_queue_size: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resolve_timeout: Duration::from_secs(30),
            completion_lock_timeout: Duration::from_secs(5),
            max_queue_size: 500,
        }
    }
}

#[derive(Debug, Default)]
struct GuildSlot {
    state: GuildMusicState,
    playback: PlaybackState,
    active_play: Option<PlayId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddOutcome {
    pub position: usize,
    pub track: Track,
    /// `true` si este add arrancó la reproducción.
    pub started: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipOutcome {
    /// Se pidió `stop()`; la cola avanza con la señal de fin.
    Stopping(Track),
    /// No había reproducción iniciada: el track salió directamente.
    Removed(Track),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    Paused(Track),
    Resumed(Track),
    Started(Track),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    Joined,
    AlreadyConnected,
}

/// Vista de sólo lectura de la cola de una guild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueView {
    pub now_playing: Option<Track>,
    pub pending: Vec<Track>,
    pub playback: PlaybackState,
}

/// Aviso de "ahora suena" cuando la cola avanza sola.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Announcement {
    pub channel_id: ChannelId,
    pub track: Track,
}

pub struct QueueEngine {
    guilds: DashMap<GuildId, Arc<Mutex<GuildSlot>>>,
    store: Arc<dyn GuildStore>,
    resolver: Arc<dyn MediaResolver>,
    sink: Arc<dyn AudioSink>,
    settings: EngineSettings,
    announcements: Option<flume::Sender<Announcement>>,
    next_play_id: AtomicU64,
    persistence_failures: AtomicU32,
}

impl QueueEngine {
    pub fn new(
        store: Arc<dyn GuildStore>,
        resolver: Arc<dyn MediaResolver>,
        sink: Arc<dyn AudioSink>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            guilds: DashMap::new(),
            store,
            resolver,
            sink,
            settings,
            announcements: None,
            next_play_id: AtomicU64::new(1),
            persistence_failures: AtomicU32::new(0),
        }
    }

    pub fn with_announcements(mut self, announcements: flume::Sender<Announcement>) -> Self {
        self.announcements = Some(announcements);
        self
    }

    /// Carga todas las guilds persistidas. Arrancan desconectadas.
    pub async fn restore(&self) -> MusicResult<usize> {
        let stored = self.store.load_all().await?;
        let count = stored.len();

        for (guild_id, state) in stored {
            let slot = GuildSlot {
                state,
                ..GuildSlot::default()
            };
            self.guilds.insert(guild_id, Arc::new(Mutex::new(slot)));
        }

        info!("📂 {} guilds restauradas", count);
        Ok(count)
    }

    /// Crea y persiste el estado por defecto la primera vez que se ve una guild.
    pub async fn ensure_guild(&self, guild_id: GuildId) -> MusicResult<()> {
        let slot = match self.guilds.entry(guild_id) {
            Entry::Occupied(_) => return Ok(()),
            Entry::Vacant(vacant) => vacant.insert(Arc::default()).clone(),
        };

        let guard = slot.lock().await;
        if let Err(e) = self.store.write(guild_id, &guard.state).await {
            // Sin registro en disco la guild no cuenta como vista; el próximo mensaje reintenta
            drop(guard);
            self.guilds.remove_if(&guild_id, |_, existing| Arc::ptr_eq(existing, &slot));
            return Err(e);
        }
        info!("📝 Estado por defecto creado para guild {}", guild_id);
        Ok(())
    }

    pub async fn add_track(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        user_voice: Option<ChannelId>,
        query: &str,
    ) -> MusicResult<AddOutcome> {
        let slot = self.slot(guild_id);

        // Validar antes de gastar una llamada al resolver
        {
            let guard = slot.lock().await;
            Self::authorize(&guard, channel_id)?;
            if !guard.playback.is_connected() && user_voice.is_none() {
                return Err(MusicError::UserNotInVoice);
            }
            self.check_capacity(&guard)?;
        }

        let track: Track = tokio::time::timeout(self.settings.resolve_timeout, self.resolver.resolve(query))
            .await
            .map_err(|_| {
                warn!("⌛ Timeout resolviendo {:?} en guild {}", query, guild_id);
                MusicError::Resolution(format!("timed out after {:?}", self.settings.resolve_timeout))
            })??
            .into();

        let mut guard = slot.lock().await;
        // El estado pudo cambiar mientras se resolvía
        Self::authorize(&guard, channel_id)?;
        self.check_capacity(&guard)?;

        if !guard.playback.is_connected() {
            let voice = user_voice.ok_or(MusicError::UserNotInVoice)?;
            self.sink.join(guild_id, voice).await?;
            guard.playback = PlaybackState::Idle;
        }

        let snapshot = guard.state.clone();
        let position = guard.state.push(track.clone());
        self.commit(guild_id, &mut guard, snapshot).await?;

        let mut started = false;
        if guard.state.len() == 1 && guard.playback == PlaybackState::Idle {
            match self.start_head(guild_id, &mut guard).await {
                Ok(_) => started = true,
                Err(e) => error!("Error al iniciar reproducción en guild {}: {}", guild_id, e),
            }
        }

        Ok(AddOutcome {
            position,
            track,
            started,
        })
    }

    pub async fn skip(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<SkipOutcome> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        let head = guard.state.head().cloned().ok_or(MusicError::QueueEmpty)?;

        let started = matches!(guard.playback, PlaybackState::Playing | PlaybackState::Paused)
            && guard.active_play.is_some();
        if started {
            self.sink.stop(guild_id).await?;
            info!("⏭️ Stop pedido para {} en guild {}", head.title, guild_id);
            return Ok(SkipOutcome::Stopping(head));
        }

        let snapshot = guard.state.clone();
        guard.state.pop_head();
        self.commit(guild_id, &mut guard, snapshot).await?;
        Ok(SkipOutcome::Removed(head))
    }

    pub async fn toggle_playback(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<ToggleOutcome> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        match guard.playback {
            PlaybackState::Disconnected => Err(MusicError::NotConnected),
            PlaybackState::Playing => {
                let head = guard.state.head().cloned().ok_or(MusicError::QueueEmpty)?;
                self.sink.pause(guild_id).await?;
                guard.playback = PlaybackState::Paused;
                Ok(ToggleOutcome::Paused(head))
            }
            PlaybackState::Paused => {
                let head = guard.state.head().cloned().ok_or(MusicError::QueueEmpty)?;
                self.sink.resume(guild_id).await?;
                guard.playback = PlaybackState::Playing;
                Ok(ToggleOutcome::Resumed(head))
            }
            PlaybackState::Idle => {
                if guard.state.is_empty() {
                    return Err(MusicError::QueueEmpty);
                }
                let head = self.start_head(guild_id, &mut guard).await?;
                Ok(ToggleOutcome::Started(head))
            }
        }
    }

    pub async fn remove_track(&self, guild_id: GuildId, channel_id: ChannelId, index: usize) -> MusicResult<Track> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;
        self.remove_locked(guild_id, &mut guard, index).await
    }

    /// Quita el último track agregado; con uno o ningún track no hace nada.
    pub async fn undo(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<Option<Track>> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        let len = guard.state.len();
        if len <= 1 {
            return Ok(None);
        }
        self.remove_locked(guild_id, &mut guard, len - 1).await.map(Some)
    }

    /// Vacía los pendientes; el track actual sigue sonando.
    pub async fn clear(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<usize> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        let snapshot = guard.state.clone();
        let removed = guard.state.clear_pending().len();
        if removed > 0 {
            self.commit(guild_id, &mut guard, snapshot).await?;
        }
        Ok(removed)
    }

    /// Transición de fin de track. Devuelve el track que empezó a sonar, si hay.
    pub async fn on_track_finished(&self, completion: Completion) -> MusicResult<Option<Track>> {
        let Completion { guild_id, play_id } = completion;
        let Some(slot) = self.guilds.get(&guild_id).map(|s| s.clone()) else {
            warn!("Fin de track #{} para guild desconocida {}", play_id, guild_id);
            return Ok(None);
        };

        let mut guard = self.lock_for_completion(&slot, completion).await?;
        if guard.active_play != Some(play_id) {
            debug!(
                "Fin de track #{} ignorado en guild {} (activo: {:?})",
                play_id, guild_id, guard.active_play
            );
            return Ok(None);
        }
        guard.active_play = None;

        let snapshot = guard.state.clone();
        let finished = guard.state.pop_head();
        if let Err(e) = self.commit(guild_id, &mut guard, snapshot).await {
            // El track terminado vuelve a quedar en la cabeza; se reanuda con `p`
            guard.playback = PlaybackState::Idle;
            return Err(e);
        }
        if let Some(finished) = finished {
            info!("🎵 Terminó {} en guild {}", finished.title, guild_id);
        }

        if guard.state.is_empty() {
            info!("📭 Cola vacía en guild {}", guild_id);
            if guard.playback.is_connected() {
                guard.playback = PlaybackState::Idle;
            }
            return Ok(None);
        }
        if !guard.playback.is_connected() {
            return Ok(None);
        }

        let next = self.start_head(guild_id, &mut guard).await?;
        if let (Some(tx), Some(channel_id)) = (&self.announcements, guard.state.music_channel_id) {
            let _ = tx.send(Announcement {
                channel_id,
                track: next.clone(),
            });
        }
        Ok(Some(next))
    }

    /// Consume señales de fin hasta que se cancele el token o se cierre el canal.
    pub async fn run_completions(self: Arc<Self>, completions: CompletionReceiver, shutdown: CancellationToken) {
        info!("🎧 Escuchando fines de track");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("⚠️ Motor detenido, no se procesan más fines de track");
                    break;
                }
                received = completions.recv_async() => {
                    let Ok(completion) = received else {
                        warn!("Canal de completions cerrado");
                        break;
                    };
                    let engine = self.clone();
                    tokio::spawn(async move {
                        if let Err(e) = engine.on_track_finished(completion).await {
                            error!("Error al avanzar la cola en guild {}: {}", completion.guild_id, e);
                        }
                    });
                }
            }
        }
    }

    pub async fn show_queue(&self, guild_id: GuildId) -> QueueView {
        let Some(slot) = self.guilds.get(&guild_id).map(|s| s.clone()) else {
            return QueueView {
                now_playing: None,
                pending: Vec::new(),
                playback: PlaybackState::Disconnected,
            };
        };

        let guard = slot.lock().await;
        QueueView {
            now_playing: guard.state.head().cloned(),
            pending: guard.state.queue.iter().skip(1).cloned().collect(),
            playback: guard.playback,
        }
    }

    pub async fn join(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
        user_voice: Option<ChannelId>,
    ) -> MusicResult<JoinOutcome> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        let voice = user_voice.ok_or(MusicError::UserNotInVoice)?;
        if guard.playback.is_connected() {
            return Ok(JoinOutcome::AlreadyConnected);
        }

        self.sink.join(guild_id, voice).await?;
        guard.playback = PlaybackState::Idle;
        Ok(JoinOutcome::Joined)
    }

    /// Sale del canal de voz. La cola se conserva.
    pub async fn disconnect(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;
        Self::authorize(&guard, channel_id)?;

        if !guard.playback.is_connected() {
            return Err(MusicError::NotConnected);
        }

        self.sink.leave(guild_id).await?;
        guard.playback = PlaybackState::Disconnected;
        guard.active_play = None;
        Ok(())
    }

    /// El gateway avisó que el bot salió de voz sin pasar por `disconnect`.
    pub async fn handle_voice_lost(&self, guild_id: GuildId) {
        let Some(slot) = self.guilds.get(&guild_id).map(|s| s.clone()) else {
            return;
        };

        let mut guard = slot.lock().await;
        if !guard.playback.is_connected() {
            return;
        }

        info!("🔌 Bot desconectado externamente en guild {}", guild_id);
        guard.playback = PlaybackState::Disconnected;
        guard.active_play = None;

        // El Call de songbird sigue vivo con su track; se libera antes del próximo join
        if let Err(e) = self.sink.stop(guild_id).await {
            warn!("No se pudo detener el track huérfano en guild {}: {}", guild_id, e);
        }
        if let Err(e) = self.sink.leave(guild_id).await {
            warn!("No se pudo liberar la llamada de voz en guild {}: {}", guild_id, e);
        }
    }

    pub async fn register_music_channel(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;

        let snapshot = guard.state.clone();
        guard.state.music_channel_id = Some(channel_id);
        self.commit(guild_id, &mut guard, snapshot).await?;
        info!("📌 Canal de música {} registrado en guild {}", channel_id, guild_id);
        Ok(())
    }

    /// Devuelve `false` si no había canal registrado.
    pub async fn unregister_music_channel(&self, guild_id: GuildId) -> MusicResult<bool> {
        let slot = self.slot(guild_id);
        let mut guard = slot.lock().await;

        if guard.state.music_channel_id.is_none() {
            return Ok(false);
        }

        let snapshot = guard.state.clone();
        guard.state.music_channel_id = None;
        self.commit(guild_id, &mut guard, snapshot).await?;
        info!("📌 Canal de música eliminado en guild {}", guild_id);
        Ok(true)
    }

    pub async fn music_channel(&self, guild_id: GuildId) -> Option<ChannelId> {
        let slot = self.guilds.get(&guild_id).map(|s| s.clone())?;
        let guard = slot.lock().await;
        guard.state.music_channel_id
    }

    // Métodos privados

    fn slot(&self, guild_id: GuildId) -> Arc<Mutex<GuildSlot>> {
        self.guilds.entry(guild_id).or_default().clone()
    }

    fn authorize(slot: &GuildSlot, channel_id: ChannelId) -> MusicResult<()> {
        if slot.state.is_music_channel(channel_id) {
            Ok(())
        } else {
            Err(MusicError::NotAuthorizedChannel)
        }
    }

    fn check_capacity(&self, slot: &GuildSlot) -> MusicResult<()> {
        if slot.state.len() >= self.settings.max_queue_size {
            return Err(MusicError::QueueFull {
                max: self.settings.max_queue_size,
            });
        }
        Ok(())
    }

    async fn remove_locked(&self, guild_id: GuildId, slot: &mut GuildSlot, index: usize) -> MusicResult<Track> {
        let snapshot = slot.state.clone();
        let removed = slot.state.remove(index)?;
        self.commit(guild_id, slot, snapshot).await?;
        Ok(removed)
    }

    /// Persiste el estado; si falla, restaura `snapshot` en memoria.
    async fn commit(&self, guild_id: GuildId, slot: &mut GuildSlot, snapshot: GuildMusicState) -> MusicResult<()> {
        match self.store.write(guild_id, &slot.state).await {
            Ok(()) => {
                self.persistence_failures.store(0, Ordering::Relaxed);
                Ok(())
            }
            Err(e) => {
                slot.state = snapshot;
                let failures = self.persistence_failures.fetch_add(1, Ordering::Relaxed) + 1;
                if failures >= PERSISTENCE_ALERT_THRESHOLD {
                    error!("💥 {} escrituras seguidas fallidas; último error: {}", failures, e);
                } else {
                    error!("Error guardando estado de guild {}: {}", guild_id, e);
                }
                Err(e)
            }
        }
    }

    /// Manda `queue[0]` al sink y pasa a `Playing`.
    async fn start_head(&self, guild_id: GuildId, slot: &mut GuildSlot) -> MusicResult<Track> {
        let head = slot.state.head().cloned().ok_or(MusicError::QueueEmpty)?;
        let play_id = self.next_play_id.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.sink.play(guild_id, play_id, &head.stream_url).await {
            slot.playback = PlaybackState::Idle;
            slot.active_play = None;
            return Err(e);
        }

        slot.active_play = Some(play_id);
        slot.playback = PlaybackState::Playing;
        info!("🎵 Reproduciendo: {} ({}) en guild {}", head.title, head.duration, guild_id);
        Ok(head)
    }

    /// El lock de la guild se intenta dos veces antes de descartar la señal.
    async fn lock_for_completion<'a>(
        &self,
        slot: &'a Mutex<GuildSlot>,
        completion: Completion,
    ) -> MusicResult<MutexGuard<'a, GuildSlot>> {
        for attempt in 1..=2 {
            match tokio::time::timeout(self.settings.completion_lock_timeout, slot.lock()).await {
                Ok(guard) => return Ok(guard),
                Err(_) => warn!(
                    "Lock de guild {} ocupado para fin de track #{} (intento {})",
                    completion.guild_id, completion.play_id, attempt
                ),
            }
        }

        error!(
            "Fin de track #{} descartado en guild {}: lock no disponible",
            completion.play_id, completion.guild_id
        );
        Err(MusicError::Internal("guild lock unavailable".to_string()))
    }
}
