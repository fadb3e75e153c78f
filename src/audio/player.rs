use async_trait::async_trait;
use dashmap::DashMap;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::HttpRequest,
    tracks::TrackHandle,
    Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tracing::{debug, error, info, warn};

use super::sink::{AudioSink, Completion, CompletionSender, PlayId};
use crate::error::{MusicError, MusicResult};

/// Sink de audio sobre songbird: un track activo por guild.
pub struct SongbirdSink {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    current_tracks: DashMap<GuildId, TrackHandle>,
    completions: CompletionSender,
}

impl SongbirdSink {
    pub fn new(manager: Arc<Songbird>, completions: CompletionSender) -> Self {
        Self {
            manager,
            http: reqwest::Client::new(),
            current_tracks: DashMap::new(),
            completions,
        }
    }

    fn current(&self, guild_id: GuildId) -> MusicResult<TrackHandle> {
        self.current_tracks
            .get(&guild_id)
            .map(|t| t.clone())
            .ok_or_else(|| MusicError::Voice("no hay track activo".to_string()))
    }
}

#[async_trait]
impl AudioSink for SongbirdSink {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        match self.manager.join(guild_id, channel_id).await {
            Ok(_) => {
                info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);
                Ok(())
            }
            Err(e) => {
                error!("Error al conectar al canal de voz: {:?}", e);
                Err(MusicError::Voice(format!("error al conectar: {}", e)))
            }
        }
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.current_tracks.remove(&guild_id);
        self.manager
            .remove(guild_id)
            .await
            .map_err(|e| MusicError::Voice(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", guild_id);
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, play_id: PlayId, stream_url: &str) -> MusicResult<()> {
        let call = self.manager.get(guild_id).ok_or(MusicError::NotConnected)?;

        let input = HttpRequest::new(self.http.clone(), stream_url.to_string());
        // play_only_input corta cualquier track que haya quedado en el Call
        let track_handle = {
            let mut handler_lock = call.lock().await;
            handler_lock.play_only_input(input.into())
        };

        // End y Error comparten la bandera: una sola señal por play
        let notifier = TrackEndNotifier {
            guild_id,
            play_id,
            fired: Arc::new(AtomicBool::new(false)),
            completions: self.completions.clone(),
        };
        for event in [TrackEvent::End, TrackEvent::Error] {
            track_handle
                .add_event(Event::Track(event), notifier.clone())
                .map_err(|e| MusicError::Voice(format!("error al agregar event handler: {}", e)))?;
        }

        self.current_tracks.insert(guild_id, track_handle);
        debug!("▶️ Play #{} en guild {}", play_id, guild_id);
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        self.current(guild_id)?
            .pause()
            .map_err(|e| MusicError::Voice(e.to_string()))?;
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.current(guild_id)?
            .play()
            .map_err(|e| MusicError::Voice(e.to_string()))?;
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        if let Some((_, track)) = self.current_tracks.remove(&guild_id) {
            track.stop().map_err(|e| MusicError::Voice(e.to_string()))?;
            info!("⏹️ Track detenido en guild {}", guild_id);
        }
        Ok(())
    }
}

/// Reenvía el fin (o error) de un track al canal de completions del motor.
#[derive(Clone)]
struct TrackEndNotifier {
    guild_id: GuildId,
    play_id: PlayId,
    fired: Arc<AtomicBool>,
    completions: CompletionSender,
}

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        if let EventContext::Track(track_list) = ctx {
            for (state, _handle) in *track_list {
                debug!("Track #{} terminó en guild {}: {:?}", self.play_id, self.guild_id, state.playing);
            }
        }

        if self.fired.swap(true, Ordering::SeqCst) {
            return None;
        }

        let completion = Completion {
            guild_id: self.guild_id,
            play_id: self.play_id,
        };
        if self.completions.send(completion).is_err() {
            warn!("Canal de completions cerrado; fin de track #{} descartado", self.play_id);
        }

        None
    }
}
