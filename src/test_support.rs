//! Dobles de prueba para manejar el motor sin Discord ni disco.

use async_trait::async_trait;
use parking_lot::Mutex;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
};

use crate::{
    audio::{
        engine::{EngineSettings, QueueEngine},
        queue::GuildMusicState,
        sink::{AudioSink, PlayId},
    },
    error::{MusicError, MusicResult},
    sources::{MockMediaResolver, ResolvedTrack},
    storage::GuildStore,
};

pub fn guild() -> GuildId {
    GuildId::new(1)
}

pub fn other_guild() -> GuildId {
    GuildId::new(2)
}

pub fn music_channel() -> ChannelId {
    ChannelId::new(100)
}

pub fn general_channel() -> ChannelId {
    ChannelId::new(200)
}

pub fn voice_channel() -> ChannelId {
    ChannelId::new(300)
}

pub fn resolved(query: &str) -> ResolvedTrack {
    ResolvedTrack {
        stream_url: format!("https://cdn.example/{}", query.replace(' ', "-")),
        title: query.to_string(),
        duration: Some(205),
        is_live: false,
    }
}

/// Resolver que devuelve un track con el título igual a la búsqueda.
pub fn echo_resolver() -> MockMediaResolver {
    let mut resolver = MockMediaResolver::new();
    resolver.expect_resolve().returning(|query| Ok(resolved(query)));
    resolver
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    Join(ChannelId),
    Leave,
    Play(PlayId, String),
    Pause,
    Resume,
    Stop,
}

/// Sink que sólo anota las órdenes recibidas.
#[derive(Default)]
pub struct FakeSink {
    calls: Mutex<Vec<(GuildId, SinkCall)>>,
    pub fail_play: AtomicBool,
}

impl FakeSink {
    pub fn calls(&self, guild_id: GuildId) -> Vec<SinkCall> {
        self.calls
            .lock()
            .iter()
            .filter(|(g, _)| *g == guild_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn count(&self, guild_id: GuildId, matches: impl Fn(&SinkCall) -> bool) -> usize {
        self.calls(guild_id).iter().filter(|c| matches(c)).count()
    }

    pub fn last_play_id(&self, guild_id: GuildId) -> Option<PlayId> {
        self.calls(guild_id).iter().rev().find_map(|call| match call {
            SinkCall::Play(id, _) => Some(*id),
            _ => None,
        })
    }

    fn record(&self, guild_id: GuildId, call: SinkCall) {
        self.calls.lock().push((guild_id, call));
    }
}

#[async_trait]
impl AudioSink for FakeSink {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()> {
        self.record(guild_id, SinkCall::Join(channel_id));
        Ok(())
    }

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()> {
        self.record(guild_id, SinkCall::Leave);
        Ok(())
    }

    async fn play(&self, guild_id: GuildId, play_id: PlayId, stream_url: &str) -> MusicResult<()> {
        if self.fail_play.load(Ordering::SeqCst) {
            return Err(MusicError::Voice("play failed".to_string()));
        }
        self.record(guild_id, SinkCall::Play(play_id, stream_url.to_string()));
        Ok(())
    }

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()> {
        self.record(guild_id, SinkCall::Pause);
        Ok(())
    }

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()> {
        self.record(guild_id, SinkCall::Resume);
        Ok(())
    }

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()> {
        self.record(guild_id, SinkCall::Stop);
        Ok(())
    }
}

/// Store en memoria con fallos de escritura a pedido.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<GuildId, GuildMusicState>>,
    pub fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryStore {
    pub fn record(&self, guild_id: GuildId) -> Option<GuildMusicState> {
        self.records.lock().get(&guild_id).cloned()
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GuildStore for MemoryStore {
    async fn load_all(&self) -> MusicResult<HashMap<GuildId, GuildMusicState>> {
        Ok(self.records.lock().clone())
    }

    async fn write(&self, guild_id: GuildId, state: &GuildMusicState) -> MusicResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(MusicError::Persistence("disk full".to_string()));
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.records.lock().insert(guild_id, state.clone());
        Ok(())
    }
}

pub struct Harness {
    pub engine: Arc<QueueEngine>,
    pub sink: Arc<FakeSink>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn with_resolver(resolver: MockMediaResolver) -> Self {
        Self::with_settings(resolver, EngineSettings::default())
    }

    pub fn with_settings(resolver: MockMediaResolver, settings: EngineSettings) -> Self {
        let sink = Arc::new(FakeSink::default());
        let store = Arc::new(MemoryStore::default());
        let engine = QueueEngine::new(store.clone(), Arc::new(resolver), sink.clone(), settings);
        Self {
            engine: Arc::new(engine),
            sink,
            store,
        }
    }

    /// Guild vista y con canal de música registrado.
    pub async fn registered() -> Self {
        let harness = Self::with_resolver(echo_resolver());
        harness.engine.ensure_guild(guild()).await.unwrap();
        harness
            .engine
            .register_music_channel(guild(), music_channel())
            .await
            .unwrap();
        harness
    }

    pub async fn add(&self, query: &str) -> MusicResult<crate::audio::engine::AddOutcome> {
        self.engine
            .add_track(guild(), music_channel(), Some(voice_channel()), query)
            .await
    }

    pub async fn titles(&self) -> Vec<String> {
        let view = self.engine.show_queue(guild()).await;
        view.now_playing
            .into_iter()
            .chain(view.pending)
            .map(|t| t.title)
            .collect()
    }

    /// Simula la señal de fin del último `play`.
    pub async fn finish_current(&self) -> MusicResult<Option<crate::audio::queue::Track>> {
        let play_id = self.sink.last_play_id(guild()).expect("hubo un play");
        self.engine
            .on_track_finished(crate::audio::sink::Completion {
                guild_id: guild(),
                play_id,
            })
            .await
    }
}
