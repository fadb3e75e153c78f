use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};

use crate::error::MusicResult;

/// Identificador de una llamada a `play`. Cada señal de fin lo trae de vuelta.
pub type PlayId = u64;

/// Señal de fin de un track: terminó, se detuvo o falló.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub guild_id: GuildId,
    pub play_id: PlayId,
}

pub type CompletionSender = flume::Sender<Completion>;
pub type CompletionReceiver = flume::Receiver<Completion>;

pub fn completion_channel() -> (CompletionSender, CompletionReceiver) {
    flume::unbounded()
}

/// Salida de audio por guild: un único stream activo.
///
/// Cada `play` debe producir exactamente una [`Completion`] con su `play_id`
/// cuando el stream termina, falla o se detiene con `stop`.
#[async_trait]
pub trait AudioSink: Send + Sync {
    async fn join(&self, guild_id: GuildId, channel_id: ChannelId) -> MusicResult<()>;

    async fn leave(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn play(&self, guild_id: GuildId, play_id: PlayId, stream_url: &str) -> MusicResult<()>;

    async fn pause(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn resume(&self, guild_id: GuildId) -> MusicResult<()>;

    async fn stop(&self, guild_id: GuildId) -> MusicResult<()>;
}
