//! # Bot Module
//!
//! Capa de Discord: recibe mensajes de texto, los convierte en comandos y
//! responde en el mismo canal.
//!
//! [`JukeboxBot`] implementa el [`EventHandler`] de serenity. No guarda estado
//! de música propio; todo pasa por el [`Dispatcher`] hacia el motor.

use serenity::{
    all::{ChannelId, Context, EventHandler, GuildId, Message, Ready, UserId, VoiceState},
    async_trait,
};
use tracing::{error, info, warn};

pub mod commands;
pub mod dispatcher;
pub mod events;

use self::{
    commands::{Command, CommandKind},
    dispatcher::Dispatcher,
};

pub struct JukeboxBot {
    dispatcher: Dispatcher,
}

impl JukeboxBot {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }

    /// Canal de voz del usuario según la caché de serenity.
    fn author_voice(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelId> {
        let guild = ctx.cache.guild(guild_id)?;
        let channel_id = guild.voice_states.get(&user_id).and_then(|state| state.channel_id);
        channel_id
    }
}

#[async_trait]
impl EventHandler for JukeboxBot {
    async fn ready(&self, _ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());
    }

    async fn message(&self, ctx: Context, msg: Message) {
        if msg.author.bot {
            return;
        }
        // Mensajes directos no tienen cola
        let Some(guild_id) = msg.guild_id else {
            return;
        };

        let engine = self.dispatcher.engine();
        if let Err(e) = engine.ensure_guild(guild_id).await {
            error!("Error al crear estado de guild {}: {}", guild_id, e);
        }

        let in_music_channel = engine.music_channel(guild_id).await == Some(msg.channel_id);
        let Some(kind) = commands::parse(&msg.content, in_music_channel) else {
            return;
        };

        // La búsqueda puede tardar; mostrar que se está trabajando
        if matches!(kind, CommandKind::Add(_)) {
            let _ = msg.channel_id.broadcast_typing(&ctx.http).await;
        }

        let command = Command {
            kind,
            guild_id,
            channel_id: msg.channel_id,
            author_id: msg.author.id,
            author_voice: Self::author_voice(&ctx, guild_id, msg.author.id),
        };

        let reply = self.dispatcher.dispatch(&command).await;
        if let Err(e) = msg.channel_id.say(&ctx.http, reply).await {
            warn!("No se pudo responder en canal {}: {:?}", msg.channel_id, e);
        }
    }

    async fn voice_state_update(&self, ctx: Context, _old: Option<VoiceState>, new: VoiceState) {
        // Detectar si el bot fue desconectado; el estado previo puede no estar en caché
        let current_user_id = ctx.cache.current_user().id;
        if let Some(guild_id) = bot_left_voice(current_user_id, new.user_id, new.guild_id, new.channel_id) {
            self.dispatcher.engine().handle_voice_lost(guild_id).await;
        }
    }
}

/// Guild en la que el bot quedó fuera de voz, si la actualización es suya y sin canal.
fn bot_left_voice(
    bot_id: UserId,
    user_id: UserId,
    guild_id: Option<GuildId>,
    channel_id: Option<ChannelId>,
) -> Option<GuildId> {
    if user_id != bot_id || channel_id.is_some() {
        return None;
    }
    guild_id
}
