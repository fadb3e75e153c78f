//! Traduce un [`Command`] en una llamada al motor y el resultado en texto.

use std::sync::Arc;
use tracing::{debug, error, warn};

use super::commands::{Command, CommandKind};
use crate::{audio::engine::QueueEngine, error::MusicError, ui::messages};

pub struct Dispatcher {
    engine: Arc<QueueEngine>,
}

impl Dispatcher {
    pub fn new(engine: Arc<QueueEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<QueueEngine> {
        &self.engine
    }

    /// Ejecuta el comando y devuelve la respuesta para el canal.
    pub async fn dispatch(&self, command: &Command) -> String {
        let guild_id = command.guild_id;
        let channel_id = command.channel_id;
        let engine = &self.engine;

        debug!("📨 {:?} de {} en guild {}", command.kind, command.author_id, guild_id);

        let result = match &command.kind {
            CommandKind::Help => Ok(messages::help()),
            CommandKind::Unknown(verb) => Ok(messages::unknown(verb)),
            CommandKind::Queue => Ok(messages::queue(&engine.show_queue(guild_id).await)),
            CommandKind::Add(query) => engine
                .add_track(guild_id, channel_id, command.author_voice, query)
                .await
                .map(|outcome| messages::added(&outcome)),
            CommandKind::Skip => engine
                .skip(guild_id, channel_id)
                .await
                .map(|outcome| messages::skipped(&outcome)),
            CommandKind::TogglePlayback => engine
                .toggle_playback(guild_id, channel_id)
                .await
                .map(|outcome| messages::toggled(&outcome)),
            CommandKind::Remove(None) => Ok(messages::remove_usage()),
            CommandKind::Remove(Some(index)) => engine
                .remove_track(guild_id, channel_id, *index)
                .await
                .map(|track| messages::removed(*index, &track)),
            CommandKind::Undo => engine
                .undo(guild_id, channel_id)
                .await
                .map(|track| messages::undone(track.as_ref())),
            CommandKind::Clear => engine
                .clear(guild_id, channel_id)
                .await
                .map(messages::cleared),
            CommandKind::Join => engine
                .join(guild_id, channel_id, command.author_voice)
                .await
                .map(messages::joined),
            CommandKind::Disconnect => engine
                .disconnect(guild_id, channel_id)
                .await
                .map(|()| messages::disconnected()),
            CommandKind::MusicReg => engine
                .register_music_channel(guild_id, channel_id)
                .await
                .map(|()| messages::registered(channel_id)),
            CommandKind::MusicUnreg => engine
                .unregister_music_channel(guild_id)
                .await
                .map(messages::unregistered),
        };

        result.unwrap_or_else(|e| self.render_error(command, e))
    }

    fn render_error(&self, command: &Command, error: MusicError) -> String {
        if error.is_user_facing() {
            debug!("🙅 {:?} rechazado en guild {}: {}", command.kind, command.guild_id, error);
            return messages::user_error(&error).unwrap_or_else(messages::generic_failure);
        }

        match error {
            MusicError::Persistence(_) => {
                warn!("💾 {:?} revertido en guild {}: {}", command.kind, command.guild_id, error);
                messages::action_failed()
            }
            _ => {
                error!(
                    "❌ Error ejecutando {:?} en guild {} (canal {}): {}",
                    command.kind, command.guild_id, command.channel_id, error
                );
                messages::generic_failure()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use serenity::model::id::UserId;
    use std::sync::atomic::Ordering;

    fn command(kind: CommandKind, channel: serenity::model::id::ChannelId) -> Command {
        Command {
            kind,
            guild_id: guild(),
            channel_id: channel,
            author_id: UserId::new(42),
            author_voice: Some(voice_channel()),
        }
    }

    #[tokio::test]
    async fn test_add_then_queue() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());

        let reply = dispatcher
            .dispatch(&command(CommandKind::Add("song A".into()), music_channel()))
            .await;
        assert!(reply.contains("Added to queue: 0 **song A**"));
        assert!(reply.contains("Now playing"));

        let reply = dispatcher
            .dispatch(&command(CommandKind::Add("song B".into()), music_channel()))
            .await;
        assert_eq!(reply, "➕ Added to queue: 1 **song B** (0:03:25)");

        let reply = dispatcher.dispatch(&command(CommandKind::Queue, general_channel())).await;
        assert!(reply.starts_with("🎵 Now playing: **song A**"));
        assert!(reply.contains("1. **song B**"));
    }

    #[tokio::test]
    async fn test_wrong_channel_is_rejected() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());

        let reply = dispatcher.dispatch(&command(CommandKind::Skip, general_channel())).await;
        assert!(reply.contains("Not authorized in this channel"));
    }

    #[tokio::test]
    async fn test_user_not_in_voice() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());

        let mut cmd = command(CommandKind::Add("song A".into()), music_channel());
        cmd.author_voice = None;
        let reply = dispatcher.dispatch(&cmd).await;
        assert!(reply.contains("not connected to a voice channel"));
        assert!(harness.titles().await.is_empty());
    }

    #[tokio::test]
    async fn test_remove_replies() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());
        harness.add("a").await.unwrap();
        harness.add("b").await.unwrap();

        let reply = dispatcher.dispatch(&command(CommandKind::Remove(None), music_channel())).await;
        assert!(reply.contains("Usage"));

        let reply = dispatcher
            .dispatch(&command(CommandKind::Remove(Some(0)), music_channel()))
            .await;
        assert!(reply.contains("Invalid track index 0"));

        let reply = dispatcher
            .dispatch(&command(CommandKind::Remove(Some(1)), music_channel()))
            .await;
        assert_eq!(reply, "🗑️ Removed 1: **b**");
        assert_eq!(harness.titles().await, vec!["a"]);
    }

    #[tokio::test]
    async fn test_persistence_failure_reply() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());
        harness.store.fail_writes.store(true, Ordering::SeqCst);

        let reply = dispatcher
            .dispatch(&command(CommandKind::Add("song A".into()), music_channel()))
            .await;
        assert_eq!(reply, messages::action_failed());
        assert!(harness.titles().await.is_empty());
    }

    #[tokio::test]
    async fn test_registration_replies() {
        let harness = Harness::with_resolver(echo_resolver());
        harness.engine.ensure_guild(guild()).await.unwrap();
        let dispatcher = Dispatcher::new(harness.engine.clone());

        let reply = dispatcher.dispatch(&command(CommandKind::MusicUnreg, general_channel())).await;
        assert_eq!(reply, messages::unregistered(false));

        let reply = dispatcher.dispatch(&command(CommandKind::MusicReg, music_channel())).await;
        assert_eq!(reply, "📌 Music channel set to <#100>");
        assert_eq!(harness.engine.music_channel(guild()).await, Some(music_channel()));
    }

    #[tokio::test]
    async fn test_empty_queue_replies() {
        let harness = Harness::registered().await;
        let dispatcher = Dispatcher::new(harness.engine.clone());

        let reply = dispatcher.dispatch(&command(CommandKind::Undo, music_channel())).await;
        assert!(reply.contains("Queue is empty"));
        let reply = dispatcher.dispatch(&command(CommandKind::Queue, music_channel())).await;
        assert_eq!(reply, "📭 Queue is empty");
        let reply = dispatcher.dispatch(&command(CommandKind::Disconnect, music_channel())).await;
        assert!(reply.contains("not connected"));
    }
}
