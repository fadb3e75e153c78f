//! Textos de respuesta del bot.
//!
//! Todas las respuestas son texto plano; el dispatcher elige cuál según el
//! resultado de la operación.

use serenity::model::id::ChannelId;

use crate::{
    audio::{
        engine::{AddOutcome, JoinOutcome, PlaybackState, QueueView, SkipOutcome, ToggleOutcome},
        queue::Track,
    },
    bot::commands::PREFIX,
    error::MusicError,
};

/// Límite práctico para no pasar los 2000 caracteres de un mensaje de Discord.
const MAX_LISTED: usize = 15;

fn describe(track: &Track) -> String {
    format!("**{}** ({})", track.title, track.duration)
}

pub fn now_playing(track: &Track) -> String {
    format!("🎵 Now playing: {}", describe(track))
}

pub fn added(outcome: &AddOutcome) -> String {
    let line = format!("➕ Added to queue: {} {}", outcome.position, describe(&outcome.track));
    if outcome.started {
        format!("{}\n{}", line, now_playing(&outcome.track))
    } else {
        line
    }
}

pub fn skipped(outcome: &SkipOutcome) -> String {
    match outcome {
        SkipOutcome::Stopping(track) | SkipOutcome::Removed(track) => {
            format!("⏭️ Skipped: **{}**", track.title)
        }
    }
}

pub fn toggled(outcome: &ToggleOutcome) -> String {
    match outcome {
        ToggleOutcome::Paused(track) => format!("⏸️ Paused: **{}**", track.title),
        ToggleOutcome::Resumed(track) => format!("▶️ Resumed: {}", describe(track)),
        ToggleOutcome::Started(track) => now_playing(track),
    }
}

pub fn removed(index: usize, track: &Track) -> String {
    format!("🗑️ Removed {}: **{}**", index, track.title)
}

pub fn undone(track: Option<&Track>) -> String {
    match track {
        Some(track) => format!("↩️ Removed last added track: **{}**", track.title),
        None => "📭 Queue is empty, nothing to undo".to_string(),
    }
}

pub fn cleared(count: usize) -> String {
    if count == 0 {
        "📭 Queue is empty, nothing to clear".to_string()
    } else {
        format!("🗑️ Cleared {} pending tracks", count)
    }
}

pub fn remove_usage() -> String {
    format!("❌ Usage: `{}remove <index>` (see `{}queue` for positions)", PREFIX, PREFIX)
}

pub fn joined(outcome: JoinOutcome) -> String {
    match outcome {
        JoinOutcome::Joined => "🔊 Joined your voice channel".to_string(),
        JoinOutcome::AlreadyConnected => "🔊 Already connected to a voice channel".to_string(),
    }
}

pub fn disconnected() -> String {
    "👋 Disconnected from the voice channel".to_string()
}

pub fn registered(channel_id: ChannelId) -> String {
    format!("📌 Music channel set to <#{}>", channel_id)
}

pub fn unregistered(was_registered: bool) -> String {
    if was_registered {
        "📌 Music channel removed".to_string()
    } else {
        "📌 No music channel was registered".to_string()
    }
}

pub fn queue(view: &QueueView) -> String {
    let Some(current) = &view.now_playing else {
        return "📭 Queue is empty".to_string();
    };

    let status = match view.playback {
        PlaybackState::Playing => "🎵 Now playing",
        PlaybackState::Paused => "⏸️ Paused",
        PlaybackState::Idle | PlaybackState::Disconnected => "⏹️ Up next",
    };
    let mut lines = vec![format!("{}: {}", status, describe(current))];

    for (i, track) in view.pending.iter().take(MAX_LISTED).enumerate() {
        lines.push(format!("{}. {}", i + 1, describe(track)));
    }
    if view.pending.len() > MAX_LISTED {
        lines.push(format!("… and {} more", view.pending.len() - MAX_LISTED));
    }

    lines.join("\n")
}

pub fn help() -> String {
    let p = PREFIX;
    [
        "🎵 **Music commands**".to_string(),
        format!("`{p}music-reg` / `{p}music-unreg` - set or clear this channel as the music channel"),
        "Any other text in the music channel - search and add a track".to_string(),
        format!("`{p}join` `{p}j` - join your voice channel"),
        format!("`{p}disconnect` `{p}d` - leave the voice channel (the queue is kept)"),
        format!("`{p}p` - pause / resume / start playing"),
        format!("`{p}skip` `{p}s` - skip the current track"),
        format!("`{p}queue` `{p}q` - show the queue"),
        format!("`{p}remove` `{p}r` `<index>` - remove a pending track"),
        format!("`{p}undo` `{p}u` - remove the last added track"),
        format!("`{p}clear` `{p}c` - remove every pending track"),
        format!("`{p}help` `{p}h` - this message"),
    ]
    .join("\n")
}

pub fn unknown(verb: &str) -> String {
    format!("❓ Unknown command `{}{}`. Type `{}help` for the list of commands.", PREFIX, verb, PREFIX)
}

/// Texto para un error de usuario; `None` si el error no es de ese tipo.
pub fn user_error(error: &MusicError) -> Option<String> {
    let text = match error {
        MusicError::UserNotInVoice => "❌ You are not connected to a voice channel".to_string(),
        MusicError::NotConnected => "❌ I'm not connected to a voice channel".to_string(),
        MusicError::NotAuthorizedChannel => format!(
            "🚫 Not authorized in this channel. Use the music channel or register one with `{}music-reg`",
            PREFIX
        ),
        MusicError::InvalidTrackIndex { index, len } if *len > 1 => format!(
            "❌ Invalid track index {}: pending tracks are numbered 1 to {}",
            index,
            len - 1
        ),
        MusicError::InvalidTrackIndex { index, .. } => {
            format!("❌ Invalid track index {}: there are no pending tracks", index)
        }
        MusicError::Resolution(reason) => format!("❌ Could not find anything to play ({})", reason),
        MusicError::QueueEmpty => "📭 Nothing is playing, the queue is empty".to_string(),
        MusicError::QueueFull { max } => format!("❌ The queue is full ({} tracks)", max),
        MusicError::Persistence(_) | MusicError::Voice(_) | MusicError::Internal(_) => return None,
    };
    Some(text)
}

pub fn action_failed() -> String {
    "⚠️ The action failed and nothing was changed, please try again".to_string()
}

pub fn generic_failure() -> String {
    "⚠️ Something went wrong while running that command".to_string()
}
