use regex::Regex;
use serde::{Deserialize, Serialize};
use serenity::model::id::ChannelId;
use std::{collections::VecDeque, fmt, sync::LazyLock};
use tracing::{debug, info};

use crate::error::{MusicError, MusicResult};

/// Texto que se guarda en lugar de una duración para streams sin fin.
pub const LIVESTREAM: &str = "Livestream";

static HMS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+):([0-5]\d):([0-5]\d)$").expect("regex válida"));

/// Duración de un track: finita en segundos o en vivo.
///
/// Se persiste como texto (`H:MM:SS` o `Livestream`) para que el registro en
/// disco sea legible y estable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum TrackDuration {
    Finite(u64),
    Live,
}

impl TrackDuration {
    pub fn from_resolved(seconds: Option<u64>, is_live: bool) -> Self {
        match (is_live, seconds) {
            (false, Some(secs)) => Self::Finite(secs),
            // Sin duración conocida se trata como stream
            _ => Self::Live,
        }
    }
}

impl fmt::Display for TrackDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Finite(secs) => {
                write!(f, "{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
            }
            Self::Live => f.write_str(LIVESTREAM),
        }
    }
}

impl From<TrackDuration> for String {
    fn from(duration: TrackDuration) -> Self {
        duration.to_string()
    }
}

impl TryFrom<String> for TrackDuration {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == LIVESTREAM {
            return Ok(Self::Live);
        }

        let caps = HMS
            .captures(&value)
            .ok_or_else(|| format!("duración inválida: {value:?}"))?;
        let part = |i: usize| caps[i].parse::<u64>().map_err(|e| e.to_string());

        let (hours, minutes, seconds) = (part(1)?, part(2)?, part(3)?);

        hours
            .checked_mul(3600)
            .and_then(|secs| secs.checked_add(minutes * 60 + seconds))
            .map(Self::Finite)
            .ok_or_else(|| format!("duración fuera de rango: {value:?}"))
    }
}

/// Track resuelto y listo para el sink de audio. Inmutable una vez creado.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    #[serde(rename = "streamURL")]
    pub stream_url: String,
    pub title: String,
    pub duration: TrackDuration,
}

impl Track {
    pub fn new(stream_url: impl Into<String>, title: impl Into<String>, duration: TrackDuration) -> Self {
        Self {
            stream_url: stream_url.into(),
            title: title.into(),
            duration,
        }
    }
}

/// Estado de música de una guild: canal registrado y cola.
///
/// `queue[0]` es el track actual (o el que está por sonar); el resto
/// espera en orden FIFO.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuildMusicState {
    #[serde(rename = "musicChannelID", with = "channel_id_str")]
    pub music_channel_id: Option<ChannelId>,
    pub queue: VecDeque<Track>,
}

impl GuildMusicState {
    pub fn is_music_channel(&self, channel_id: ChannelId) -> bool {
        self.music_channel_id == Some(channel_id)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn head(&self) -> Option<&Track> {
        self.queue.front()
    }

    /// Agrega al final y devuelve la posición asignada.
    pub fn push(&mut self, track: Track) -> usize {
        let position = self.queue.len();
        info!("➕ Agregado a la cola: {} (posición {})", track.title, position);
        self.queue.push_back(track);
        position
    }

    /// Saca el track actual. Sólo lo llaman la señal de fin y el skip sin reproducción.
    pub fn pop_head(&mut self) -> Option<Track> {
        let popped = self.queue.pop_front();
        if let Some(ref track) = popped {
            debug!("⏏️ Sale de la cola: {}", track.title);
        }
        popped
    }

    /// Elimina un track pendiente. La posición 0 está protegida.
    pub fn remove(&mut self, index: usize) -> MusicResult<Track> {
        let len = self.queue.len();
        if index == 0 || index >= len {
            return Err(MusicError::InvalidTrackIndex { index, len });
        }

        let track = self
            .queue
            .remove(index)
            .ok_or(MusicError::InvalidTrackIndex { index, len })?;
        debug!("❌ Track eliminado en posición {}", index);
        Ok(track)
    }

    /// Vacía los pendientes y conserva el track actual.
    pub fn clear_pending(&mut self) -> Vec<Track> {
        if self.queue.len() <= 1 {
            return Vec::new();
        }
        let removed: Vec<Track> = self.queue.drain(1..).collect();
        info!("🗑️ Cola limpiada ({} pendientes)", removed.len());
        removed
    }
}

/// Los ids de canal van como texto decimal en el registro persistido.
mod channel_id_str {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};
    use serenity::model::id::ChannelId;

    pub fn serialize<S: Serializer>(id: &Option<ChannelId>, serializer: S) -> Result<S::Ok, S::Error> {
        match id {
            Some(id) => serializer.serialize_some(&id.get().to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<ChannelId>, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(text) => {
                let id: u64 = text.parse().map_err(D::Error::custom)?;
                if id == 0 {
                    return Err(D::Error::custom("channel id 0"));
                }
                Ok(Some(ChannelId::new(id)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn track(title: &str) -> Track {
        Track::new(format!("https://cdn.example/{title}"), title, TrackDuration::Finite(200))
    }

    fn state_with(titles: &[&str]) -> GuildMusicState {
        let mut state = GuildMusicState::default();
        for title in titles {
            state.push(track(title));
        }
        state
    }

    #[test]
    fn test_duration_formatting() {
        assert_eq!(TrackDuration::Finite(205).to_string(), "0:03:25");
        assert_eq!(TrackDuration::Finite(3 * 3600 + 7).to_string(), "3:00:07");
        assert_eq!(TrackDuration::Live.to_string(), "Livestream");
    }

    #[test]
    fn test_duration_parsing() {
        assert_eq!(TrackDuration::try_from("0:03:25".to_string()), Ok(TrackDuration::Finite(205)));
        assert_eq!(TrackDuration::try_from("Livestream".to_string()), Ok(TrackDuration::Live));
        assert!(TrackDuration::try_from("3:25".to_string()).is_err());
        assert!(TrackDuration::try_from("0:61:00".to_string()).is_err());
    }

    #[test]
    fn test_corrupt_huge_duration_is_rejected() {
        assert_eq!(TrackDuration::try_from("100:00:00".to_string()), Ok(TrackDuration::Finite(360_000)));
        assert!(TrackDuration::try_from("99999999999999999:00:00".to_string()).is_err());
        assert!(TrackDuration::try_from("999999999999999999999999:00:00".to_string()).is_err());
    }

    #[test]
    fn test_duration_from_resolver_fields() {
        assert_eq!(TrackDuration::from_resolved(Some(90), false), TrackDuration::Finite(90));
        assert_eq!(TrackDuration::from_resolved(Some(90), true), TrackDuration::Live);
        assert_eq!(TrackDuration::from_resolved(None, false), TrackDuration::Live);
    }

    #[test]
    fn test_push_reports_fifo_positions() {
        let mut state = GuildMusicState::default();
        assert_eq!(state.push(track("a")), 0);
        assert_eq!(state.push(track("b")), 1);
        assert_eq!(state.push(track("c")), 2);
        assert_eq!(state.head().map(|t| t.title.as_str()), Some("a"));
    }

    #[test]
    fn test_remove_protects_head_and_bounds() {
        let mut state = state_with(&["a", "b"]);

        assert_eq!(state.remove(0), Err(MusicError::InvalidTrackIndex { index: 0, len: 2 }));
        assert_eq!(state.remove(2), Err(MusicError::InvalidTrackIndex { index: 2, len: 2 }));
        assert_eq!(state.remove(5), Err(MusicError::InvalidTrackIndex { index: 5, len: 2 }));
        assert_eq!(state.len(), 2);

        assert_eq!(state.remove(1).map(|t| t.title), Ok("b".to_string()));
        assert_eq!(state.len(), 1);
    }

    #[test]
    fn test_clear_pending_keeps_current_track() {
        let mut state = state_with(&["a", "b", "c"]);
        assert_eq!(state.clear_pending().len(), 2);
        assert_eq!(state.len(), 1);
        assert_eq!(state.head().map(|t| t.title.as_str()), Some("a"));

        assert!(state.clear_pending().is_empty());
    }

    #[test]
    fn test_persisted_schema() {
        let mut state = state_with(&["a"]);
        state.music_channel_id = Some(ChannelId::new(42));

        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "musicChannelID": "42",
                "queue": [{"streamURL": "https://cdn.example/a", "title": "a", "duration": "0:03:20"}]
            })
        );

        let back: GuildMusicState = serde_json::from_value(json).unwrap();
        assert_eq!(back, state);
    }

    #[test]
    fn test_unregistered_channel_is_null() {
        let json = serde_json::to_string(&GuildMusicState::default()).unwrap();
        assert_eq!(json, r#"{"musicChannelID":null,"queue":[]}"#);
    }
}
