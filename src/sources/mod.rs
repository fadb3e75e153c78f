pub mod ytdlp;

use async_trait::async_trait;

use crate::{
    audio::queue::{Track, TrackDuration},
    error::MusicResult,
};

pub use ytdlp::YtDlpResolver;

/// Resultado del resolver: URL reproducible más metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTrack {
    pub stream_url: String,
    pub title: String,
    /// Segundos; `None` cuando la fuente no la informa.
    pub duration: Option<u64>,
    pub is_live: bool,
}

impl From<ResolvedTrack> for Track {
    fn from(resolved: ResolvedTrack) -> Self {
        Track::new(
            resolved.stream_url,
            resolved.title,
            TrackDuration::from_resolved(resolved.duration, resolved.is_live),
        )
    }
}

/// Convierte una búsqueda o URL en un track reproducible.
///
/// La llamada puede tardar (red); el motor la ejecuta fuera del lock de la
/// guild y con timeout.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> MusicResult<ResolvedTrack>;
}

/// Verifica si el texto es una URL http(s) en lugar de una búsqueda.
pub fn is_url(query: &str) -> bool {
    url::Url::parse(query)
        .map(|u| matches!(u.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_detection() {
        assert!(is_url("https://www.youtube.com/watch?v=dQw4w9WgXcQ"));
        assert!(is_url("http://example.com/song.mp3"));
        assert!(!is_url("never gonna give you up"));
        assert!(!is_url("ftp://example.com/song.mp3"));
    }

    #[test]
    fn test_resolved_live_track_uses_sentinel() {
        let track: Track = ResolvedTrack {
            stream_url: "https://cdn.example/live".into(),
            title: "radio".into(),
            duration: None,
            is_live: true,
        }
        .into();
        assert_eq!(track.duration, TrackDuration::Live);
        assert_eq!(track.duration.to_string(), "Livestream");
    }
}
