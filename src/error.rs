//! Errores del núcleo de la cola de música.
//!
//! Todo lo que puede fallar en una operación de la cola termina en
//! [`MusicError`]. Las variantes de usuario se convierten en texto en el
//! dispatcher; el resto se registra en el log.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MusicError {
    /// El autor del comando no está en ningún canal de voz.
    #[error("user is not connected to a voice channel")]
    UserNotInVoice,

    /// El bot no tiene conexión de voz en la guild.
    #[error("not connected to a voice channel")]
    NotConnected,

    /// El comando llegó por un canal que no es el canal de música registrado.
    #[error("not authorized in this channel")]
    NotAuthorizedChannel,

    /// Índice fuera de `1..len`; la posición 0 sólo sale con skip.
    #[error("invalid track index {index} (queue has {len} tracks)")]
    InvalidTrackIndex { index: usize, len: usize },

    /// El resolver falló, no devolvió resultados o superó el timeout.
    #[error("could not resolve track: {0}")]
    Resolution(String),

    #[error("queue is empty")]
    QueueEmpty,

    #[error("queue is full ({max} tracks)")]
    QueueFull { max: usize },

    /// Falló la escritura del registro de la guild; la mutación se revierte.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Falló una orden al sink de audio (join/play/pause/...).
    #[error("voice error: {0}")]
    Voice(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl MusicError {
    /// Errores que se le explican al usuario sin tocar el estado.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::UserNotInVoice
                | Self::NotConnected
                | Self::NotAuthorizedChannel
                | Self::InvalidTrackIndex { .. }
                | Self::Resolution(_)
                | Self::QueueEmpty
                | Self::QueueFull { .. }
        )
    }
}

pub type MusicResult<T> = Result<T, MusicError>;
