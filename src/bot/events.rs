use serenity::http::Http;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{audio::engine::Announcement, ui::messages};

/// Publica en el canal de música cada track que arrancó por avance automático.
pub async fn relay_announcements(
    http: Arc<Http>,
    announcements: flume::Receiver<Announcement>,
    shutdown: CancellationToken,
) {
    loop {
        let announcement = tokio::select! {
            _ = shutdown.cancelled() => break,
            received = announcements.recv_async() => match received {
                Ok(announcement) => announcement,
                Err(_) => break,
            },
        };

        debug!("📣 Anunciando {} en canal {}", announcement.track.title, announcement.channel_id);
        if let Err(e) = announcement
            .channel_id
            .say(&http, messages::now_playing(&announcement.track))
            .await
        {
            warn!("No se pudo anunciar en canal {}: {:?}", announcement.channel_id, e);
        }
    }

    info!("📣 Anuncios detenidos");
}
