use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::{path::Path, sync::Arc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod audio;
mod bot;
mod config;
mod error;
mod sources;
mod storage;
#[cfg(test)]
mod test_support;
mod ui;

use crate::audio::{engine::QueueEngine, player::SongbirdSink, sink::completion_channel};
use crate::bot::{dispatcher::Dispatcher, events::relay_announcements, JukeboxBot};
use crate::config::Config;
use crate::sources::YtDlpResolver;
use crate::storage::JsonStorage;

/// Archivo de log diario `YYYY-MM-DD.log` dentro de `dir`.
fn daily_log_appender(dir: &Path) -> Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_suffix("log")
        .build(dir)?)
}

/// Logging a consola y a archivo. El guard debe vivir hasta el final de `main`.
fn init_logging(log_dir: &Path) -> Result<WorkerGuard> {
    let filter = EnvFilter::from_default_env()
        .add_directive("jukebox_bot=debug".parse()?)
        .add_directive("serenity=info".parse()?)
        .add_directive("songbird=info".parse()?);

    let (file_writer, guard) = tracing_appender::non_blocking(daily_log_appender(log_dir)?);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar configuración
    let config = Config::load()?;

    // Inicializar logging
    let _log_guard = init_logging(&config.log_dir)?;

    info!("🎵 Iniciando Jukebox Bot v{}", env!("CARGO_PKG_VERSION"));
    info!("{}", config.summary());

    let resolver = Arc::new(YtDlpResolver::new(config.ytdlp_path.clone()));

    // Manejar health check si es necesario
    if std::env::args().any(|arg| arg == "--health-check") {
        let version = resolver.verify().await?;
        println!("OK (yt-dlp {})", version);
        return Ok(());
    }

    // Inicializar almacenamiento JSON
    let storage = Arc::new(JsonStorage::new(&config.data_dir).await?);

    // Audio: songbird compartido entre el cliente y el sink
    let songbird = Songbird::serenity();
    let (completion_tx, completion_rx) = completion_channel();
    let sink = Arc::new(SongbirdSink::new(songbird.clone(), completion_tx));

    let (announce_tx, announce_rx) = flume::unbounded();
    let engine = Arc::new(
        QueueEngine::new(storage, resolver, sink, config.engine_settings()).with_announcements(announce_tx),
    );
    engine.restore().await?;

    let shutdown = CancellationToken::new();
    tokio::spawn(engine.clone().run_completions(completion_rx, shutdown.clone()));

    // Configurar intents mínimos necesarios
    let intents = GatewayIntents::GUILDS
        | GatewayIntents::GUILD_VOICE_STATES
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT;

    let handler = JukeboxBot::new(Dispatcher::new(engine));

    // Construir cliente
    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler(handler)
        .register_songbird_with(songbird)
        .await?;

    tokio::spawn(relay_announcements(client.http.clone(), announce_rx, shutdown.clone()));

    // Manejar shutdown graceful
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("No se pudo registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        shutdown.cancel();
        shard_manager.shutdown_all().await;
    });

    // Iniciar bot
    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}
