use anyhow::{Context, Result};
use std::{path::PathBuf, time::Duration};

use crate::audio::engine::EngineSettings;

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,

    // Paths
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub ytdlp_path: String,

    // Tiempos
    pub resolve_timeout: Duration,
    pub completion_lock_timeout: Duration,

    // Límites
    pub max_queue_size: usize,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        for dir in [&config.data_dir, &config.log_dir] {
            std::fs::create_dir_all(dir).with_context(|| format!("No se pudo crear {}", dir.display()))?;
        }

        Ok(config)
    }

    /// Arma la configuración desde cualquier fuente clave/valor.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| {
            lookup(key)
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let config = Self {
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|v| !v.trim().is_empty())
                .context("DISCORD_TOKEN no está definido")?,

            data_dir: var("DATA_DIR", "./data").into(),
            log_dir: var("LOG_DIR", "./logs").into(),
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),

            resolve_timeout: humantime::parse_duration(&var("RESOLVE_TIMEOUT", "30s"))
                .context("RESOLVE_TIMEOUT inválido")?,
            completion_lock_timeout: humantime::parse_duration(&var("COMPLETION_LOCK_TIMEOUT", "5s"))
                .context("COMPLETION_LOCK_TIMEOUT inválido")?,

            max_queue_size: var("MAX_QUEUE_SIZE", "500")
                .parse()
                .context("MAX_QUEUE_SIZE inválido")?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolve_timeout.is_zero() {
            anyhow::bail!("Resolve timeout must be greater than 0");
        }

        if self.completion_lock_timeout.is_zero() {
            anyhow::bail!("Completion lock timeout must be greater than 0");
        }

        Ok(())
    }

    /// Resumen sin el token, apto para logs.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Data: {}\n  \
            Logs: {}\n  \
            Resolver: {} (timeout {})\n  \
            Completions: lock timeout {}\n  \
            Limits: {} queue",
            self.data_dir.display(),
            self.log_dir.display(),
            self.ytdlp_path,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.completion_lock_timeout),
            self.max_queue_size,
        )
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            resolve_timeout: self.resolve_timeout,
            completion_lock_timeout: self.completion_lock_timeout,
            max_queue_size: self.max_queue_size,
        }
    }
}
