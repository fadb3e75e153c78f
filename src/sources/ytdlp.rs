use async_process::Command;
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::{is_url, MediaResolver, ResolvedTrack};
use crate::error::{MusicError, MusicResult};

/// Resolver que delega en el binario `yt-dlp`.
pub struct YtDlpResolver {
    binary: String,
    // Limitar procesos concurrentes para evitar rate limiting
    rate_limiter: Semaphore,
}

/// Largo máximo del motivo de fallo que llega al usuario.
const MAX_REASON_CHARS: usize = 200;

/// Información extraída de yt-dlp (`--dump-json` con un formato elegido)
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: String,
    url: Option<String>,
    duration: Option<f64>,
    is_live: Option<bool>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            rate_limiter: Semaphore::new(3),
        }
    }

    /// Las búsquedas libres se envían como `ytsearch1:`; las URLs tal cual.
    fn target_for(query: &str) -> String {
        if is_url(query) {
            query.to_string()
        } else {
            format!("ytsearch1:{}", query)
        }
    }

    /// Motivo corto para el usuario: la última línea no vacía de stderr, sin el prefijo `ERROR:`.
    fn short_reason(stderr: &str) -> String {
        let line = stderr
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .unwrap_or("yt-dlp failed");
        let line = line.strip_prefix("ERROR:").map(str::trim).unwrap_or(line);

        if line.chars().count() > MAX_REASON_CHARS {
            let cut: String = line.chars().take(MAX_REASON_CHARS).collect();
            format!("{}…", cut)
        } else {
            line.to_string()
        }
    }

    /// Toma la primera línea JSON válida de la salida de yt-dlp.
    fn parse_output(stdout: &str) -> MusicResult<ResolvedTrack> {
        let info = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .find_map(|line| serde_json::from_str::<YtDlpInfo>(line).ok())
            .ok_or_else(|| MusicError::Resolution("no results".to_string()))?;

        let stream_url = info
            .url
            .filter(|u| !u.is_empty())
            .ok_or_else(|| MusicError::Resolution(format!("no playable stream for {}", info.title)))?;

        Ok(ResolvedTrack {
            stream_url,
            title: info.title,
            duration: info.duration.map(|secs| secs.round() as u64),
            is_live: info.is_live.unwrap_or(false),
        })
    }

    /// Verifica que el binario responda; lo usa el health check.
    pub async fn verify(&self) -> MusicResult<String> {
        let output = Command::new(&self.binary)
            .arg("--version")
            .output()
            .await
            .map_err(|e| MusicError::Internal(format!("no se pudo ejecutar {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(MusicError::Internal(format!("{} --version falló", self.binary)));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl MediaResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> MusicResult<ResolvedTrack> {
        let _permit = self
            .rate_limiter
            .acquire()
            .await
            .map_err(|e| MusicError::Internal(e.to_string()))?;

        let target = Self::target_for(query);
        info!("🔍 Resolviendo con yt-dlp: {}", target);

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-json",
                "--no-warnings",
                "--format",
                "bestaudio/best",
                target.as_str(),
            ])
            .output()
            .await
            .map_err(|e| MusicError::Resolution(format!("error al ejecutar yt-dlp: {}", e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("yt-dlp falló para {} ({}): {}", target, output.status, stderr.trim());
            return Err(MusicError::Resolution(Self::short_reason(&stderr)));
        }

        Self::parse_output(&String::from_utf8_lossy(&output.stdout))
    }
}
