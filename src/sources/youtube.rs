use async_process::Command;
use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use std::sync::LazyLock;
use tracing::{debug, info};
use url::Url;

use super::TrackResolver;
use crate::{audio::track::Track, error::ResolutionError};

/// Audio format requested from yt-dlp, lowest acceptable bitrate first.
const AUDIO_FORMAT: &str = "bestaudio[abr<=96]/bestaudio/best";

static RESTRICTED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)requested format is not available|drm|not available in your country|geo.?restrict")
        .expect("regex válida")
});

static MISSING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)video unavailable|private video|no video results|has been removed|does not exist")
        .expect("regex válida")
});

/// Resolves queries through the `yt-dlp` binary.
pub struct YtDlpResolver {
    binary: String,
}

/// Fields we read from `--dump-json`.
#[derive(Debug, Deserialize)]
struct YtDlpInfo {
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    webpage_url: Option<String>,
    original_url: Option<String>,
}

impl YtDlpResolver {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Links are used as-is; anything else becomes a first-result search.
    pub fn target_for(query: &str) -> String {
        match Url::parse(query) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => query.to_string(),
            _ => format!("ytsearch1:{}", query),
        }
    }
}

#[async_trait]
impl TrackResolver for YtDlpResolver {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        let query = query.trim();
        let target = Self::target_for(query);
        info!("🔍 Buscando en YouTube: {}", query);

        let output = Command::new(&self.binary)
            .args([
                "--no-playlist",
                "--dump-json",
                "--skip-download",
                "--no-warnings",
                "-f",
                AUDIO_FORMAT,
                target.as_str(),
            ])
            .output()
            .await
            .map_err(|e| ResolutionError::Failed {
                reason: format!("no se pudo ejecutar {}: {}", self.binary, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            debug!("yt-dlp stderr: {}", stderr.trim());
            return Err(classify_failure(query, &stderr));
        }

        parse_output(query, &String::from_utf8_lossy(&output.stdout))
    }
}

/// Builds a [`Track`] from the first JSON line yt-dlp printed.
pub fn parse_output(query: &str, stdout: &str) -> Result<Track, ResolutionError> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Err(ResolutionError::NotFound {
            query: query.to_string(),
        });
    };

    let info: YtDlpInfo = serde_json::from_str(line).map_err(|e| ResolutionError::Failed {
        reason: format!("respuesta de yt-dlp inválida: {}", e),
    })?;

    let Some(url) = info.webpage_url.or(info.original_url) else {
        return Err(ResolutionError::NotFound {
            query: query.to_string(),
        });
    };

    let mut track = Track::new(query, url, info.title.unwrap_or_default());
    if let Some(seconds) = info.duration.filter(|d| d.is_finite() && *d >= 0.0) {
        track = track.with_duration_seconds(seconds.round() as u64);
    }
    if let Some(thumbnail) = info.thumbnail {
        track = track.with_thumbnail(thumbnail);
    }
    Ok(track)
}

/// Maps yt-dlp's stderr onto a [`ResolutionError`].
pub fn classify_failure(query: &str, stderr: &str) -> ResolutionError {
    if RESTRICTED.is_match(stderr) {
        return ResolutionError::Restricted {
            reason: "el video podría estar protegido por DRM o bloqueado en tu región".to_string(),
        };
    }
    if MISSING.is_match(stderr) {
        return ResolutionError::NotFound {
            query: query.to_string(),
        };
    }

    let reason = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()
        .unwrap_or("yt-dlp terminó con error")
        .to_string();
    ResolutionError::Failed { reason }
}
