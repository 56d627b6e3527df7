use anyhow::{Context, Result};
use std::{str::FromStr, time::Duration};

#[derive(Debug, Clone)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub guild_id: Option<u64>, // Para comandos de desarrollo

    // Logging
    pub debug: bool,

    // Audio
    pub default_volume: f32,
    pub max_queue_size: usize,

    // Bridge y búsqueda
    pub bridge_timeout: Duration,
    pub resolver_workers: usize,
    pub max_concurrent_resolutions: usize,
    pub resolve_timeout: Duration,
    pub ytdlp_path: String,

    // Apagado
    pub shutdown_grace: Duration,
    pub shutdown_task_timeout: Duration,
    pub force_stop_timeout: Duration,

    // UI
    pub embed_footer: String,
    pub enable_console: bool,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key → value source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let millis = |key: &str, default: &str| -> Result<Duration> {
            Ok(Duration::from_millis(parse(key, &var(key, default))?))
        };

        let config = Self {
            // Discord
            discord_token: lookup("DISCORD_TOKEN")
                .filter(|t| !t.trim().is_empty())
                .context("DISCORD_TOKEN no está definido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),

            debug: parse("DEBUG", &var("DEBUG", "false"))?,

            default_volume: parse("DEFAULT_VOLUME", &var("DEFAULT_VOLUME", "0.5"))?,
            max_queue_size: parse("MAX_QUEUE_SIZE", &var("MAX_QUEUE_SIZE", "1000"))?,

            bridge_timeout: millis("BRIDGE_TIMEOUT_MS", "5000")?,
            resolver_workers: match lookup("RESOLVER_WORKERS") {
                Some(val) if !val.trim().is_empty() => parse("RESOLVER_WORKERS", &val)?,
                _ => num_cpus::get().clamp(1, 4),
            },
            max_concurrent_resolutions: parse(
                "MAX_CONCURRENT_RESOLUTIONS",
                &var("MAX_CONCURRENT_RESOLUTIONS", "3"),
            )?,
            resolve_timeout: Duration::from_secs(parse(
                "RESOLVE_TIMEOUT_SECS",
                &var("RESOLVE_TIMEOUT_SECS", "30"),
            )?),
            ytdlp_path: var("YTDLP_PATH", "yt-dlp"),

            shutdown_grace: millis("SHUTDOWN_GRACE_MS", "500")?,
            shutdown_task_timeout: millis("SHUTDOWN_TASK_TIMEOUT_MS", "3000")?,
            force_stop_timeout: millis("FORCE_STOP_TIMEOUT_MS", "2000")?,

            embed_footer: var("EMBED_FOOTER", "🎵 Guild Jukebox"),
            enable_console: parse("ENABLE_CONSOLE", &var("ENABLE_CONSOLE", "true"))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Sanity checks on values that parse but make no sense.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.default_volume) {
            anyhow::bail!("Default volume must be between 0.0 and 2.0, got: {}", self.default_volume);
        }

        if self.max_queue_size == 0 {
            anyhow::bail!("Max queue size must be greater than 0");
        }

        if self.resolver_workers == 0 || self.max_concurrent_resolutions == 0 {
            anyhow::bail!("Resolver workers and concurrent resolutions must be greater than 0");
        }

        if self.bridge_timeout.is_zero() || self.resolve_timeout.is_zero() {
            anyhow::bail!("Bridge and resolve timeouts must be greater than 0");
        }

        if self.ytdlp_path.trim().is_empty() {
            anyhow::bail!("YTDLP_PATH cannot be empty");
        }

        Ok(())
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// The token is never included.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: Guild {}\n  \
            Audio: {}% vol, {} max queue\n  \
            Bridge: {} timeout\n  \
            Resolver: {} ({} workers, {} concurrent, {} timeout)\n  \
            Shutdown: {} grace, {} tasks, {} force stop\n  \
            Features: Console={}, Debug={}",
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            (self.default_volume * 100.0) as u32,
            self.max_queue_size,
            humantime::format_duration(self.bridge_timeout),
            self.ytdlp_path,
            self.resolver_workers,
            self.max_concurrent_resolutions,
            humantime::format_duration(self.resolve_timeout),
            humantime::format_duration(self.shutdown_grace),
            humantime::format_duration(self.shutdown_task_timeout),
            humantime::format_duration(self.force_stop_timeout),
            self.enable_console,
            self.debug
        )
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Valor inválido para {}: '{}'", key, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("RESOLVER_WORKERS", "2"),
        ]))
        .unwrap();

        assert_eq!(config.bridge_timeout, Duration::from_secs(5));
        assert_eq!(config.shutdown_grace, Duration::from_millis(500));
        assert_eq!(config.max_queue_size, 1000);
        assert_eq!(config.resolver_workers, 2);
        assert_eq!(config.guild_id, None);
        assert!(config.enable_console);
        assert!(!config.debug);
    }

    #[test]
    fn test_token_is_required() {
        assert!(Config::from_lookup(lookup_from(&[])).is_err());
        assert!(Config::from_lookup(lookup_from(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn test_bad_values_are_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("BRIDGE_TIMEOUT_MS", "pronto"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("BRIDGE_TIMEOUT_MS"));

        assert!(Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "abc"),
            ("DEFAULT_VOLUME", "3.5"),
        ]))
        .is_err());
    }

    #[test]
    fn test_summary_hides_token() {
        let config = Config::from_lookup(lookup_from(&[
            ("DISCORD_TOKEN", "super-secreto"),
            ("GUILD_ID", "42"),
        ]))
        .unwrap();

        let summary = config.summary();
        assert!(!summary.contains("super-secreto"));
        assert!(summary.contains("Guild 42"));
        assert!(summary.contains("5s timeout"));
    }
}
