//! Text console control surface.
//!
//! Runs on its own OS thread, reads stdin line by line and talks to the
//! player through the blocking [`PlayerClient`] calls. A bare `stop` cancels
//! the process-wide shutdown token.

use serenity::model::id::{ChannelId, GuildId};
use std::io::BufRead;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        controller::EnqueueOutcome,
        track::{format_duration, Track},
    },
    error::BridgeError,
    runtime::{ControlCommand, ControlReply, PlayerClient},
};

const HELP: &str = "\
Comandos disponibles:
  play <guild> <canal> <búsqueda>   reproduce o agrega a la cola
  skip <guild>                      salta la canción actual
  pause <guild> / resume <guild>    pausa o reanuda
  stop <guild>                      detiene y limpia la cola de una guild
  status <guild>                    estado del reproductor
  queue <guild>                     muestra la cola
  now <guild>                       canción actual
  test                              emite un log de cada nivel
  help                              esta ayuda
  stop                              apaga el bot";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Play {
        guild_id: GuildId,
        channel_id: ChannelId,
        query: String,
    },
    Control(ControlCommand),
    LogTest,
    Help,
    Shutdown,
    Empty,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsoleError {
    #[error("Comando desconocido: '{0}'. Escribe 'help' para ver los comandos")]
    Unknown(String),

    #[error("Uso: {0}")]
    Usage(&'static str),

    #[error("ID inválido: '{0}'")]
    InvalidId(String),
}

pub fn parse_line(line: &str) -> Result<ConsoleCommand, ConsoleError> {
    let mut parts = line.split_whitespace();
    let Some(name) = parts.next() else {
        return Ok(ConsoleCommand::Empty);
    };
    let name = name.to_lowercase();
    let args: Vec<&str> = parts.collect();

    let guild_command = |usage: &'static str,
                         build: fn(GuildId) -> ControlCommand|
     -> Result<ConsoleCommand, ConsoleError> {
        match args.as_slice() {
            [guild] => Ok(ConsoleCommand::Control(build(GuildId::new(parse_id(guild)?)))),
            _ => Err(ConsoleError::Usage(usage)),
        }
    };

    match name.as_str() {
        "play" => match args.as_slice() {
            [guild, channel, query @ ..] if !query.is_empty() => Ok(ConsoleCommand::Play {
                guild_id: GuildId::new(parse_id(guild)?),
                channel_id: ChannelId::new(parse_id(channel)?),
                query: query.join(" "),
            }),
            _ => Err(ConsoleError::Usage("play <guild> <canal> <búsqueda>")),
        },
        "stop" if args.is_empty() => Ok(ConsoleCommand::Shutdown),
        "stop" => guild_command("stop <guild>", ControlCommand::Stop),
        "skip" => guild_command("skip <guild>", ControlCommand::Skip),
        "pause" => guild_command("pause <guild>", ControlCommand::Pause),
        "resume" => guild_command("resume <guild>", ControlCommand::Resume),
        "status" => guild_command("status <guild>", ControlCommand::Status),
        "queue" => guild_command("queue <guild>", ControlCommand::ListQueue),
        "now" => guild_command("now <guild>", ControlCommand::NowPlaying),
        "test" => Ok(ConsoleCommand::LogTest),
        "help" => Ok(ConsoleCommand::Help),
        _ => Err(ConsoleError::Unknown(name)),
    }
}

/// Discord snowflakes are non-zero.
fn parse_id(raw: &str) -> Result<u64, ConsoleError> {
    match raw.parse::<u64>() {
        Ok(id) if id != 0 => Ok(id),
        _ => Err(ConsoleError::InvalidId(raw.to_string())),
    }
}

pub fn render_reply(reply: &ControlReply) -> String {
    match reply {
        ControlReply::Enqueued(EnqueueOutcome::NowPlaying(track)) => {
            format!("🎵 Reproduciendo ahora: {}", describe(track))
        }
        ControlReply::Enqueued(EnqueueOutcome::Queued { track, position }) => {
            format!("➕ Agregada a la cola (#{}): {}", position, describe(track))
        }
        ControlReply::Enqueued(EnqueueOutcome::Connecting(track)) => {
            format!("🔌 Conectando para reproducir: {}", describe(track))
        }
        ControlReply::Skipped(track) => format!("⏭️ Saltada: {}", track.title()),
        ControlReply::Paused => "⏸️ Reproducción pausada".to_string(),
        ControlReply::Resumed => "▶️ Reproducción reanudada".to_string(),
        ControlReply::Stopped { cleared } => {
            format!("⏹️ Reproducción detenida ({} canciones descartadas)", cleared)
        }
        ControlReply::Status(status) => format!("📊 Estado: {}", status),
        ControlReply::Queue(titles) if titles.is_empty() => "📋 La cola está vacía".to_string(),
        ControlReply::Queue(titles) => titles
            .iter()
            .enumerate()
            .map(|(i, title)| format!("{}. {}", i + 1, title))
            .collect::<Vec<_>>()
            .join("\n"),
        ControlReply::NowPlaying(Some(track)) => format!("🎵 {}", describe(track)),
        ControlReply::NowPlaying(None) => "🔇 No hay nada sonando".to_string(),
    }
}

fn describe(track: &Track) -> String {
    match track.duration() {
        Some(duration) => format!("{} [{}]", track.title(), format_duration(duration)),
        None => track.title().to_string(),
    }
}

pub struct Console {
    client: PlayerClient,
    shutdown: CancellationToken,
}

impl Console {
    pub fn new(client: PlayerClient, shutdown: CancellationToken) -> Self {
        Self { client, shutdown }
    }

    /// Reads stdin until EOF, `stop`, or shutdown. Blocking.
    pub fn run_blocking(self) {
        info!("⌨️ Consola lista. Escribe 'help' para ver los comandos");
        let stdin = std::io::stdin();

        for line in stdin.lock().lines() {
            if self.shutdown.is_cancelled() {
                break;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("⚠️ Error leyendo la consola: {}", e);
                    break;
                }
            };

            match parse_line(&line) {
                Ok(ConsoleCommand::Shutdown) => {
                    info!("🛑 Apagado solicitado desde la consola");
                    self.shutdown.cancel();
                    break;
                }
                Ok(command) => self.execute(command),
                Err(e) => println!("❌ {}", e),
            }
        }

        debug!("Consola terminada");
    }

    fn execute(&self, command: ConsoleCommand) {
        let result = match command {
            ConsoleCommand::Play {
                guild_id,
                channel_id,
                query,
            } => self.client.enqueue(guild_id, Some(channel_id), &query),
            ConsoleCommand::Control(control) => self.client.execute(control),
            ConsoleCommand::LogTest => {
                debug!("🧪 Log de prueba: debug");
                info!("🧪 Log de prueba: info");
                warn!("🧪 Log de prueba: warn");
                error!("🧪 Log de prueba: error");
                return;
            }
            ConsoleCommand::Help => {
                println!("{}", HELP);
                return;
            }
            ConsoleCommand::Shutdown | ConsoleCommand::Empty => return,
        };

        match result {
            Ok(reply) => println!("{}", render_reply(&reply)),
            Err(e) => report(&e),
        }
    }
}

fn report(error: &BridgeError) {
    if error.is_warning() {
        warn!("⚠️ {}", error);
    } else {
        println!("❌ {}", error);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_play() {
        assert_eq!(
            parse_line("play 1 2 never gonna  give").unwrap(),
            ConsoleCommand::Play {
                guild_id: GuildId::new(1),
                channel_id: ChannelId::new(2),
                query: "never gonna give".to_string(),
            }
        );
        assert_eq!(
            parse_line("play 1 2"),
            Err(ConsoleError::Usage("play <guild> <canal> <búsqueda>"))
        );
    }

    #[test]
    fn test_bare_stop_shuts_down() {
        assert_eq!(parse_line("  STOP ").unwrap(), ConsoleCommand::Shutdown);
        assert_eq!(
            parse_line("stop 7").unwrap(),
            ConsoleCommand::Control(ControlCommand::Stop(GuildId::new(7)))
        );
    }

    #[test]
    fn test_guild_commands() {
        assert_eq!(
            parse_line("queue 9").unwrap(),
            ConsoleCommand::Control(ControlCommand::ListQueue(GuildId::new(9)))
        );
        assert_eq!(parse_line("skip"), Err(ConsoleError::Usage("skip <guild>")));
        assert_eq!(parse_line("pause 0"), Err(ConsoleError::InvalidId("0".to_string())));
        assert_eq!(parse_line("pause abc"), Err(ConsoleError::InvalidId("abc".to_string())));
    }

    #[test]
    fn test_misc_lines() {
        assert_eq!(parse_line("").unwrap(), ConsoleCommand::Empty);
        assert_eq!(parse_line("test").unwrap(), ConsoleCommand::LogTest);
        assert_eq!(parse_line("help").unwrap(), ConsoleCommand::Help);
        assert_eq!(parse_line("shuffle 1"), Err(ConsoleError::Unknown("shuffle".to_string())));
    }

    #[test]
    fn test_render_replies() {
        let track = Track::new("q", "u", "Canción").with_duration_seconds(61);

        assert_eq!(
            render_reply(&ControlReply::Enqueued(EnqueueOutcome::Queued { track, position: 2 })),
            "➕ Agregada a la cola (#2): Canción [1:01]"
        );
        assert_eq!(
            render_reply(&ControlReply::Queue(vec!["a".into(), "b".into()])),
            "1. a\n2. b"
        );
        assert_eq!(render_reply(&ControlReply::Queue(vec![])), "📋 La cola está vacía");
    }
}
