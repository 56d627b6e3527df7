//! # Bot Module
//!
//! Discord side of Guild Jukebox.
//!
//! [`MusicBot`] implements Serenity's [`EventHandler`]. Slash commands and
//! player buttons become [`ControlCommand`]s sent through the
//! [`PlayerClient`]; the bot itself holds no playback state.
//!
//! - [`commands`]: slash command definitions and registration
//! - [`handlers`]: command and button dispatch

use anyhow::Result;
use serenity::{
    all::{ActivityData, Context, EventHandler, GuildId, Interaction, Ready, VoiceState},
    async_trait,
};
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::controller::PlaybackEvent,
    config::Config,
    runtime::{BackgroundTasks, PlayerClient},
};

/// Main Discord event handler.
pub struct MusicBot {
    config: Arc<Config>,
    player: PlayerClient,
    events: broadcast::Sender<PlaybackEvent>,
    tasks: BackgroundTasks,
    shutdown: CancellationToken,
    presence_started: AtomicBool,
}

impl MusicBot {
    pub fn new(
        config: Arc<Config>,
        player: PlayerClient,
        events: broadcast::Sender<PlaybackEvent>,
        tasks: BackgroundTasks,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            config,
            player,
            events,
            tasks,
            shutdown,
            presence_started: AtomicBool::new(false),
        }
    }

    pub fn player(&self) -> &PlayerClient {
        &self.player
    }

    pub fn footer(&self) -> &str {
        &self.config.embed_footer
    }

    /// Registers slash commands with Discord.
    ///
    /// Per-guild registration when `GUILD_ID` is set (instant, for
    /// development), global otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);
                info!("🏠 Registrando comandos para guild específica: {}", guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await.map_err(|e| {
                    error!("❌ Error registrando comandos de guild: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos de guild. Verifica que el bot tenga permisos de 'applications.commands' en la guild.")
                })?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                info!("🌐 Registrando comandos globalmente");
                commands::register_global_commands(ctx).await.map_err(|e| {
                    error!("❌ Error registrando comandos globales: {:?}", e);
                    anyhow::anyhow!("No se pudieron registrar comandos globales. Verifica que el bot tenga permisos de 'applications.commands'.")
                })?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }
}

#[async_trait]
impl EventHandler for MusicBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite en cada reconexión; la presencia se lanza una vez.
        if !self.presence_started.swap(true, Ordering::SeqCst) {
            self.tasks.spawn(
                "presence",
                presence_updates(ctx, self.events.subscribe(), self.shutdown.clone()),
            );
        }
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command_interaction) => {
                if let Err(e) = handlers::handle_command(&ctx, command_interaction, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component_interaction) => {
                if let Err(e) = handlers::handle_component(&ctx, component_interaction, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    /// Stops the guild's session when the bot is removed from voice by
    /// someone else. The event may be stale (our own /stop, or a connection
    /// already replaced by a newer one), so the runtime checks the live
    /// connection before stopping anything.
    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let current_user_id = ctx.cache.current_user().id;
        if new.user_id != current_user_id || old.is_none() || new.channel_id.is_some() {
            return;
        }
        let Some(guild_id) = new.guild_id else {
            return;
        };

        info!("🔌 Bot desconectado en guild {}", guild_id);
        match self.player.voice_lost_async(guild_id).await {
            Ok(Some(cleared)) => info!(
                "🧹 Sesión de guild {} cerrada tras la desconexión ({} en cola descartadas)",
                guild_id, cleared
            ),
            Ok(None) => debug!("Desconexión de guild {} sin efecto sobre la sesión actual", guild_id),
            Err(e) => warn!("⚠️ No se pudo cerrar la sesión de guild {}: {}", guild_id, e),
        }
    }
}

/// Keeps "Escuchando <título>" in sync with playback until shutdown.
async fn presence_updates(
    ctx: Context,
    mut events: broadcast::Receiver<PlaybackEvent>,
    shutdown: CancellationToken,
) {
    let mut playing: HashMap<GuildId, String> = HashMap::new();

    loop {
        let event = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = events.recv() => event,
        };

        match event {
            Ok(event) => {
                apply_event(&mut playing, event);
                ctx.set_activity(playing.values().next().map(ActivityData::listening));
            }
            Err(RecvError::Lagged(skipped)) => debug!("Presencia atrasada {} eventos", skipped),
            Err(RecvError::Closed) => break,
        }
    }

    ctx.set_activity(None);
}

fn apply_event(playing: &mut HashMap<GuildId, String>, event: PlaybackEvent) {
    match event {
        PlaybackEvent::TrackStarted { guild_id, track } => {
            playing.insert(guild_id, track.title().to_string());
        }
        PlaybackEvent::SessionEnded { guild_id } => {
            playing.remove(&guild_id);
        }
        // Siempre le sigue un SessionEnded.
        PlaybackEvent::StartFailed { .. } => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::track::Track;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_presence_tracks_active_guilds() {
        let mut playing = HashMap::new();
        let (a, b) = (GuildId::new(1), GuildId::new(2));

        apply_event(
            &mut playing,
            PlaybackEvent::TrackStarted {
                guild_id: a,
                track: Track::new("q", "u", "Uno"),
            },
        );
        apply_event(
            &mut playing,
            PlaybackEvent::TrackStarted {
                guild_id: a,
                track: Track::new("q", "u", "Dos"),
            },
        );
        apply_event(&mut playing, PlaybackEvent::SessionEnded { guild_id: b });

        assert_eq!(playing.get(&a).map(String::as_str), Some("Dos"));

        apply_event(&mut playing, PlaybackEvent::SessionEnded { guild_id: a });
        assert!(playing.is_empty());
    }
}
