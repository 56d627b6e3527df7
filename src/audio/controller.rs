//! Per-guild playback state machine.
//!
//! ```text
//!            enqueue (first)   connect lands        track_completed, queue empty
//!   Idle ──► Connecting ─────────────► Playing ──────────────────────► Disconnecting ──► Idle
//!                                       │  ▲  ▲                                    ▲
//!                                 pause │  │  │ track_completed, queue non-empty   │ stop
//!                                       ▼  │  └──────────────── (same state)       │ (any)
//!                                      Paused ── resume
//! ```
//!
//! Every method runs on the runtime task, one at a time, so two enqueues can
//! never both observe `Idle`. Nothing here waits on the network for long: a
//! connect runs as its own task and comes back as a [`ConnectFinished`] event,
//! and auto-advance happens once per [`TrackCompleted`] event. Nothing here
//! calls itself.

use serenity::model::id::{ChannelId, GuildId};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        registry::SessionRegistry,
        session::{GuildSession, PlaybackState, PlaybackStatus},
        track::Track,
        transport::{
            CompletionNotifier, ConnectFinished, PlaybackToken, TrackCompleted, VoiceTransport,
        },
    },
    error::{InvalidTransition, PlayerError, UserInputError},
};

/// Result of a successful enqueue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// The guild was idle. A connect is in flight and this track starts once
    /// it lands.
    Connecting(Track),
    /// The track started playing.
    NowPlaying(Track),
    /// Appended behind something else. `position` is 1-based.
    Queued { track: Track, position: usize },
}

/// Notifications for whoever renders playback (presence, panels, waiters).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    TrackStarted { guild_id: GuildId, track: Track },
    /// Nothing could be started: the connect failed or no track was playable.
    /// Always followed by `SessionEnded`.
    StartFailed { guild_id: GuildId, error: PlayerError },
    SessionEnded { guild_id: GuildId },
}

pub struct PlaybackController {
    registry: SessionRegistry,
    transport: Arc<dyn VoiceTransport>,
    completions: mpsc::UnboundedSender<TrackCompleted>,
    connects: mpsc::UnboundedSender<ConnectFinished>,
    events: broadcast::Sender<PlaybackEvent>,
    max_queue_size: usize,
    next_token: u64,
}

impl PlaybackController {
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        completions: mpsc::UnboundedSender<TrackCompleted>,
        connects: mpsc::UnboundedSender<ConnectFinished>,
        max_queue_size: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            registry: SessionRegistry::new(),
            transport,
            completions,
            connects,
            events,
            max_queue_size,
            next_token: 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }

    pub fn event_sender(&self) -> broadcast::Sender<PlaybackEvent> {
        self.events.clone()
    }

    #[cfg(test)]
    pub fn session(&self, guild_id: GuildId) -> Option<&GuildSession> {
        self.registry.get(guild_id)
    }

    /// Appends `track`. On an idle guild this also starts connecting to
    /// `channel_id`; the track plays once [`connect_finished`](Self::connect_finished)
    /// sees the connection.
    pub fn enqueue(
        &mut self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        track: Track,
    ) -> Result<EnqueueOutcome, PlayerError> {
        let max = self.max_queue_size;
        let attempt = self.issue_token();
        let session = self.registry.get_or_create(guild_id);

        if session.queue_len() >= max {
            self.registry.discard_if_dormant(guild_id);
            return Err(UserInputError::QueueFull { max }.into());
        }

        let position = match session.state() {
            PlaybackState::Idle => {
                let Some(channel_id) = channel_id else {
                    self.registry.discard_if_dormant(guild_id);
                    return Err(UserInputError::NotInVoiceChannel.into());
                };
                session.push_back(track.clone());
                session.begin_connecting(attempt);
                self.spawn_connect(guild_id, channel_id, attempt);
                info!("🔌 Conectando al canal {} en guild {}", channel_id, guild_id);
                return Ok(EnqueueOutcome::Connecting(track));
            }
            // La cabeza de la cola arranca cuando termine la conexión.
            PlaybackState::Connecting => session.queue_len(),
            PlaybackState::Playing | PlaybackState::Paused | PlaybackState::Disconnecting => {
                session.queue_len() + 1
            }
        };

        session.push_back(track.clone());
        info!("➕ Agregado a la cola (#{}) en guild {}: {}", position, guild_id, track.title());
        Ok(EnqueueOutcome::Queued { track, position })
    }

    /// Consumes the result of a connect started by [`enqueue`](Self::enqueue).
    pub async fn connect_finished(&mut self, done: ConnectFinished) {
        let ConnectFinished {
            guild_id,
            channel_id,
            attempt,
            result,
        } = done;

        let pending = self.registry.get(guild_id).and_then(GuildSession::pending_connect);
        if pending != Some(attempt) {
            debug!("Conexión obsoleta en guild {} ({:?}), descartada", guild_id, attempt);
            // Sin sesión, nadie más va a usar esa conexión.
            if let (Ok(mut voice), None) = (result, self.registry.get(guild_id)) {
                if let Err(e) = voice.disconnect().await {
                    warn!("⚠️ {} (guild {})", e, guild_id);
                }
            }
            return;
        }

        let voice = match result {
            Ok(voice) => voice,
            Err(e) => {
                error!("❌ No se pudo conectar en guild {}: {}", guild_id, e);
                self.finish_session(guild_id, Some(e.into())).await;
                return;
            }
        };

        let Some(session) = self.registry.get_mut(guild_id) else {
            return;
        };
        session.attach_voice(voice);
        info!("🔊 Conectado al canal {} en guild {}", channel_id, guild_id);

        if let Err(e) = self.start_next(guild_id).await {
            error!("❌ No se pudo iniciar la reproducción en guild {}: {}", guild_id, e);
        }
    }

    /// Consumes one completion event from the voice transport.
    pub async fn track_completed(&mut self, done: TrackCompleted) {
        let guild_id = done.guild_id;
        let Some(session) = self.registry.get_mut(guild_id) else {
            debug!("Fin de track para guild {} sin sesión, ignorado", guild_id);
            return;
        };

        if session.playing_token() != Some(done.token) {
            debug!("Fin de track obsoleto en guild {} ({:?}), ignorado", guild_id, done.token);
            return;
        }
        if !matches!(session.state(), PlaybackState::Playing | PlaybackState::Paused) {
            debug!("Fin de track en estado {:?}, ignorado", session.state());
            return;
        }

        if let Some(finished) = session.finish_current() {
            match done.error {
                Some(ref e) => warn!("⚠️ '{}' terminó con error: {}", finished.title(), e),
                None => debug!("✅ Terminó '{}' en guild {}", finished.title(), guild_id),
            }
        }

        if let Err(e) = self.start_next(guild_id).await {
            error!("Error al avanzar la cola en guild {}: {}", guild_id, e);
        }
    }

    /// Stops the current source; the resulting completion does the advance.
    pub async fn skip(&mut self, guild_id: GuildId) -> Result<Track, PlayerError> {
        let session = self.registry.get(guild_id).ok_or(InvalidTransition::NotPlaying)?;
        if !matches!(session.state(), PlaybackState::Playing | PlaybackState::Paused) {
            return Err(InvalidTransition::NotPlaying.into());
        }
        let skipped = session.current_track().cloned().ok_or(InvalidTransition::NotPlaying)?;
        let voice = session.voice().ok_or(InvalidTransition::NotConnected)?;

        if voice.is_playing().await || voice.is_paused().await {
            voice.stop()?;
            info!("⏭️ Saltando '{}' en guild {}", skipped.title(), guild_id);
        } else {
            debug!("El track ya terminó en guild {}, el avance está en camino", guild_id);
        }
        Ok(skipped)
    }

    pub fn pause(&mut self, guild_id: GuildId) -> Result<(), PlayerError> {
        let session = self.registry.get_mut(guild_id).ok_or(InvalidTransition::NotPlaying)?;
        if session.state() != PlaybackState::Playing {
            return Err(InvalidTransition::NotPlaying.into());
        }
        session.voice().ok_or(InvalidTransition::NotConnected)?.pause()?;
        session.set_paused();
        info!("⏸️ Reproducción pausada en guild {}", guild_id);
        Ok(())
    }

    pub fn resume(&mut self, guild_id: GuildId) -> Result<(), PlayerError> {
        let session = self.registry.get_mut(guild_id).ok_or(InvalidTransition::NotPaused)?;
        if session.state() != PlaybackState::Paused {
            return Err(InvalidTransition::NotPaused.into());
        }
        session.voice().ok_or(InvalidTransition::NotConnected)?.resume()?;
        session.set_playing();
        info!("▶️ Reproducción reanudada en guild {}", guild_id);
        Ok(())
    }

    /// Clears the queue, disconnects and forgets the guild. Returns how many
    /// queued tracks were dropped.
    pub async fn stop(&mut self, guild_id: GuildId) -> Result<usize, PlayerError> {
        let connected = self
            .registry
            .get(guild_id)
            .is_some_and(|s| s.state() != PlaybackState::Idle || s.has_voice());
        if !connected {
            self.registry.discard_if_dormant(guild_id);
            return Err(InvalidTransition::NotConnected.into());
        }

        let Some(mut session) = self.registry.remove(guild_id) else {
            return Err(InvalidTransition::NotConnected.into());
        };
        let cleared = session.clear_queue();

        if let Some(voice) = session.voice() {
            if voice.is_playing().await || voice.is_paused().await {
                // La notificación de fin que genere este stop queda obsoleta.
                if let Err(e) = voice.stop() {
                    warn!("⚠️ {}", e);
                }
            }
        }
        session.release_voice().await;
        let _ = self.events.send(PlaybackEvent::SessionEnded { guild_id });

        info!("⏹️ Reproducción detenida en guild {} ({} en cola descartadas)", guild_id, cleared);
        Ok(cleared)
    }

    /// The gateway reports the bot out of voice in `guild_id`. The session is
    /// stopped only if its own connection is really gone: the report may be
    /// about a connection that was already replaced. Returns the number of
    /// queued tracks dropped, or `None` when the report was ignored.
    pub async fn voice_lost(&mut self, guild_id: GuildId) -> Option<usize> {
        // Sin conexión todavía: hay un connect en curso, no es esta.
        let voice = self.registry.get(guild_id)?.voice()?;
        if voice.is_connected().await {
            debug!("Desconexión obsoleta en guild {}, ignorada", guild_id);
            return None;
        }

        info!("🔌 Conexión de voz perdida en guild {}", guild_id);
        self.stop(guild_id).await.ok()
    }

    pub fn status(&self, guild_id: GuildId) -> PlaybackStatus {
        self.registry
            .get(guild_id)
            .map_or(PlaybackStatus::Stopped, |s| s.state().into())
    }

    pub fn list_queue(&self, guild_id: GuildId) -> Vec<String> {
        self.registry
            .get(guild_id)
            .map(GuildSession::queued_titles)
            .unwrap_or_default()
    }

    pub fn now_playing(&self, guild_id: GuildId) -> Option<Track> {
        self.registry.get(guild_id)?.current_track().cloned()
    }

    /// Tears every session down. Used when the runtime is shutting down.
    pub async fn stop_all(&mut self) {
        for guild_id in self.registry.guild_ids() {
            if let Err(e) = self.stop(guild_id).await {
                debug!("Sesión de guild {} ya estaba cerrada: {}", guild_id, e);
            }
        }
    }

    // Funciones privadas

    fn issue_token(&mut self) -> PlaybackToken {
        self.next_token += 1;
        PlaybackToken(self.next_token)
    }

    fn spawn_connect(&self, guild_id: GuildId, channel_id: ChannelId, attempt: PlaybackToken) {
        let transport = self.transport.clone();
        let connects = self.connects.clone();

        tokio::spawn(async move {
            let result = transport.connect(guild_id, channel_id).await;
            let done = ConnectFinished {
                guild_id,
                channel_id,
                attempt,
                result,
            };
            if connects.send(done).is_err() {
                debug!("Runtime cerrado, se descarta la conexión de guild {}", guild_id);
            }
        });
    }

    /// Pops queue heads until one starts. When none does, the session is torn
    /// down; the last start failure is returned if there was one.
    async fn start_next(&mut self, guild_id: GuildId) -> Result<Option<Track>, PlayerError> {
        let mut last_error = None;

        loop {
            let token = self.issue_token();
            let notifier = CompletionNotifier::new(self.completions.clone(), guild_id, token);
            let Some(session) = self.registry.get_mut(guild_id) else {
                return Ok(None);
            };
            let Some(track) = session.pop_next() else {
                break;
            };

            match session.begin_playback(track.clone(), token, notifier).await {
                Ok(()) => {
                    let _ = self.events.send(PlaybackEvent::TrackStarted {
                        guild_id,
                        track: track.clone(),
                    });
                    return Ok(Some(track));
                }
                Err(e) => {
                    warn!("⚠️ Saltando '{}': {}", track.title(), e);
                    last_error = Some(PlayerError::from(e));
                }
            }
        }

        self.finish_session(guild_id, last_error.clone()).await;
        match last_error {
            Some(e) => Err(e),
            None => Ok(None),
        }
    }

    /// Nothing left to play: disconnect and drop the entry. `failure` is why
    /// nothing could start, if that is how the session ended.
    async fn finish_session(&mut self, guild_id: GuildId, failure: Option<PlayerError>) {
        let Some(mut session) = self.registry.remove(guild_id) else {
            return;
        };
        match failure {
            Some(ref e) => warn!("⚠️ Sesión de guild {} terminada: {}", guild_id, e),
            None => info!("📭 Cola vacía en guild {}, desconectando", guild_id),
        }
        session.release_voice().await;

        if let Some(error) = failure {
            let _ = self.events.send(PlaybackEvent::StartFailed { guild_id, error });
        }
        let _ = self.events.send(PlaybackEvent::SessionEnded { guild_id });
    }
}
