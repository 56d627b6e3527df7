use serenity::model::id::{ChannelId, GuildId};
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use super::bridge::CommandBridge;
use crate::{
    audio::{
        controller::{EnqueueOutcome, PlaybackController, PlaybackEvent},
        session::PlaybackStatus,
        track::Track,
    },
    error::{BridgeError, PlayerError, UserInputError},
    sources::ResolverPool,
};

/// Everything a control surface can ask of the player besides enqueueing,
/// which goes through [`PlayerClient::enqueue`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Skip(GuildId),
    Pause(GuildId),
    Resume(GuildId),
    Stop(GuildId),
    Status(GuildId),
    ListQueue(GuildId),
    NowPlaying(GuildId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlReply {
    Enqueued(EnqueueOutcome),
    Skipped(Track),
    Paused,
    Resumed,
    Stopped { cleared: usize },
    Status(PlaybackStatus),
    Queue(Vec<String>),
    NowPlaying(Option<Track>),
}

impl ControlCommand {
    pub fn guild_id(&self) -> GuildId {
        match self {
            ControlCommand::Skip(id)
            | ControlCommand::Pause(id)
            | ControlCommand::Resume(id)
            | ControlCommand::Stop(id)
            | ControlCommand::Status(id)
            | ControlCommand::ListQueue(id)
            | ControlCommand::NowPlaying(id) => *id,
        }
    }

    /// Runs the command against the controller. Only called on the runtime task.
    pub async fn apply(self, controller: &mut PlaybackController) -> Result<ControlReply, PlayerError> {
        let reply = match self {
            ControlCommand::Skip(id) => ControlReply::Skipped(controller.skip(id).await?),
            ControlCommand::Pause(id) => {
                controller.pause(id)?;
                ControlReply::Paused
            }
            ControlCommand::Resume(id) => {
                controller.resume(id)?;
                ControlReply::Resumed
            }
            ControlCommand::Stop(id) => ControlReply::Stopped {
                cleared: controller.stop(id).await?,
            },
            ControlCommand::Status(id) => ControlReply::Status(controller.status(id)),
            ControlCommand::ListQueue(id) => ControlReply::Queue(controller.list_queue(id)),
            ControlCommand::NowPlaying(id) => ControlReply::NowPlaying(controller.now_playing(id)),
        };
        Ok(reply)
    }
}

/// What control surfaces hold: a bridge, the resolver pool and the wait bound.
#[derive(Clone)]
pub struct PlayerClient {
    bridge: CommandBridge,
    resolver: ResolverPool,
    timeout: Duration,
}

impl PlayerClient {
    pub fn new(bridge: CommandBridge, resolver: ResolverPool, timeout: Duration) -> Self {
        Self {
            bridge,
            resolver,
            timeout,
        }
    }

    /// Blocking. For threads outside the runtime.
    pub fn execute(&self, command: ControlCommand) -> Result<ControlReply, BridgeError> {
        debug!("➡️ {} (guild {})", command_name(&command), command.guild_id());
        self.bridge
            .submit(move |controller| Box::pin(command.apply(controller)), self.timeout)
    }

    pub async fn execute_async(&self, command: ControlCommand) -> Result<ControlReply, BridgeError> {
        debug!("➡️ {} (guild {})", command_name(&command), command.guild_id());
        self.bridge
            .submit_async(move |controller| Box::pin(command.apply(controller)), self.timeout)
            .await
    }

    /// Blocking counterpart of [`enqueue_async`](Self::enqueue_async) for
    /// threads outside the runtime. The wait runs on the resolver workers.
    pub fn enqueue(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        query: &str,
    ) -> Result<ControlReply, BridgeError> {
        self.resolver
            .block_on(self.enqueue_async(guild_id, channel_id, query))
    }

    /// Resolves `query` off the runtime, then enqueues the result. On an idle
    /// guild it also waits, off the runtime, until the track starts.
    pub async fn enqueue_async(
        &self,
        guild_id: GuildId,
        channel_id: Option<ChannelId>,
        query: &str,
    ) -> Result<ControlReply, BridgeError> {
        let query = non_empty(query)?;
        let track = self.resolver.resolve(query).await?;
        info!("🎶 Resuelto '{}' → {}", query, track.title());

        debug!("➡️ enqueue (guild {})", guild_id);
        let (outcome, events) = self
            .bridge
            .submit_async(
                move |controller| {
                    Box::pin(async move {
                        // Suscrito antes de encolar: no se pierde ningún evento del arranque.
                        let events = controller.subscribe();
                        controller
                            .enqueue(guild_id, channel_id, track)
                            .map(|outcome| (outcome, events))
                    })
                },
                self.timeout,
            )
            .await?;

        match outcome {
            EnqueueOutcome::Connecting(track) => self.await_start(guild_id, track, events).await,
            outcome => Ok(ControlReply::Enqueued(outcome)),
        }
    }

    /// Reports that the gateway saw the bot leave voice in `guild_id`.
    /// `Some(cleared)` if that tore the session down.
    pub async fn voice_lost_async(&self, guild_id: GuildId) -> Result<Option<usize>, BridgeError> {
        debug!("➡️ voice_lost (guild {})", guild_id);
        self.bridge
            .submit_async(
                move |controller| Box::pin(async move { Ok(controller.voice_lost(guild_id).await) }),
                self.timeout,
            )
            .await
    }

    async fn await_start(
        &self,
        guild_id: GuildId,
        track: Track,
        mut events: broadcast::Receiver<PlaybackEvent>,
    ) -> Result<ControlReply, BridgeError> {
        let started = async {
            loop {
                match events.recv().await {
                    Ok(PlaybackEvent::TrackStarted { guild_id: id, track }) if id == guild_id => {
                        return Ok(ControlReply::Enqueued(EnqueueOutcome::NowPlaying(track)));
                    }
                    Ok(PlaybackEvent::StartFailed { guild_id: id, error }) if id == guild_id => {
                        return Err(BridgeError::Failed(error));
                    }
                    Ok(PlaybackEvent::SessionEnded { guild_id: id }) if id == guild_id => {
                        return Err(PlayerError::OperationAborted.into());
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => debug!("Espera de arranque atrasada {} eventos", skipped),
                    Err(RecvError::Closed) => return Err(PlayerError::RuntimeUnavailable.into()),
                }
            }
        };

        match tokio::time::timeout(self.timeout, started).await {
            Ok(reply) => reply,
            Err(_) => {
                warn!("⏱️ '{}' sigue conectando tras {:?}", track.title(), self.timeout);
                Err(BridgeError::Timeout(self.timeout))
            }
        }
    }
}

fn command_name(command: &ControlCommand) -> &'static str {
    match command {
        ControlCommand::Skip(_) => "skip",
        ControlCommand::Pause(_) => "pause",
        ControlCommand::Resume(_) => "resume",
        ControlCommand::Stop(_) => "stop",
        ControlCommand::Status(_) => "status",
        ControlCommand::ListQueue(_) => "list_queue",
        ControlCommand::NowPlaying(_) => "now_playing",
    }
}

fn non_empty(query: &str) -> Result<&str, UserInputError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(UserInputError::EmptyQuery);
    }
    Ok(query)
}
