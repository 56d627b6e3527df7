use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use songbird::{
    input::{Input, YoutubeDl},
    tracks::{PlayMode, TrackHandle},
    Call, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::{
    audio::{
        track::Track,
        transport::{CompletionNotifier, VoiceConnection, VoiceTransport},
    },
    error::TransportError,
};

/// Voice transport backed by Songbird.
pub struct SongbirdTransport {
    manager: Arc<Songbird>,
    http: reqwest::Client,
    volume: f32,
    ytdlp_path: &'static str,
}

impl SongbirdTransport {
    /// `ytdlp_path` is the yt-dlp compatible binary the audio streams are
    /// opened with.
    pub fn new(manager: Arc<Songbird>, http: reqwest::Client, volume: f32, ytdlp_path: String) -> Self {
        Self {
            manager,
            http,
            volume: volume.clamp(0.0, 2.0),
            // Songbird solo acepta inputs 'static; se crea una vez por proceso.
            ytdlp_path: Box::leak(ytdlp_path.into_boxed_str()),
        }
    }
}

#[async_trait]
impl VoiceTransport for SongbirdTransport {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError> {
        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;

        info!("🔊 Conectado al canal de voz {} en guild {}", channel_id, guild_id);

        Ok(Box::new(SongbirdConnection {
            manager: self.manager.clone(),
            guild_id,
            call,
            http: self.http.clone(),
            volume: self.volume,
            ytdlp_path: self.ytdlp_path,
            current: None,
        }))
    }
}

struct SongbirdConnection {
    manager: Arc<Songbird>,
    guild_id: GuildId,
    call: Arc<Mutex<Call>>,
    http: reqwest::Client,
    volume: f32,
    ytdlp_path: &'static str,
    current: Option<TrackHandle>,
}

impl SongbirdConnection {
    async fn play_mode(&self) -> Option<PlayMode> {
        let handle = self.current.as_ref()?;
        handle.get_info().await.ok().map(|state| state.playing)
    }
}

#[async_trait]
impl VoiceConnection for SongbirdConnection {
    async fn play(
        &mut self,
        track: &Track,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let input: Input = YoutubeDl::new_ytdl_like(
            self.ytdlp_path,
            self.http.clone(),
            track.resolved_url().to_string(),
        )
        .into();

        let handle = {
            let mut call = self.call.lock().await;
            call.play_input(input)
        };
        let _ = handle.set_volume(self.volume);

        // End y Error comparten el notificador: solo el primero cuenta.
        for event in [TrackEvent::End, TrackEvent::Error] {
            handle
                .add_event(
                    Event::Track(event),
                    TrackFinishedHandler {
                        notifier: on_complete.clone(),
                    },
                )
                .map_err(|e| TransportError::Playback(e.to_string()))?;
        }

        self.current = Some(handle);
        Ok(())
    }

    fn pause(&self) -> Result<(), TransportError> {
        if let Some(handle) = &self.current {
            handle
                .pause()
                .map_err(|e| TransportError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn resume(&self) -> Result<(), TransportError> {
        if let Some(handle) = &self.current {
            handle
                .play()
                .map_err(|e| TransportError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    fn stop(&self) -> Result<(), TransportError> {
        if let Some(handle) = &self.current {
            handle
                .stop()
                .map_err(|e| TransportError::Playback(e.to_string()))?;
        }
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.current = None;
        self.manager
            .remove(self.guild_id)
            .await
            .map_err(|e| TransportError::Disconnect(e.to_string()))?;
        info!("👋 Desconectado del canal de voz en guild {}", self.guild_id);
        Ok(())
    }

    async fn is_playing(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Play))
    }

    async fn is_paused(&self) -> bool {
        matches!(self.play_mode().await, Some(PlayMode::Pause))
    }

    async fn is_connected(&self) -> bool {
        self.call.lock().await.current_channel().is_some()
    }
}

/// Forwards Songbird's end/error events as one completion notification.
struct TrackFinishedHandler {
    notifier: CompletionNotifier,
}

#[async_trait]
impl VoiceEventHandler for TrackFinishedHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        let error = match ctx {
            EventContext::Track(tracks) => tracks.iter().find_map(|(state, _)| match &state.playing {
                PlayMode::Errored(e) => Some(format!("{:?}", e)),
                _ => None,
            }),
            _ => None,
        };

        debug!("Track terminado (error: {:?})", error);
        self.notifier.notify(error);

        None
    }
}
