use serenity::model::id::GuildId;
use std::{collections::VecDeque, fmt};
use tracing::{debug, info, warn};

use crate::{
    audio::{
        track::Track,
        transport::{CompletionNotifier, PlaybackToken, VoiceConnection},
    },
    error::TransportError,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Connecting,
    Playing,
    Paused,
    Disconnecting,
}

/// What control surfaces see of [`PlaybackState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackStatus {
    Playing,
    Paused,
    Stopped,
}

impl From<PlaybackState> for PlaybackStatus {
    fn from(state: PlaybackState) -> Self {
        match state {
            PlaybackState::Playing => PlaybackStatus::Playing,
            PlaybackState::Paused => PlaybackStatus::Paused,
            PlaybackState::Idle | PlaybackState::Connecting | PlaybackState::Disconnecting => {
                PlaybackStatus::Stopped
            }
        }
    }
}

impl fmt::Display for PlaybackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlaybackStatus::Playing => "Playing",
            PlaybackStatus::Paused => "Paused",
            PlaybackStatus::Stopped => "Stopped",
        };
        f.write_str(label)
    }
}

/// Playback state of one guild.
///
/// Only the runtime task holds a `GuildSession`, so nothing here is locked.
/// The transition helpers keep `current_track` present exactly while
/// Playing/Paused, and a voice handle (live, or pending while Connecting)
/// present exactly while not Idle.
pub struct GuildSession {
    guild_id: GuildId,
    queue: VecDeque<Track>,
    current_track: Option<Track>,
    state: PlaybackState,
    voice: Option<Box<dyn VoiceConnection>>,
    token: Option<PlaybackToken>,
    pending_connect: Option<PlaybackToken>,
}

impl GuildSession {
    pub fn new(guild_id: GuildId) -> Self {
        Self {
            guild_id,
            queue: VecDeque::new(),
            current_track: None,
            state: PlaybackState::Idle,
            voice: None,
            token: None,
            pending_connect: None,
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn queued_titles(&self) -> Vec<String> {
        self.queue.iter().map(|t| t.title().to_string()).collect()
    }

    pub fn voice(&self) -> Option<&dyn VoiceConnection> {
        self.voice.as_deref()
    }

    pub fn has_voice(&self) -> bool {
        self.voice.is_some()
    }

    /// Token of the source currently handed to the voice connection.
    pub fn playing_token(&self) -> Option<PlaybackToken> {
        self.token
    }

    /// Attempt of the connect still in flight, if any.
    pub fn pending_connect(&self) -> Option<PlaybackToken> {
        self.pending_connect
    }

    /// Idle, nothing queued, nothing connected: safe to drop from the registry.
    pub fn is_dormant(&self) -> bool {
        self.state == PlaybackState::Idle && self.queue.is_empty() && self.voice.is_none()
    }

    pub fn push_back(&mut self, track: Track) {
        debug!("➕ Agregado a la cola de {}: {}", self.guild_id, track.title());
        self.queue.push_back(track);
    }

    /// FIFO pop, the only way tracks leave the queue besides a clear.
    pub fn pop_next(&mut self) -> Option<Track> {
        self.queue.pop_front()
    }

    pub fn clear_queue(&mut self) -> usize {
        let cleared = self.queue.len();
        self.queue.clear();
        cleared
    }

    /// `Idle → Connecting`. The connect itself runs elsewhere; its result
    /// comes back tagged with `attempt`.
    pub fn begin_connecting(&mut self, attempt: PlaybackToken) {
        self.pending_connect = Some(attempt);
        self.state = PlaybackState::Connecting;
    }

    /// The pending connect landed. Still Connecting until a track starts.
    pub fn attach_voice(&mut self, voice: Box<dyn VoiceConnection>) {
        self.pending_connect = None;
        self.voice = Some(voice);
        self.state = PlaybackState::Connecting;
    }

    /// Hands `track` to the voice connection and makes it current.
    pub async fn begin_playback(
        &mut self,
        track: Track,
        token: PlaybackToken,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError> {
        let voice = self
            .voice
            .as_mut()
            .ok_or_else(|| TransportError::Playback("sin conexión de voz".to_string()))?;

        if let Err(e) = voice.play(&track, on_complete).await {
            self.current_track = None;
            self.token = None;
            return Err(e);
        }

        info!("🎵 Reproduciendo en guild {}: {}", self.guild_id, track.title());
        self.current_track = Some(track);
        self.token = Some(token);
        self.state = PlaybackState::Playing;
        Ok(())
    }

    /// Drops the finished track. The caller decides what plays next.
    pub fn finish_current(&mut self) -> Option<Track> {
        self.token = None;
        self.current_track.take()
    }

    pub fn set_paused(&mut self) {
        self.state = PlaybackState::Paused;
    }

    pub fn set_playing(&mut self) {
        self.state = PlaybackState::Playing;
    }

    /// `→ Disconnecting → Idle`, releasing the voice handle.
    pub async fn release_voice(&mut self) {
        self.current_track = None;
        self.token = None;
        self.pending_connect = None;

        if let Some(voice) = self.voice.as_mut() {
            self.state = PlaybackState::Disconnecting;
            if let Err(e) = voice.disconnect().await {
                warn!("⚠️ {} (guild {})", e, self.guild_id);
            }
        }

        self.voice = None;
        self.state = PlaybackState::Idle;
        info!("👋 Sesión de voz liberada en guild {}", self.guild_id);
    }
}

impl fmt::Debug for GuildSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuildSession")
            .field("guild_id", &self.guild_id)
            .field("state", &self.state)
            .field("current_track", &self.current_track.as_ref().map(Track::title))
            .field("queue_len", &self.queue.len())
            .field("has_voice", &self.voice.is_some())
            .field("pending_connect", &self.pending_connect)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fifo_order_preserved() {
        let mut session = GuildSession::new(GuildId::new(1));
        for title in ["a", "b", "a"] {
            session.push_back(Track::new(title, format!("https://x/{title}"), title));
        }

        assert_eq!(session.queued_titles(), vec!["a", "b", "a"]);
        assert_eq!(session.pop_next().map(|t| t.title().to_string()), Some("a".into()));
        assert_eq!(session.queued_titles(), vec!["b", "a"]);
    }

    #[test]
    fn test_new_session_is_dormant() {
        let mut session = GuildSession::new(GuildId::new(1));
        assert!(session.is_dormant());
        session.push_back(Track::new("q", "u", "t"));
        assert!(!session.is_dormant());
        assert_eq!(session.clear_queue(), 1);
        assert!(session.is_dormant());
    }

    #[test]
    fn test_connecting_session_is_not_dormant() {
        let mut session = GuildSession::new(GuildId::new(1));
        session.begin_connecting(PlaybackToken(4));

        assert_eq!(session.state(), PlaybackState::Connecting);
        assert_eq!(session.pending_connect(), Some(PlaybackToken(4)));
        assert!(session.current_track().is_none());
        assert!(!session.is_dormant());
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(PlaybackStatus::from(PlaybackState::Connecting), PlaybackStatus::Stopped);
        assert_eq!(PlaybackStatus::from(PlaybackState::Paused), PlaybackStatus::Paused);
        assert_eq!(PlaybackStatus::Playing.to_string(), "Playing");
    }
}
