//! Seams between the playback state machine and the voice layer.
//!
//! The controller only talks to [`VoiceTransport`] / [`VoiceConnection`].
//! Completion callbacks and connects never touch session state: they post a
//! [`TrackCompleted`] or [`ConnectFinished`] event that the runtime task feeds
//! back into the controller.

use async_trait::async_trait;
use serenity::model::id::{ChannelId, GuildId};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{audio::track::Track, error::TransportError};

/// Identifies one played source. A completion is only honoured if its token
/// matches the source the session is currently playing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackToken(pub(crate) u64);

/// A played source ended, successfully or not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackCompleted {
    pub guild_id: GuildId,
    pub token: PlaybackToken,
    pub error: Option<String>,
}

/// A connect started by an enqueue on an idle guild finished.
///
/// `attempt` identifies the connect; a result whose attempt no longer matches
/// the session (stopped meanwhile, or a newer connect) is discarded.
pub struct ConnectFinished {
    pub guild_id: GuildId,
    pub channel_id: ChannelId,
    pub attempt: PlaybackToken,
    pub result: Result<Box<dyn VoiceConnection>, TransportError>,
}

impl fmt::Debug for ConnectFinished {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectFinished")
            .field("guild_id", &self.guild_id)
            .field("channel_id", &self.channel_id)
            .field("attempt", &self.attempt)
            .field("result", &self.result.as_ref().map(|_| "connected"))
            .finish()
    }
}

/// Handed to [`VoiceConnection::play`]; fires at most once per source no
/// matter how many transport events end up calling it.
#[derive(Debug, Clone)]
pub struct CompletionNotifier {
    sink: mpsc::UnboundedSender<TrackCompleted>,
    guild_id: GuildId,
    token: PlaybackToken,
    fired: Arc<AtomicBool>,
}

impl CompletionNotifier {
    pub fn new(
        sink: mpsc::UnboundedSender<TrackCompleted>,
        guild_id: GuildId,
        token: PlaybackToken,
    ) -> Self {
        Self {
            sink,
            guild_id,
            token,
            fired: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Re-posts the completion onto the runtime. Safe to call from any thread.
    pub fn notify(&self, error: Option<String>) {
        if self.fired.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(ref error) = error {
            warn!("❌ Error reproduciendo en guild {}: {}", self.guild_id, error);
        }

        let event = TrackCompleted {
            guild_id: self.guild_id,
            token: self.token,
            error,
        };
        if self.sink.send(event).is_err() {
            debug!("Runtime cerrado, se descarta fin de track en guild {}", self.guild_id);
        }
    }

    #[cfg(test)]
    pub fn has_fired(&self) -> bool {
        self.fired.load(Ordering::SeqCst)
    }
}

/// Opens voice connections.
#[async_trait]
pub trait VoiceTransport: Send + Sync {
    async fn connect(
        &self,
        guild_id: GuildId,
        channel_id: ChannelId,
    ) -> Result<Box<dyn VoiceConnection>, TransportError>;
}

/// One live voice connection, exclusively owned by a guild session.
#[async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Starts `track`. `on_complete` must fire exactly once when it ends.
    async fn play(
        &mut self,
        track: &Track,
        on_complete: CompletionNotifier,
    ) -> Result<(), TransportError>;

    fn pause(&self) -> Result<(), TransportError>;

    fn resume(&self) -> Result<(), TransportError>;

    /// Stops the current source; its completion fires through the normal path.
    fn stop(&self) -> Result<(), TransportError>;

    async fn disconnect(&mut self) -> Result<(), TransportError>;

    async fn is_playing(&self) -> bool;

    async fn is_paused(&self) -> bool;

    /// False once the voice server dropped us, e.g. kicked or moved out.
    async fn is_connected(&self) -> bool;
}

#[cfg(test)]
pub mod testing {
    //! Recording transport used by the state machine and runtime tests.

    use super::*;
    use parking_lot::Mutex;
    use std::{
        collections::{HashMap, HashSet},
        time::Duration,
    };

    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    pub struct VoiceLog {
        pub connects: Vec<(GuildId, ChannelId)>,
        pub played: Vec<String>,
        pub pauses: usize,
        pub resumes: usize,
        pub stops: usize,
        pub disconnects: usize,
    }

    #[derive(Debug, Default)]
    struct ConnState {
        notifier: Option<CompletionNotifier>,
        paused: bool,
        dropped: bool,
    }

    #[derive(Debug, Default)]
    struct Shared {
        log: VoiceLog,
        fail_connect: bool,
        connect_delay: Option<Duration>,
        failing_titles: HashSet<String>,
        connections: HashMap<GuildId, Arc<Mutex<ConnState>>>,
    }

    #[derive(Debug, Clone, Default)]
    pub struct FakeTransport {
        shared: Arc<Mutex<Shared>>,
    }

    impl FakeTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn log(&self) -> VoiceLog {
            self.shared.lock().log.clone()
        }

        pub fn fail_connects(&self) {
            self.shared.lock().fail_connect = true;
        }

        /// Makes every connect take `delay`, like a slow voice server.
        pub fn delay_connects(&self, delay: Duration) {
            self.shared.lock().connect_delay = Some(delay);
        }

        /// Simulates the bot being kicked from the voice channel of `guild_id`.
        pub fn drop_connection(&self, guild_id: GuildId) {
            let conn = self.shared.lock().connections.get(&guild_id).cloned();
            if let Some(conn) = conn {
                let mut state = conn.lock();
                state.dropped = true;
                state.notifier = None;
            }
        }

        pub fn fail_playback_of(&self, title: &str) {
            self.shared.lock().failing_titles.insert(title.to_string());
        }

        /// Lets the current source of `guild_id` end on its own.
        pub fn finish(&self, guild_id: GuildId) -> bool {
            let conn = self.shared.lock().connections.get(&guild_id).cloned();
            let notifier = conn.and_then(|c| c.lock().notifier.take());
            match notifier {
                Some(notifier) => {
                    notifier.notify(None);
                    true
                }
                None => false,
            }
        }
    }

    #[async_trait]
    impl VoiceTransport for FakeTransport {
        async fn connect(
            &self,
            guild_id: GuildId,
            channel_id: ChannelId,
        ) -> Result<Box<dyn VoiceConnection>, TransportError> {
            let delay = self.shared.lock().connect_delay;
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            let mut shared = self.shared.lock();
            if shared.fail_connect {
                return Err(TransportError::Connect("canal lleno".to_string()));
            }
            shared.log.connects.push((guild_id, channel_id));
            let state = Arc::new(Mutex::new(ConnState::default()));
            shared.connections.insert(guild_id, state.clone());

            Ok(Box::new(FakeConnection {
                shared: self.shared.clone(),
                state,
            }))
        }
    }

    struct FakeConnection {
        shared: Arc<Mutex<Shared>>,
        state: Arc<Mutex<ConnState>>,
    }

    #[async_trait]
    impl VoiceConnection for FakeConnection {
        async fn play(
            &mut self,
            track: &Track,
            on_complete: CompletionNotifier,
        ) -> Result<(), TransportError> {
            let mut shared = self.shared.lock();
            if shared.failing_titles.contains(track.title()) {
                return Err(TransportError::Playback(format!("no se pudo abrir {}", track.title())));
            }
            shared.log.played.push(track.title().to_string());

            let mut state = self.state.lock();
            state.notifier = Some(on_complete);
            state.paused = false;
            Ok(())
        }

        fn pause(&self) -> Result<(), TransportError> {
            self.shared.lock().log.pauses += 1;
            self.state.lock().paused = true;
            Ok(())
        }

        fn resume(&self) -> Result<(), TransportError> {
            self.shared.lock().log.resumes += 1;
            self.state.lock().paused = false;
            Ok(())
        }

        fn stop(&self) -> Result<(), TransportError> {
            self.shared.lock().log.stops += 1;
            let notifier = {
                let mut state = self.state.lock();
                state.paused = false;
                state.notifier.take()
            };
            if let Some(notifier) = notifier {
                notifier.notify(None);
            }
            Ok(())
        }

        async fn disconnect(&mut self) -> Result<(), TransportError> {
            self.shared.lock().log.disconnects += 1;
            self.state.lock().notifier = None;
            Ok(())
        }

        async fn is_playing(&self) -> bool {
            let state = self.state.lock();
            state.notifier.is_some() && !state.paused
        }

        async fn is_paused(&self) -> bool {
            let state = self.state.lock();
            state.notifier.is_some() && state.paused
        }

        async fn is_connected(&self) -> bool {
            !self.state.lock().dropped
        }
    }
}
