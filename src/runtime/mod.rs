//! # Runtime Module
//!
//! The single owner of all playback state.
//!
//! [`PlayerRuntime`] is a task on the bot's single-threaded tokio runtime. It
//! owns the [`PlaybackController`] and drains three queues one item at a time:
//! jobs submitted through a [`CommandBridge`], finished voice connects, and
//! track completions posted by the voice transport. Nothing else ever touches
//! a guild session, so every mutation is serialized without locks. Jobs never
//! wait on a voice connect, so one slow guild does not hold up the others.

pub mod bridge;
pub mod client;
pub mod shutdown;

use futures::{future::BoxFuture, FutureExt};
use std::{panic::AssertUnwindSafe, sync::Arc};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::audio::{
    controller::{PlaybackController, PlaybackEvent},
    transport::{ConnectFinished, TrackCompleted, VoiceTransport},
};

pub use bridge::CommandBridge;
pub use client::{ControlCommand, ControlReply, PlayerClient};
pub use shutdown::{BackgroundTasks, GatewayShutdown, NetworkShutdown, ShutdownCoordinator};

/// A unit of work executed against the controller on the runtime task.
pub(crate) type Job =
    Box<dyn for<'a> FnOnce(&'a mut PlaybackController) -> BoxFuture<'a, ()> + Send>;

/// Boxes a closure as a [`Job`] so its higher-ranked signature is inferred.
pub(crate) fn job<F>(f: F) -> Job
where
    F: for<'a> FnOnce(&'a mut PlaybackController) -> BoxFuture<'a, ()> + Send + 'static,
{
    Box::new(f)
}

pub struct PlayerRuntime {
    controller: PlaybackController,
    jobs: mpsc::UnboundedReceiver<Job>,
    completions: mpsc::UnboundedReceiver<TrackCompleted>,
    connects: mpsc::UnboundedReceiver<ConnectFinished>,
    shutdown: CancellationToken,
}

impl PlayerRuntime {
    /// Builds the runtime and the bridge that feeds it.
    pub fn new(
        transport: Arc<dyn VoiceTransport>,
        max_queue_size: usize,
        shutdown: CancellationToken,
    ) -> (Self, CommandBridge) {
        let (jobs_tx, jobs) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let (connects_tx, connects) = mpsc::unbounded_channel();
        let controller =
            PlaybackController::new(transport, completions_tx, connects_tx, max_queue_size);

        let runtime = Self {
            controller,
            jobs,
            completions,
            connects,
            shutdown,
        };
        (runtime, CommandBridge::new(jobs_tx))
    }

    pub fn event_sender(&self) -> broadcast::Sender<PlaybackEvent> {
        self.controller.event_sender()
    }

    /// Serves jobs, connects and completions until shutdown, then stops every session.
    pub async fn run(mut self) {
        info!("🎛️ Runtime del reproductor iniciado");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => {
                    debug!("Señal de apagado recibida por el runtime del reproductor");
                    break;
                }

                Some(done) = self.connects.recv() => {
                    self.controller.connect_finished(done).await;
                }

                Some(done) = self.completions.recv() => {
                    self.controller.track_completed(done).await;
                }

                job = self.jobs.recv() => match job {
                    Some(job) => self.run_job(job).await,
                    None => {
                        debug!("Todos los bridges se cerraron");
                        break;
                    }
                },
            }
        }

        self.controller.stop_all().await;
        info!("🛑 Runtime del reproductor detenido");
    }

    async fn run_job(&mut self, job: Job) {
        // Un job que entra en pánico suelta su canal de respuesta; el llamador
        // recibe OperationAborted y el runtime sigue atendiendo.
        if AssertUnwindSafe(job(&mut self.controller))
            .catch_unwind()
            .await
            .is_err()
        {
            error!("💥 Un comando del reproductor entró en pánico");
        }
    }
}
