//! Cross-thread request/response into the runtime task.
//!
//! Any thread can hold a [`CommandBridge`]. A submission is a closure over
//! `&mut PlaybackController`; it runs on the runtime task exactly once, in
//! scheduling order, and its result is handed back to the caller. Timing out
//! only abandons the wait: the operation still runs and its result is dropped.

use crossbeam_channel::RecvTimeoutError;
use futures::future::BoxFuture;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use super::{job, Job};
use crate::{
    audio::controller::PlaybackController,
    error::{BridgeError, PlayerError},
};

#[derive(Clone)]
pub struct CommandBridge {
    jobs: mpsc::UnboundedSender<Job>,
}

impl CommandBridge {
    pub(crate) fn new(jobs: mpsc::UnboundedSender<Job>) -> Self {
        Self { jobs }
    }

    /// Runs `op` on the runtime task and blocks until it finishes or
    /// `timeout` elapses.
    ///
    /// For plain threads only. Blocking the runtime thread itself would stop
    /// the very task that has to answer; use [`submit_async`](Self::submit_async)
    /// there.
    pub fn submit<T, F>(&self, op: F, timeout: Duration) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut PlaybackController) -> BoxFuture<'a, Result<T, PlayerError>>
            + Send
            + 'static,
    {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.schedule(job(move |controller| {
            Box::pin(async move {
                let result = op(controller).await;
                if reply_tx.send(result).is_err() {
                    debug!("El llamador ya no espera la respuesta");
                }
            })
        }))?;

        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result.map_err(BridgeError::Failed),
            Err(RecvTimeoutError::Timeout) => {
                warn!("⏱️ El reproductor no respondió en {:?}", timeout);
                Err(BridgeError::Timeout(timeout))
            }
            Err(RecvTimeoutError::Disconnected) => Err(PlayerError::OperationAborted.into()),
        }
    }

    /// Async counterpart of [`submit`](Self::submit) for callers running on
    /// the runtime thread.
    pub async fn submit_async<T, F>(&self, op: F, timeout: Duration) -> Result<T, BridgeError>
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut PlaybackController) -> BoxFuture<'a, Result<T, PlayerError>>
            + Send
            + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.schedule(job(move |controller| {
            Box::pin(async move {
                let result = op(controller).await;
                if reply_tx.send(result).is_err() {
                    debug!("El llamador ya no espera la respuesta");
                }
            })
        }))?;

        match tokio::time::timeout(timeout, reply_rx).await {
            Ok(Ok(result)) => result.map_err(BridgeError::Failed),
            Ok(Err(_)) => Err(PlayerError::OperationAborted.into()),
            Err(_) => {
                warn!("⏱️ El reproductor no respondió en {:?}", timeout);
                Err(BridgeError::Timeout(timeout))
            }
        }
    }

    fn schedule(&self, job: Job) -> Result<(), BridgeError> {
        self.jobs
            .send(job)
            .map_err(|_| BridgeError::Failed(PlayerError::RuntimeUnavailable))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{
            controller::EnqueueOutcome, session::PlaybackStatus, track::Track,
            transport::testing::FakeTransport,
        },
        error::InvalidTransition,
        runtime::PlayerRuntime,
    };
    use pretty_assertions::assert_eq;
    use serenity::model::id::{ChannelId, GuildId};
    use std::{
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
        thread,
        time::Instant,
    };
    use tokio_util::sync::CancellationToken;

    /// Runs a player runtime on its own thread, like `main` does on the main one.
    struct RuntimeThread {
        bridge: CommandBridge,
        transport: FakeTransport,
        shutdown: CancellationToken,
        thread: Option<thread::JoinHandle<()>>,
    }

    impl RuntimeThread {
        fn start() -> Self {
            let transport = FakeTransport::new();
            let shutdown = CancellationToken::new();
            let (runtime, bridge) =
                PlayerRuntime::new(Arc::new(transport.clone()), 1000, shutdown.clone());

            let thread = thread::spawn(move || {
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .unwrap()
                    .block_on(runtime.run());
            });

            Self {
                bridge,
                transport,
                shutdown,
                thread: Some(thread),
            }
        }
    }

    impl Drop for RuntimeThread {
        fn drop(&mut self) {
            self.shutdown.cancel();
            if let Some(thread) = self.thread.take() {
                let _ = thread.join();
            }
        }
    }

    fn guild() -> GuildId {
        GuildId::new(10)
    }

    #[test]
    fn test_submit_returns_value_within_timeout() {
        let rt = RuntimeThread::start();

        let status = rt
            .bridge
            .submit(|c| Box::pin(async move { Ok(c.status(guild())) }), Duration::from_secs(2))
            .unwrap();

        assert_eq!(status, PlaybackStatus::Stopped);
    }

    #[test]
    fn test_submit_times_out_but_operation_completes() {
        let rt = RuntimeThread::start();
        let finished = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = std::sync::mpsc::channel();

        let flag = finished.clone();
        let started = Instant::now();
        let result = rt.bridge.submit(
            move |_| {
                Box::pin(async move {
                    tokio::time::sleep(Duration::from_millis(300)).await;
                    flag.store(true, Ordering::SeqCst);
                    let _ = done_tx.send(());
                    Ok(())
                })
            },
            Duration::from_millis(50),
        );

        assert_eq!(result, Err(BridgeError::Timeout(Duration::from_millis(50))));
        assert!(started.elapsed() < Duration::from_millis(300));

        done_rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert!(finished.load(Ordering::SeqCst));
    }

    #[test]
    fn test_submit_reports_failure_cause() {
        let rt = RuntimeThread::start();

        let result = rt
            .bridge
            .submit(|c| Box::pin(async move { c.pause(guild()) }), Duration::from_secs(2));

        assert_eq!(
            result,
            Err(BridgeError::Failed(PlayerError::Transition(InvalidTransition::NotPlaying)))
        );
    }

    #[test]
    fn test_concurrent_enqueues_connect_once() {
        const N: usize = 8;
        let rt = RuntimeThread::start();

        let handles: Vec<_> = (0..N)
            .map(|i| {
                let bridge = rt.bridge.clone();
                thread::spawn(move || {
                    let track = Track::new(format!("q{i}"), format!("https://x/{i}"), format!("t{i}"));
                    bridge.submit(
                        move |c| {
                            Box::pin(async move {
                                c.enqueue(guild(), Some(ChannelId::new(20)), track)
                            })
                        },
                        Duration::from_secs(2),
                    )
                })
            })
            .collect();

        let outcomes: Vec<EnqueueOutcome> = handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect();

        let connecting = outcomes
            .iter()
            .filter(|o| matches!(o, EnqueueOutcome::Connecting(_)))
            .count();
        assert_eq!(connecting, 1);
        let mut positions: Vec<usize> = outcomes
            .iter()
            .filter_map(|o| match o {
                EnqueueOutcome::Queued { position, .. } => Some(*position),
                _ => None,
            })
            .collect();
        positions.sort_unstable();
        assert_eq!(positions, (1..N).collect::<Vec<_>>());

        let deadline = Instant::now() + Duration::from_secs(2);
        while rt
            .bridge
            .submit(|c| Box::pin(async move { Ok(c.status(guild())) }), Duration::from_secs(2))
            .unwrap()
            != PlaybackStatus::Playing
        {
            assert!(Instant::now() < deadline, "the connect never landed");
            thread::sleep(Duration::from_millis(10));
        }

        let queue = rt
            .bridge
            .submit(|c| Box::pin(async move { Ok(c.list_queue(guild())) }), Duration::from_secs(2))
            .unwrap();
        assert_eq!(queue.len(), N - 1);
        assert_eq!(rt.transport.log().connects.len(), 1);
    }

    #[test]
    fn test_submit_after_runtime_gone() {
        let shutdown = CancellationToken::new();
        let (runtime, bridge) = PlayerRuntime::new(Arc::new(FakeTransport::new()), 10, shutdown);
        drop(runtime);

        let result = bridge.submit(|c| Box::pin(async move { Ok(c.status(guild())) }), Duration::from_secs(1));

        assert_eq!(result, Err(BridgeError::Failed(PlayerError::RuntimeUnavailable)));
    }
}
