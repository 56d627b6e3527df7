//! Bounded graceful stop.
//!
//! 1. close the network connections (gateway shards, and with them voice)
//! 2. wait the grace period so in-flight callbacks can land
//! 3. await every registered background task until a shared deadline,
//!    logging each failure on its own and aborting whatever is left
//!
//! The sequence itself never stops early. Failures are collected in the
//! [`ShutdownReport`], which the caller turns into the process exit status
//! before force-stopping the tokio runtime.

use async_trait::async_trait;
use futures::future::join_all;
use parking_lot::Mutex;
use serenity::gateway::ShardManager;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, error, info, warn};

type TaskHandle = JoinHandle<anyhow::Result<()>>;

/// Handles of long-lived tasks the shutdown sequence has to wait for.
#[derive(Clone, Default)]
pub struct BackgroundTasks {
    handles: Arc<Mutex<Vec<(&'static str, TaskHandle)>>>,
}

impl BackgroundTasks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spawn<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.spawn_fallible(name, async move {
            future.await;
            Ok(())
        });
    }

    /// Like [`spawn`](Self::spawn), for tasks whose error should fail the
    /// whole process once shutdown is over.
    pub fn spawn_fallible<F>(&self, name: &'static str, future: F)
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        debug!("Tarea en segundo plano iniciada: {}", name);
        let handle = tokio::spawn(future);
        self.handles.lock().push((name, handle));
    }

    fn drain(&self) -> Vec<(&'static str, TaskHandle)> {
        std::mem::take(&mut *self.handles.lock())
    }
}

/// Closes whatever network connections the process holds.
#[async_trait]
pub trait NetworkShutdown: Send + Sync {
    async fn close(&self) -> anyhow::Result<()>;
}

/// Shuts every gateway shard down.
pub struct GatewayShutdown(pub Arc<ShardManager>);

#[async_trait]
impl NetworkShutdown for GatewayShutdown {
    async fn close(&self) -> anyhow::Result<()> {
        self.0.shutdown_all().await;
        Ok(())
    }
}

/// How the background tasks ended.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShutdownReport {
    pub completed: usize,
    pub failed: usize,
    pub aborted: usize,
    /// `"<task>: <error>"` for every task that failed.
    pub errors: Vec<String>,
}

impl ShutdownReport {
    /// `Err` if any task failed, so the process exits non-zero.
    pub fn into_result(self) -> anyhow::Result<()> {
        if self.errors.is_empty() {
            return Ok(());
        }
        anyhow::bail!("{} tarea(s) fallaron: {}", self.errors.len(), self.errors.join("; "))
    }
}

pub struct ShutdownCoordinator {
    grace: Duration,
    task_timeout: Duration,
    tasks: BackgroundTasks,
}

impl ShutdownCoordinator {
    pub fn new(grace: Duration, task_timeout: Duration, tasks: BackgroundTasks) -> Self {
        Self {
            grace,
            task_timeout,
            tasks,
        }
    }

    pub async fn run(&self, network: &dyn NetworkShutdown) -> ShutdownReport {
        info!("🛑 Deteniendo el bot...");

        match tokio::time::timeout(self.task_timeout, network.close()).await {
            Ok(Ok(())) => info!("🔌 Conexiones de red cerradas"),
            Ok(Err(e)) => error!("❌ Error cerrando conexiones de red: {:#}", e),
            Err(_) => warn!("⏱️ El cierre de conexiones excedió {:?}", self.task_timeout),
        }

        tokio::time::sleep(self.grace).await;

        let pending = self.tasks.drain();
        debug!("Esperando {} tareas pendientes", pending.len());
        let deadline = Instant::now() + self.task_timeout;

        let outcomes = join_all(pending.into_iter().map(|(name, mut handle)| async move {
            match tokio::time::timeout_at(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => {
                    debug!("✅ Tarea '{}' terminada", name);
                    TaskOutcome::Completed
                }
                Ok(Ok(Err(e))) => {
                    error!("❌ Tarea '{}' terminó con error: {:#}", name, e);
                    TaskOutcome::Failed(format!("{}: {:#}", name, e))
                }
                Ok(Err(e)) => {
                    error!("❌ Tarea '{}' falló: {}", name, e);
                    TaskOutcome::Failed(format!("{}: {}", name, e))
                }
                Err(_) => {
                    warn!("⏱️ Tarea '{}' no terminó a tiempo, abortando", name);
                    handle.abort();
                    TaskOutcome::Aborted
                }
            }
        }))
        .await;

        let report = outcomes.into_iter().fold(ShutdownReport::default(), |mut r, o| {
            match o {
                TaskOutcome::Completed => r.completed += 1,
                TaskOutcome::Failed(e) => {
                    r.failed += 1;
                    r.errors.push(e);
                }
                TaskOutcome::Aborted => r.aborted += 1,
            }
            r
        });

        info!(
            "👋 Apagado completo ({} terminadas, {} con error, {} abortadas)",
            report.completed, report.failed, report.aborted
        );
        report
    }
}

enum TaskOutcome {
    Completed,
    Failed(String),
    Aborted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio_util::sync::CancellationToken;

    #[derive(Default)]
    struct FakeNetwork {
        fail: bool,
        closed: AtomicBool,
    }

    #[async_trait]
    impl NetworkShutdown for FakeNetwork {
        async fn close(&self) -> anyhow::Result<()> {
            self.closed.store(true, Ordering::SeqCst);
            if self.fail {
                anyhow::bail!("gateway ya cerrado");
            }
            Ok(())
        }
    }

    /// Records when it was closed and releases whoever waits on `closed`.
    struct RecordingNetwork {
        steps: Arc<Mutex<Vec<&'static str>>>,
        closed: CancellationToken,
    }

    #[async_trait]
    impl NetworkShutdown for RecordingNetwork {
        async fn close(&self) -> anyhow::Result<()> {
            self.steps.lock().push("network");
            self.closed.cancel();
            Ok(())
        }
    }

    const GRACE: Duration = Duration::from_millis(20);

    fn coordinator(tasks: BackgroundTasks) -> ShutdownCoordinator {
        ShutdownCoordinator::new(GRACE, Duration::from_millis(200), tasks)
    }

    #[tokio::test]
    async fn test_clean_shutdown_awaits_tasks() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("rápida", async {
            tokio::time::sleep(Duration::from_millis(10)).await;
        });
        let network = FakeNetwork::default();

        let report = coordinator(tasks.clone()).run(&network).await;

        assert!(network.closed.load(Ordering::SeqCst));
        assert_eq!(
            report,
            ShutdownReport {
                completed: 1,
                ..Default::default()
            }
        );
        assert!(tasks.drain().is_empty());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_network_closes_before_grace_and_task_join() {
        let steps = Arc::new(Mutex::new(Vec::new()));
        let network = RecordingNetwork {
            steps: steps.clone(),
            closed: CancellationToken::new(),
        };
        let tasks = BackgroundTasks::new();
        let (task_steps, closed) = (steps.clone(), network.closed.clone());
        tasks.spawn("gateway", async move {
            closed.cancelled().await;
            task_steps.lock().push("task");
        });

        let started = Instant::now();
        let report = coordinator(tasks).run(&network).await;

        assert_eq!(*steps.lock(), vec!["network", "task"]);
        assert_eq!(report.completed, 1);
        assert!(started.elapsed() >= GRACE);
    }

    #[tokio::test]
    async fn test_failures_are_isolated_and_bounded() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("ok", async {});
        tasks.spawn("pánico", async {
            panic!("fallo en tarea");
        });
        tasks.spawn("colgada", futures::future::pending());
        let network = FakeNetwork {
            fail: true,
            ..Default::default()
        };

        let started = Instant::now();
        let report = coordinator(tasks).run(&network).await;

        assert_eq!((report.completed, report.failed, report.aborted), (1, 1, 1));
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("pánico: "));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_task_error_fails_the_report() {
        let tasks = BackgroundTasks::new();
        tasks.spawn("player", async {});
        tasks.spawn_fallible("gateway", async { Err::<(), _>(anyhow::anyhow!("token inválido")) });

        let report = coordinator(tasks).run(&FakeNetwork::default()).await;

        assert_eq!(
            report,
            ShutdownReport {
                completed: 1,
                failed: 1,
                aborted: 0,
                errors: vec!["gateway: token inválido".to_string()],
            }
        );
        let err = report.into_result().unwrap_err();
        assert!(err.to_string().contains("gateway: token inválido"));
    }
}
