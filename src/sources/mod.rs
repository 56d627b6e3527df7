//! Track resolution: turning a user query into a playable [`Track`].
//!
//! Lookups never run on the runtime thread. [`ResolverPool`] spawns them on a
//! dedicated worker runtime, bounded by a semaphore and a per-lookup timeout;
//! only the finished `Track` (or error) comes back.

pub mod youtube;

use async_trait::async_trait;
use std::{future::Future, sync::Arc, time::Duration};
use tokio::{runtime::Handle, sync::Semaphore};
use tracing::{debug, warn};

use crate::{audio::track::Track, error::ResolutionError};

pub use youtube::YtDlpResolver;

/// Looks a query up and returns the first playable result.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TrackResolver: Send + Sync {
    async fn resolve(&self, query: &str) -> Result<Track, ResolutionError>;
}

/// Bounded pool running [`TrackResolver`] lookups off the runtime thread.
#[derive(Clone)]
pub struct ResolverPool {
    resolver: Arc<dyn TrackResolver>,
    workers: Handle,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl ResolverPool {
    pub fn new(
        resolver: Arc<dyn TrackResolver>,
        workers: Handle,
        max_concurrent: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            workers,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            timeout,
        }
    }

    /// Resolves `query` on the worker runtime. Waiting for a free slot counts
    /// against the timeout.
    pub async fn resolve(&self, query: &str) -> Result<Track, ResolutionError> {
        let resolver = self.resolver.clone();
        let permits = self.permits.clone();
        let timeout = self.timeout;
        let query = query.to_string();

        let lookup = self.workers.spawn(async move {
            let work = async {
                let _permit = permits
                    .acquire()
                    .await
                    .map_err(|_| ResolutionError::Failed {
                        reason: "el pool de búsqueda está cerrado".to_string(),
                    })?;
                debug!("🔍 Resolviendo: {}", query);
                resolver.resolve(&query).await
            };

            match tokio::time::timeout(timeout, work).await {
                Ok(result) => result,
                Err(_) => {
                    warn!("⏱️ Búsqueda de '{}' excedió {:?}", query, timeout);
                    Err(ResolutionError::TimedOut(timeout))
                }
            }
        });

        match lookup.await {
            Ok(result) => result,
            Err(e) => Err(ResolutionError::Failed {
                reason: e.to_string(),
            }),
        }
    }

    /// Drives `work` to completion on the worker runtime from a plain thread.
    ///
    /// Must not be called from inside an async context.
    pub fn block_on<F: Future>(&self, work: F) -> F::Output {
        self.workers.block_on(work)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    struct StalledResolver;

    #[async_trait]
    impl TrackResolver for StalledResolver {
        async fn resolve(&self, _query: &str) -> Result<Track, ResolutionError> {
            futures::future::pending().await
        }
    }

    fn found(query: &str) -> Track {
        Track::new(query, format!("https://www.youtube.com/watch?v={query}"), query)
    }

    #[tokio::test]
    async fn test_resolve_returns_first_result() {
        let mut mock = MockTrackResolver::new();
        mock.expect_resolve()
            .times(1)
            .returning(|query| Ok(found(query)));

        let pool = ResolverPool::new(Arc::new(mock), Handle::current(), 2, Duration::from_secs(5));
        let track = pool.resolve("lofi").await.unwrap();

        assert_eq!(track, found("lofi"));
    }

    #[tokio::test]
    async fn test_resolution_errors_pass_through() {
        let mut mock = MockTrackResolver::new();
        mock.expect_resolve().returning(|_| {
            Err(ResolutionError::Restricted {
                reason: "DRM".to_string(),
            })
        });

        let pool = ResolverPool::new(Arc::new(mock), Handle::current(), 1, Duration::from_secs(5));

        assert_eq!(
            pool.resolve("x").await,
            Err(ResolutionError::Restricted {
                reason: "DRM".to_string()
            })
        );
    }

    #[tokio::test]
    async fn test_slow_lookup_times_out() {
        let timeout = Duration::from_millis(50);
        let pool = ResolverPool::new(Arc::new(StalledResolver), Handle::current(), 1, timeout);

        assert_eq!(pool.resolve("x").await, Err(ResolutionError::TimedOut(timeout)));
    }

    #[test]
    fn test_block_on_resolves_from_plain_thread() {
        let workers = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        let mut mock = MockTrackResolver::new();
        mock.expect_resolve().returning(|query| Ok(found(query)));
        let pool = ResolverPool::new(Arc::new(mock), workers.handle().clone(), 1, Duration::from_secs(5));

        let track = std::thread::spawn(move || pool.block_on(pool.resolve("desde consola")))
            .join()
            .unwrap()
            .unwrap();

        assert_eq!(track.title(), "desde consola");
    }
}
