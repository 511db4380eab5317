use crate::auth::{AuthRuntime, TokenState};
use crate::cache::ResponseCache;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Which background tasks a client runs, and how often.
#[derive(Copy, Clone, Debug, Default)]
pub struct MaintenanceConfig {
    /// Clears the whole response cache every interval.
    pub cache_sweep: Option<Duration>,
    /// Checks the credential every interval and refreshes it proactively
    /// once it enters the expiry margin.
    pub token_refresh_check: Option<Duration>,
}

impl MaintenanceConfig {
    #[inline]
    pub fn cache_sweep(mut self, every: Duration) -> Self {
        self.cache_sweep = Some(every);
        self
    }

    #[inline]
    pub fn token_refresh_check(mut self, every: Duration) -> Self {
        self.token_refresh_check = Some(every);
        self
    }
}

/// Lifecycle handle for a client's ambient scheduled tasks. Owned by the
/// caller; `stop()` or drop aborts every task, so nothing outlives the
/// handle or leaks into a module-level scheduler.
pub struct Maintenance {
    tasks: Vec<JoinHandle<()>>,
}

impl Maintenance {
    pub(crate) fn start(
        cache: Arc<ResponseCache>,
        auth: Option<Arc<AuthRuntime>>,
        config: MaintenanceConfig,
    ) -> Self {
        let mut tasks = Vec::new();

        if let Some(every) = config.cache_sweep {
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(every);
                // The first interval tick completes immediately; skip it so
                // sweeps happen one full interval apart.
                tick.tick().await;
                loop {
                    tick.tick().await;
                    cache.clear();
                }
            }));
        }

        if let Some(every) = config.token_refresh_check
            && let Some(auth) = auth
        {
            tasks.push(tokio::spawn(async move {
                let mut tick = tokio::time::interval(every);
                tick.tick().await;
                loop {
                    tick.tick().await;
                    if auth.state() == TokenState::Expiring {
                        // A failed proactive refresh is not fatal here; the
                        // next request surfaces it.
                        let _ = auth.ensure_fresh().await;
                    }
                }
            }));
        }

        Self { tasks }
    }

    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        !self.tasks.is_empty()
    }
}

impl Drop for Maintenance {
    fn drop(&mut self) {
        self.stop();
    }
}
