use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::runtime::{Builder, Handle, RuntimeFlavor};
use tokio::task::JoinHandle;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

type Thunk<T> = Arc<dyn Fn() -> BoxFuture<'static, Result<T, Error>> + Send + Sync>;

/// Deferred unit of work yielding a typed result.
///
/// Contract:
/// - `run`/`run_sync` re-execute the computation on every call; nothing is
///   memoized.
/// - `has_run` flips the instant execution begins, before any network I/O;
///   `has_completed` flips only when a run returns without error.
/// - `run_async`/`run_after` must be called within a tokio runtime.
pub struct Action<T> {
    thunk: Thunk<T>,
    has_run: Arc<AtomicBool>,
    has_completed: Arc<AtomicBool>,
}

impl<T> Clone for Action<T> {
    fn clone(&self) -> Self {
        Self {
            thunk: self.thunk.clone(),
            has_run: self.has_run.clone(),
            has_completed: self.has_completed.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Action<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Action")
            .field("has_run", &self.has_run.load(Ordering::SeqCst))
            .field("has_completed", &self.has_completed.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl<T: Send + 'static> Action<T> {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<T, Error>> + Send + 'static,
    {
        Self {
            thunk: Arc::new(move || Box::pin(f()) as BoxFuture<'static, Result<T, Error>>),
            has_run: Arc::new(AtomicBool::new(false)),
            has_completed: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn has_run(&self) -> bool {
        self.has_run.load(Ordering::SeqCst)
    }

    #[inline]
    pub fn has_completed(&self) -> bool {
        self.has_completed.load(Ordering::SeqCst)
    }

    /// The single async primitive the other run modes are built on.
    pub async fn run(&self) -> Result<T, Error> {
        self.has_run.store(true, Ordering::SeqCst);
        let out = (self.thunk)().await;
        if out.is_ok() {
            self.has_completed.store(true, Ordering::SeqCst);
        }
        out
    }

    /// Executes on the calling context, blocking until done.
    ///
    /// Inside a multi-thread runtime this parks the worker via
    /// `block_in_place`; outside any runtime a throwaway current-thread
    /// runtime drives the call. Calling it from within a current-thread
    /// runtime is an error rather than a deadlock.
    pub fn run_sync(&self) -> Result<T, Error> {
        match Handle::try_current() {
            Ok(handle) => match handle.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(Error::Scheduler(
                    "run_sync would deadlock a current-thread runtime; use run().await".into(),
                )),
                _ => tokio::task::block_in_place(|| handle.block_on(self.run())),
            },
            Err(_) => {
                let rt = Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .map_err(|e| Error::Scheduler(format!("runtime build failed: {e}").into()))?;
                rt.block_on(self.run())
            }
        }
    }

    /// Schedules execution and returns immediately; exactly one of the
    /// callbacks is invoked, exactly once, unless the handle is cancelled.
    pub fn run_async(
        &self,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(Error) + Send + 'static,
    ) -> ActionHandle {
        self.schedule(None, on_success, on_failure)
    }

    /// Like `run_async`, after `delay` measured from this call, not from
    /// the end of any prior work.
    pub fn run_after(
        &self,
        delay: Duration,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(Error) + Send + 'static,
    ) -> ActionHandle {
        self.schedule(Some(delay), on_success, on_failure)
    }

    /// Derived action applying `f` to the result. The new action has its
    /// own run/completion flags.
    pub fn map<U, F>(self, f: F) -> Action<U>
    where
        U: Send + 'static,
        F: Fn(T) -> U + Send + Sync + 'static,
    {
        let thunk = self.thunk;
        let f = Arc::new(f);
        Action::new(move || {
            let fut = thunk();
            let f = f.clone();
            async move { fut.await.map(|t| f(t)) }
        })
    }

    fn schedule(
        &self,
        delay: Option<Duration>,
        on_success: impl FnOnce(T) + Send + 'static,
        on_failure: impl FnOnce(Error) + Send + 'static,
    ) -> ActionHandle {
        let thunk = self.thunk.clone();
        let has_run = self.has_run.clone();
        let has_completed = self.has_completed.clone();
        let cancelled = Arc::new(AtomicBool::new(false));
        let flag = cancelled.clone();
        let join = tokio::spawn(async move {
            if let Some(d) = delay {
                tokio::time::sleep(d).await;
            }
            if flag.load(Ordering::SeqCst) {
                return;
            }
            has_run.store(true, Ordering::SeqCst);
            let out = (thunk)().await;
            if out.is_ok() {
                has_completed.store(true, Ordering::SeqCst);
            }
            // Cancellation during execution suppresses delivery entirely.
            if flag.load(Ordering::SeqCst) {
                return;
            }
            match out {
                Ok(v) => on_success(v),
                Err(e) => on_failure(e),
            }
        });
        ActionHandle { cancelled, join }
    }
}

/// Handle to a scheduled (`run_async`/`run_after`) execution.
pub struct ActionHandle {
    cancelled: Arc<AtomicBool>,
    join: JoinHandle<()>,
}

impl ActionHandle {
    /// Cancels before or during execution; neither callback will fire.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.join.abort();
    }

    #[inline]
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Awaits task teardown (including after cancellation).
    pub async fn wait(self) {
        let _ = self.join.await;
    }
}
