use crate::domain::config::{ErrorPolicy, PollConfig};
use crate::domain::ports::{Classifier, StatusCheck, StatusCheckBox, TransitionObserver};
use crate::domain::session::{
    Applied, Classification, PollSession, PollState, ResourceKey, SessionId,
};
use crate::error::{PollError, Result};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::{Notify, watch};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

/// Everything a session needs besides its resource key.
pub struct PollOptions<R> {
    check: StatusCheckBox<R>,
    classifier: Classifier<R>,
    config: PollConfig,
    observer: Option<TransitionObserver<R>>,
}

impl<R> PollOptions<R> {
    /// Validates `config` and bundles it with the check and the classifier.
    pub fn new<C, F>(check: C, classifier: F, config: PollConfig) -> Result<Self>
    where
        C: StatusCheck<R> + 'static,
        F: Fn(&R) -> Classification + Send + Sync + 'static,
    {
        config.validate()?;
        Ok(Self {
            check: Box::new(check),
            classifier: Box::new(classifier),
            config,
            observer: None,
        })
    }

    /// Installs an observer called synchronously after every published
    /// transition, in order.
    pub fn on_transition<F>(mut self, observer: F) -> Self
    where
        F: Fn(&PollSession<R>) + Send + Sync + 'static,
    {
        self.observer = Some(Box::new(observer));
        self
    }
}

/// Live state of one session, shared by its handle and its driver task.
struct SessionShared<R> {
    state: watch::Sender<PollSession<R>>,
    observer: Option<TransitionObserver<R>>,
    // Serializes apply + observer call so observers never see transitions out
    // of order. Reentrant so an observer may cancel its own session.
    dispatch: ReentrantMutex<()>,
    wakeup: Notify,
}

impl<R: Clone> SessionShared<R> {
    fn apply<F>(&self, event: F) -> Applied
    where
        F: FnOnce(&mut PollSession<R>) -> Applied,
    {
        let _dispatch = self.dispatch.lock();
        let mut applied = Applied::Discarded;
        let mut published = None;
        self.state.send_if_modified(|session| {
            applied = event(session);
            if applied == Applied::Published {
                published = Some(session.clone());
                true
            } else {
                false
            }
        });
        if let (Some(session), Some(observer)) = (published.as_ref(), self.observer.as_ref())
            && catch_unwind(AssertUnwindSafe(|| observer(session))).is_err()
        {
            error!(
                state = %session.state,
                attempt = session.attempt,
                "transition observer panicked"
            );
        }
        applied
    }

    fn snapshot(&self) -> PollSession<R> {
        self.state.borrow().clone()
    }

    fn is_terminal(&self) -> bool {
        self.state.borrow().is_terminal()
    }
}

/// Type-erased cancellation so the poller can track sessions of any payload.
trait Cancellable: Send + Sync {
    fn cancel(&self);
}

impl<R: Clone + Send + Sync> Cancellable for SessionShared<R> {
    fn cancel(&self) {
        if self.apply(PollSession::cancel) == Applied::Published {
            self.wakeup.notify_one();
        }
    }
}

struct SessionEntry {
    session: Arc<dyn Cancellable>,
    task: JoinHandle<()>,
}

type Registry = Arc<Mutex<HashMap<SessionId, SessionEntry>>>;

/// Owned by a driver task. Dropping it, whether the task returned, panicked
/// or was aborted, ends the session and removes it from the registry.
struct TaskGuard {
    id: SessionId,
    session: Arc<dyn Cancellable>,
    sessions: Registry,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            error!(session = %self.id, "poll session driver panicked");
        }
        self.session.cancel();
        self.sessions.lock().remove(&self.id);
    }
}

/// Drives status checks for any number of independent sessions.
///
/// Each session gets its own task: check, classify, then sleep `interval`
/// after the check settled, until a terminal state. Dropping the poller
/// cancels every session it still tracks.
pub struct AsyncStatusPoller {
    runtime: Handle,
    sessions: Registry,
    next_id: AtomicU64,
}

impl AsyncStatusPoller {
    /// Creates a poller bound to the tokio runtime of the calling context.
    pub fn new() -> Result<Self> {
        let runtime = Handle::try_current().map_err(|_| PollError::NoRuntime)?;
        Ok(Self::with_runtime(runtime))
    }

    pub fn with_runtime(runtime: Handle) -> Self {
        Self {
            runtime,
            sessions: Arc::default(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Starts polling `resource_key`.
    ///
    /// The session is `Running` by the time this returns and the first check
    /// is issued right away, without waiting an interval.
    #[must_use = "dropping the handle cancels the session"]
    pub fn start<R>(&self, resource_key: ResourceKey, options: PollOptions<R>) -> PollHandle<R>
    where
        R: Clone + Send + Sync + 'static,
    {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let PollOptions {
            check,
            classifier,
            config,
            observer,
        } = options;

        let (state, _) = watch::channel(PollSession::new(id, resource_key.clone(), &config));
        let shared = Arc::new(SessionShared {
            state,
            observer,
            dispatch: ReentrantMutex::new(()),
            wakeup: Notify::new(),
        });
        shared.apply(PollSession::begin);

        let driver = Driver {
            shared: Arc::clone(&shared),
            check,
            classifier,
            policy: config.error_policy,
            interval: config.interval(),
        };
        let span = info_span!("poll_session", session = %id, resource = %resource_key);
        let guard = TaskGuard {
            id,
            session: shared.clone(),
            sessions: Arc::clone(&self.sessions),
        };

        // Held across spawn so the task cannot deregister before it is registered.
        let mut registry = self.sessions.lock();
        let task = self.runtime.spawn(
            async move {
                let _guard = guard;
                driver.run().await;
            }
            .instrument(span),
        );
        registry.insert(
            id,
            SessionEntry {
                session: shared.clone(),
                task,
            },
        );
        drop(registry);

        PollHandle { shared }
    }

    /// Cancels the session behind `handle`. No-op if it already ended.
    pub fn cancel<R>(&self, handle: &PollHandle<R>)
    where
        R: Clone + Send + Sync + 'static,
    {
        handle.cancel();
    }

    pub fn is_terminal<R>(session: &PollSession<R>) -> bool {
        session.is_terminal()
    }

    /// Number of sessions whose driver task has not finished yet.
    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Cancels every tracked session, drops in-flight checks and waits for
    /// all driver tasks to end.
    pub async fn shutdown(&self) {
        let entries: Vec<SessionEntry> = self.sessions.lock().drain().map(|(_, e)| e).collect();
        if !entries.is_empty() {
            info!(sessions = entries.len(), "shutting down poll sessions");
        }
        for entry in &entries {
            entry.session.cancel();
            entry.task.abort();
        }
        for entry in entries {
            let _ = entry.task.await;
        }
    }
}

impl Drop for AsyncStatusPoller {
    fn drop(&mut self) {
        // Observers run on cancel and must not see the registry locked.
        let entries: Vec<SessionEntry> = self.sessions.lock().drain().map(|(_, e)| e).collect();
        for entry in entries {
            entry.session.cancel();
            entry.task.abort();
        }
    }
}

/// Caller-side view of one session.
///
/// Reads are synchronous; `subscribe` and `finished` follow transitions.
/// Dropping the handle cancels the session if it is still running.
pub struct PollHandle<R: Clone + Send + Sync + 'static> {
    shared: Arc<SessionShared<R>>,
}

impl<R: Clone + Send + Sync + 'static> PollHandle<R> {
    pub fn id(&self) -> SessionId {
        self.shared.state.borrow().id
    }

    pub fn snapshot(&self) -> PollSession<R> {
        self.shared.snapshot()
    }

    pub fn state(&self) -> PollState {
        self.shared.state.borrow().state
    }

    pub fn is_terminal(&self) -> bool {
        self.shared.is_terminal()
    }

    /// A receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PollSession<R>> {
        self.shared.state.subscribe()
    }

    pub fn cancel(&self) {
        Cancellable::cancel(self.shared.as_ref());
    }

    /// Waits until the current snapshot satisfies `predicate`.
    ///
    /// Only published transitions wake the waiter, so predicates on fields
    /// changed silently (errors under `ErrorPolicy::Ignore`) resolve late.
    pub async fn wait_for<F>(&self, predicate: F) -> PollSession<R>
    where
        F: Fn(&PollSession<R>) -> bool,
    {
        let mut rx = self.subscribe();
        loop {
            {
                let session = rx.borrow_and_update();
                if predicate(&session) {
                    return session.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }

    /// Resolves with the terminal snapshot.
    pub async fn finished(&self) -> PollSession<R> {
        self.wait_for(PollSession::is_terminal).await
    }
}

impl<R: Clone + Send + Sync + 'static> Drop for PollHandle<R> {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct Driver<R> {
    shared: Arc<SessionShared<R>>,
    check: StatusCheckBox<R>,
    classifier: Classifier<R>,
    policy: ErrorPolicy,
    interval: Duration,
}

impl<R: Clone + Send + Sync + 'static> Driver<R> {
    async fn run(self) {
        let key = self.shared.state.borrow().resource_key.clone();

        // A handle dropped right after start cancels before the first check.
        while !self.shared.is_terminal() {
            let outcome = self.check.check(&key).await;
            let applied = match outcome {
                Ok(result) => {
                    let classification = (self.classifier)(&result);
                    debug!(?classification, "status check completed");
                    self.shared
                        .apply(|session| session.record_result(result, classification))
                }
                Err(error) => {
                    warn!(%error, policy = %self.policy, "status check failed");
                    self.shared
                        .apply(|session| session.record_error(error, self.policy))
                }
            };

            if applied == Applied::Discarded {
                debug!("session ended while a check was in flight; result discarded");
                break;
            }
            if self.shared.is_terminal() {
                break;
            }

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shared.wakeup.notified() => {}
            }
        }

        let session = self.shared.snapshot();
        info!(state = %session.state, attempt = session.attempt, "poll session finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ports::check_fn;
    use crate::error::CheckError;
    use std::sync::atomic::AtomicU32;

    fn key(k: &str) -> ResourceKey {
        ResourceKey::new(k).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_check_is_immediate() {
        let poller = AsyncStatusPoller::new().unwrap();
        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>("PAID") }),
            |status: &&str| {
                if *status == "PAID" {
                    Classification::Succeeded
                } else {
                    Classification::Pending
                }
            },
            PollConfig::new(60_000, 5),
        )
        .unwrap();

        let handle = poller.start(key("order-1"), options);
        assert_eq!(handle.state(), PollState::Running);

        let started = tokio::time::Instant::now();
        let session = handle.finished().await;
        assert_eq!(session.state, PollState::Succeeded);
        assert_eq!(session.attempt, 1);
        assert!(started.elapsed() < Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_transition_in_order() {
        let poller = AsyncStatusPoller::new().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_by_observer = Arc::clone(&seen);

        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| Classification::Pending,
            PollConfig::new(10, 3),
        )
        .unwrap()
        .on_transition(move |session| {
            seen_by_observer.lock().push((session.state, session.attempt));
        });

        let handle = poller.start(key("acc-9"), options);
        handle.finished().await;

        assert_eq!(
            *seen.lock(),
            vec![
                (PollState::Running, 0),
                (PollState::Running, 1),
                (PollState::Running, 2),
                (PollState::TimedOut, 3),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_may_cancel_its_own_session() {
        let poller = AsyncStatusPoller::new().unwrap();
        let calls = Arc::new(AtomicU32::new(0));
        let counted = Arc::clone(&calls);
        let handle_slot: Arc<Mutex<Option<Arc<SessionShared<()>>>>> = Arc::default();
        let slot = Arc::clone(&handle_slot);

        let options = PollOptions::new(
            check_fn(move |_key| {
                counted.fetch_add(1, Ordering::SeqCst);
                async { Ok::<_, CheckError>(()) }
            }),
            |_: &()| Classification::Pending,
            PollConfig::new(10, 10),
        )
        .unwrap()
        .on_transition(move |session| {
            if session.attempt != 2 {
                return;
            }
            let shared = slot.lock().clone();
            if let Some(shared) = shared {
                Cancellable::cancel(shared.as_ref());
            }
        });

        let handle = poller.start(key("booking-3"), options);
        *handle_slot.lock() = Some(Arc::clone(&handle.shared));

        let session = handle.finished().await;
        assert_eq!(session.state, PollState::Cancelled);
        assert_eq!(session.attempt, 2);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        // the observer holds the session it cancels
        handle_slot.lock().take();
    }

    #[tokio::test(start_paused = true)]
    async fn test_finished_tasks_are_deregistered() {
        let poller = AsyncStatusPoller::new().unwrap();
        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| Classification::Failed,
            PollConfig::new(10, 3),
        )
        .unwrap();

        let handle = poller.start(key("qr-1"), options);
        assert_eq!(handle.finished().await.state, PollState::Failed);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(poller.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_observer_does_not_stall_session() {
        let poller = AsyncStatusPoller::new().unwrap();
        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| Classification::Pending,
            PollConfig::new(10, 3),
        )
        .unwrap()
        .on_transition(|session| {
            if session.state == PollState::Running && session.attempt == 1 {
                panic!("observer bug");
            }
        });

        let handle = poller.start(key("order-77"), options);
        let session = tokio::time::timeout(Duration::from_secs(600), handle.finished())
            .await
            .unwrap();

        assert_eq!(session.state, PollState::TimedOut);
        assert_eq!(session.attempt, 3);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(poller.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_classifier_ends_session() {
        let poller = AsyncStatusPoller::new().unwrap();
        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| -> Classification { panic!("classifier bug") },
            PollConfig::new(10, 3),
        )
        .unwrap();

        let handle = poller.start(key("order-78"), options);
        let session = tokio::time::timeout(Duration::from_secs(600), handle.finished())
            .await
            .unwrap();

        assert_eq!(session.state, PollState::Cancelled);
        assert_eq!(session.attempt, 0);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(poller.active_sessions(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_poller_lets_observer_read_registry() {
        let poller = AsyncStatusPoller::new().unwrap();
        let registry = Arc::clone(&poller.sessions);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&seen);

        let options = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| Classification::Pending,
            PollConfig::new(1_000, 10),
        )
        .unwrap()
        .on_transition(move |session| {
            let tracked = registry.lock().len();
            recorded.lock().push((session.state, tracked));
        });

        let handle = poller.start(key("qr-2"), options);
        tokio::time::sleep(Duration::from_millis(10)).await;
        drop(poller);

        assert_eq!(handle.state(), PollState::Cancelled);
        assert_eq!(seen.lock().last(), Some(&(PollState::Cancelled, 0)));
    }

    #[test]
    fn test_new_outside_runtime_fails() {
        assert!(matches!(
            AsyncStatusPoller::new(),
            Err(PollError::NoRuntime)
        ));
    }

    #[test]
    fn test_invalid_options_rejected() {
        let result = PollOptions::new(
            check_fn(|_key| async { Ok::<_, CheckError>(()) }),
            |_: &()| Classification::Pending,
            PollConfig::new(10, 0),
        );
        assert!(matches!(result, Err(PollError::InvalidConfig(_))));
    }
}
