use super::session::{Classification, PollSession, ResourceKey};
use crate::error::CheckError;
use async_trait::async_trait;
use std::future::Future;

/// The remote status lookup a session polls.
///
/// Implementations own transport, authentication and wire format; the poller
/// only sees the payload or the error.
#[async_trait]
pub trait StatusCheck<R>: Send + Sync {
    async fn check(&self, key: &ResourceKey) -> Result<R, CheckError>;
}

pub type StatusCheckBox<R> = Box<dyn StatusCheck<R>>;

/// Maps a raw payload onto pending / succeeded / failed.
pub type Classifier<R> = Box<dyn Fn(&R) -> Classification + Send + Sync>;

/// Called after every published state change of a session.
pub type TransitionObserver<R> = Box<dyn Fn(&PollSession<R>) + Send + Sync>;

/// Adapts an async closure into a [`StatusCheck`].
pub struct FnCheck<F> {
    f: F,
}

pub fn check_fn<R, F, Fut>(f: F) -> FnCheck<F>
where
    F: Fn(ResourceKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, CheckError>> + Send,
{
    FnCheck { f }
}

#[async_trait]
impl<R, F, Fut> StatusCheck<R> for FnCheck<F>
where
    R: Send + 'static,
    F: Fn(ResourceKey) -> Fut + Send + Sync,
    Fut: Future<Output = Result<R, CheckError>> + Send,
{
    async fn check(&self, key: &ResourceKey) -> Result<R, CheckError> {
        (self.f)(key.clone()).await
    }
}
