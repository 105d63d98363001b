use crate::domain::ports::StatusCheck;
use crate::domain::session::ResourceKey;
use crate::error::CheckError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

struct Script<R> {
    responses: VecDeque<Result<R, CheckError>>,
    calls: u32,
}

/// A status source that replays scripted responses per resource key.
///
/// Once a key's script runs dry the fallback response is returned, if any;
/// otherwise checks report `NotFound`. Handy for tests and demos
/// where the remote backend is not available.
#[derive(Clone)]
pub struct ScriptedStatusSource<R> {
    scripts: Arc<RwLock<HashMap<ResourceKey, Script<R>>>>,
    fallback: Option<Result<R, CheckError>>,
}

impl<R: Clone + Send + Sync> Default for ScriptedStatusSource<R> {
    fn default() -> Self {
        Self {
            scripts: Arc::default(),
            fallback: None,
        }
    }
}

impl<R: Clone + Send + Sync> ScriptedStatusSource<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response returned for any key whose script is exhausted.
    pub fn with_fallback(mut self, fallback: Result<R, CheckError>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    /// Appends `responses` to the script of `key`.
    pub async fn script<I>(&self, key: &ResourceKey, responses: I)
    where
        I: IntoIterator<Item = Result<R, CheckError>>,
    {
        let mut scripts = self.scripts.write().await;
        scripts
            .entry(key.clone())
            .or_insert_with(|| Script {
                responses: VecDeque::new(),
                calls: 0,
            })
            .responses
            .extend(responses);
    }

    /// Number of checks issued for `key` so far.
    pub async fn calls(&self, key: &ResourceKey) -> u32 {
        let scripts = self.scripts.read().await;
        scripts.get(key).map_or(0, |script| script.calls)
    }
}

#[async_trait]
impl<R: Clone + Send + Sync> StatusCheck<R> for ScriptedStatusSource<R> {
    async fn check(&self, key: &ResourceKey) -> Result<R, CheckError> {
        let mut scripts = self.scripts.write().await;
        let script = scripts.entry(key.clone()).or_insert_with(|| Script {
            responses: VecDeque::new(),
            calls: 0,
        });
        script.calls += 1;

        if let Some(response) = script.responses.pop_front() {
            return response;
        }
        match &self.fallback {
            Some(response) => response.clone(),
            None => Err(CheckError::NotFound(key.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(k: &str) -> ResourceKey {
        ResourceKey::new(k).unwrap()
    }

    #[tokio::test]
    async fn test_replays_script_in_order() {
        let source = ScriptedStatusSource::new();
        let order = key("order-1");
        source
            .script(&order, [Ok("PENDING"), Ok("PAID")])
            .await;

        assert_eq!(source.check(&order).await, Ok("PENDING"));
        assert_eq!(source.check(&order).await, Ok("PAID"));
        assert_eq!(
            source.check(&order).await,
            Err(CheckError::NotFound("order-1".to_string()))
        );
        assert_eq!(source.calls(&order).await, 3);
    }

    #[tokio::test]
    async fn test_fallback_after_script() {
        let source = ScriptedStatusSource::new().with_fallback(Ok("PENDING"));
        let order = key("order-2");
        source
            .script(&order, [Err(CheckError::Transport("503".into()))])
            .await;

        assert!(source.check(&order).await.is_err());
        assert_eq!(source.check(&order).await, Ok("PENDING"));
        assert_eq!(source.check(&key("unknown")).await, Ok("PENDING"));
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let source: ScriptedStatusSource<u8> = ScriptedStatusSource::new();
        let a = key("a");
        let b = key("b");
        source.script(&a, [Ok(1)]).await;
        source.script(&b, [Ok(2)]).await;

        assert_eq!(source.check(&b).await, Ok(2));
        assert_eq!(source.calls(&a).await, 0);
        assert_eq!(source.calls(&b).await, 1);
    }
}
