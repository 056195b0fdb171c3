//! A backend value kept in step with a dependency key.
//!
//! # Design
//! `DataAccessor` issues one remote call each time its dependency key
//! changes, provided every parameter is known. Calls are never cancelled.
//! Every key change starts a new generation. Each spawned call remembers the
//! key and generation it was issued for, and its result is applied only if
//! both are still current when the call resolves. A key that goes A, B, A
//! therefore ignores the first A's call.
//!
//! The latest value is published on a `tokio::sync::watch` channel so UI
//! glue can await changes; `None` means no value has been produced yet.
//! When both locks are needed the watch lock is taken before the slot mutex.
//! A borrow from `subscribe()` must not be held across `set` or `update`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::client::RemoteClient;
use crate::error::CallError;
use crate::param::PartialParams;
use crate::transport::Transport;

/// What happens to the current value when the key changes but some
/// parameter is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IncompletePolicy {
    /// Keep the last value.
    #[default]
    Retain,
    /// Reset to no value.
    Clear,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessorConfig {
    pub on_incomplete: IncompletePolicy,
}

type TransformFn<V> = dyn Fn(Value) -> Result<V, CallError> + Send + Sync;

struct Slot<K> {
    key: Option<K>,
    generation: u64,
    last_error: Option<Arc<CallError>>,
}

impl<K: PartialEq> Slot<K> {
    fn is_current(&self, key: &K, generation: u64) -> bool {
        self.generation == generation && self.key.as_ref() == Some(key)
    }
}

struct Shared<K, V> {
    slot: Mutex<Slot<K>>,
    value: watch::Sender<Option<V>>,
}

impl<K: PartialEq + fmt::Debug, V> Shared<K, V> {
    fn lock(&self) -> MutexGuard<'_, Slot<K>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolve(&self, key: &K, generation: u64, path: &str, result: Result<V, CallError>) {
        match result {
            Ok(value) => {
                let applied = self.value.send_if_modified(|current| {
                    let mut slot = self.lock();
                    if !slot.is_current(key, generation) {
                        return false;
                    }
                    slot.last_error = None;
                    *current = Some(value);
                    true
                });
                if !applied {
                    debug!(path, ?key, generation, "discarding stale resolution");
                }
            }
            Err(err) => {
                let mut slot = self.lock();
                if !slot.is_current(key, generation) {
                    debug!(path, ?key, generation, %err, "discarding stale failure");
                    return;
                }
                warn!(path, ?key, %err, "data accessor call failed");
                slot.last_error = Some(Arc::new(err));
            }
        }
    }

    /// Reset the value unless a newer key change has happened meanwhile.
    fn clear(&self, generation: u64) {
        self.value.send_if_modified(|current| {
            if self.lock().generation != generation {
                return false;
            }
            current.take().is_some()
        });
    }
}

/// Latest value of one endpoint, refetched whenever the dependency key
/// changes.
pub struct DataAccessor<K, V, T> {
    client: Arc<RemoteClient<T>>,
    path: String,
    transform: Arc<TransformFn<V>>,
    config: AccessorConfig,
    shared: Arc<Shared<K, V>>,
}

impl<K, V, T> DataAccessor<K, V, T>
where
    K: PartialEq + Clone + fmt::Debug + Send + 'static,
    V: Clone + Send + Sync + 'static,
    T: Transport,
{
    pub fn new<F>(client: Arc<RemoteClient<T>>, path: impl Into<String>, transform: F) -> Self
    where
        F: Fn(Value) -> Result<V, CallError> + Send + Sync + 'static,
    {
        let (value, _) = watch::channel(None);
        Self {
            client,
            path: path.into(),
            transform: Arc::new(transform),
            config: AccessorConfig::default(),
            shared: Arc::new(Shared {
                slot: Mutex::new(Slot {
                    key: None,
                    generation: 0,
                    last_error: None,
                }),
                value,
            }),
        }
    }

    pub fn with_config(mut self, config: AccessorConfig) -> Self {
        self.config = config;
        self
    }

    /// Latest value, or `None` before the first successful call.
    pub fn value(&self) -> Option<V> {
        self.shared.value.borrow().clone()
    }

    /// Receiver notified on every value change.
    pub fn subscribe(&self) -> watch::Receiver<Option<V>> {
        self.shared.value.subscribe()
    }

    /// Replace the value without calling the backend.
    pub fn set(&self, value: V) {
        self.shared.value.send_replace(Some(value));
    }

    /// Failure of the most recent call issued for the current key.
    pub fn last_error(&self) -> Option<Arc<CallError>> {
        self.shared.lock().last_error.clone()
    }

    pub fn current_key(&self) -> Option<K> {
        self.shared.lock().key.clone()
    }

    /// Record `key` as the current dependency key.
    ///
    /// When the key differs from the current one and every parameter is
    /// present, a call is spawned on the current Tokio runtime and its handle
    /// returned. An unchanged key, or an absent parameter, issues nothing.
    ///
    /// # Panics
    /// Panics when a call is spawned outside a Tokio runtime.
    pub fn update(&self, key: K, params: &PartialParams) -> Option<JoinHandle<()>> {
        let mut slot = self.shared.lock();
        if slot.key.as_ref() == Some(&key) {
            return None;
        }
        slot.key = Some(key.clone());
        slot.generation += 1;
        slot.last_error = None;
        let generation = slot.generation;
        drop(slot);

        let Some(params) = params.complete() else {
            debug!(
                path = %self.path,
                ?key,
                missing = params.first_missing(),
                "skipping call with absent parameter"
            );
            if self.config.on_incomplete == IncompletePolicy::Clear {
                self.shared.clear(generation);
            }
            return None;
        };

        let client = Arc::clone(&self.client);
        let shared = Arc::clone(&self.shared);
        let transform = Arc::clone(&self.transform);
        let path = self.path.clone();
        Some(tokio::spawn(async move {
            let result = client.call(&path, &params, |json| transform(json)).await;
            shared.resolve(&key, generation, &path, result);
        }))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use tokio::sync::{mpsc, oneshot};

    use super::*;
    use crate::client::decode_as;
    use crate::error::{RemoteError, TransportError};
    use crate::http::{HttpRequest, HttpResponse};

    type Reply = oneshot::Sender<Result<HttpResponse, TransportError>>;

    /// Transport handing each request to the test, which answers it whenever
    /// it chooses.
    struct Gated {
        requests: mpsc::UnboundedSender<(HttpRequest, Reply)>,
    }

    impl Transport for Gated {
        async fn execute(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            let (reply, response) = oneshot::channel();
            self.requests
                .send((request, reply))
                .map_err(|_| TransportError::Other("test closed".to_string()))?;
            response
                .await
                .map_err(|_| TransportError::Other("reply dropped".to_string()))?
        }
    }

    fn accessor() -> (
        DataAccessor<u32, String, Gated>,
        mpsc::UnboundedReceiver<(HttpRequest, Reply)>,
    ) {
        let (requests, rx) = mpsc::unbounded_channel();
        let client = RemoteClient::new("http://localhost:3000", Gated { requests }).unwrap();
        let accessor = DataAccessor::new(Arc::new(client), "competences", decode_as::<String>);
        (accessor, rx)
    }

    fn params(dataset: &str) -> PartialParams {
        PartialParams::new().with("dataset", dataset)
    }

    fn ok(body: &str) -> Result<HttpResponse, TransportError> {
        Ok(HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: body.to_string(),
        })
    }

    fn dataset_of(request: &HttpRequest) -> String {
        request
            .url
            .query_pairs()
            .find(|(k, _)| k == "dataset")
            .map(|(_, v)| v.into_owned())
            .unwrap()
    }

    async fn next_two(
        rx: &mut mpsc::UnboundedReceiver<(HttpRequest, Reply)>,
    ) -> ((HttpRequest, Reply), (HttpRequest, Reply)) {
        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        if dataset_of(&a.0) == "a" {
            (a, b)
        } else {
            (b, a)
        }
    }

    #[tokio::test]
    async fn starts_unset_and_takes_the_fetched_value() {
        let (accessor, mut rx) = accessor();
        assert_eq!(accessor.value(), None);

        let handle = accessor.update(1, &params("a")).unwrap();
        let (request, reply) = rx.recv().await.unwrap();
        assert_eq!(
            request.url.as_str(),
            "http://localhost:3000/api/competences?dataset=a"
        );
        reply.send(ok(r#""rust""#)).unwrap();
        handle.await.unwrap();

        assert_eq!(accessor.value(), Some("rust".to_string()));
        assert_eq!(accessor.current_key(), Some(1));
    }

    #[tokio::test]
    async fn unchanged_key_issues_no_call() {
        let (accessor, mut rx) = accessor();
        let handle = accessor.update(1, &params("a")).unwrap();
        assert!(accessor.update(1, &params("a")).is_none());

        let (_, reply) = rx.recv().await.unwrap();
        reply.send(ok(r#""x""#)).unwrap();
        handle.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn late_resolution_for_old_key_is_discarded() {
        let (accessor, mut rx) = accessor();
        let first = accessor.update(1, &params("a")).unwrap();
        let second = accessor.update(2, &params("b")).unwrap();
        let ((_, reply_a), (_, reply_b)) = next_two(&mut rx).await;

        reply_b.send(ok(r#""from b""#)).unwrap();
        second.await.unwrap();
        assert_eq!(accessor.value(), Some("from b".to_string()));

        reply_a.send(ok(r#""from a""#)).unwrap();
        first.await.unwrap();
        assert_eq!(accessor.value(), Some("from b".to_string()));
    }

    #[tokio::test]
    async fn late_resolution_for_a_returning_key_is_discarded() {
        let (accessor, mut rx) = accessor();
        let first = accessor.update(1, &params("a")).unwrap();
        let _second = accessor.update(2, &params("b")).unwrap();
        let third = accessor.update(1, &params("a2")).unwrap();

        let mut pending = HashMap::new();
        for _ in 0..3 {
            let (request, reply) = rx.recv().await.unwrap();
            pending.insert(dataset_of(&request), reply);
        }

        pending.remove("a2").unwrap().send(ok(r#""fresh""#)).unwrap();
        third.await.unwrap();
        assert_eq!(accessor.value(), Some("fresh".to_string()));

        pending.remove("a").unwrap().send(ok(r#""stale""#)).unwrap();
        first.await.unwrap();
        assert_eq!(accessor.value(), Some("fresh".to_string()));
        assert_eq!(accessor.current_key(), Some(1));
    }

    #[tokio::test]
    async fn early_resolution_for_old_key_is_never_exposed() {
        let (accessor, mut rx) = accessor();
        let mut changes = accessor.subscribe();
        let first = accessor.update(1, &params("a")).unwrap();
        let second = accessor.update(2, &params("b")).unwrap();
        let ((_, reply_a), (_, reply_b)) = next_two(&mut rx).await;

        reply_a.send(ok(r#""from a""#)).unwrap();
        first.await.unwrap();
        assert_eq!(accessor.value(), None);
        assert!(!changes.has_changed().unwrap());

        reply_b.send(ok(r#""from b""#)).unwrap();
        second.await.unwrap();
        assert!(changes.has_changed().unwrap());
        assert_eq!(*changes.borrow_and_update(), Some("from b".to_string()));
    }

    #[tokio::test]
    async fn absent_parameter_skips_the_call() {
        let (accessor, mut rx) = accessor();
        let incomplete = PartialParams::new().with_opt::<String>("dataset", None);
        assert!(accessor.update(1, &incomplete).is_none());
        assert!(rx.try_recv().is_err());
        assert_eq!(accessor.current_key(), Some(1));
    }

    #[tokio::test]
    async fn absent_parameter_retains_value_by_default() {
        let (accessor, _rx) = accessor();
        accessor.set("kept".to_string());
        let incomplete = PartialParams::new().with_opt::<String>("dataset", None);
        accessor.update(1, &incomplete);
        assert_eq!(accessor.value(), Some("kept".to_string()));
    }

    #[tokio::test]
    async fn absent_parameter_clears_value_when_configured() {
        let (accessor, _rx) = accessor();
        let accessor = accessor.with_config(AccessorConfig {
            on_incomplete: IncompletePolicy::Clear,
        });
        accessor.set("dropped".to_string());
        let incomplete = PartialParams::new().with_opt::<String>("dataset", None);
        accessor.update(1, &incomplete);
        assert_eq!(accessor.value(), None);
    }

    #[tokio::test]
    async fn set_replaces_value_without_a_call() {
        let (accessor, mut rx) = accessor();
        let mut changes = accessor.subscribe();
        accessor.set("local".to_string());
        assert!(changes.has_changed().unwrap());
        assert_eq!(accessor.value(), Some("local".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn failure_is_recorded_and_value_kept() {
        let (accessor, mut rx) = accessor();
        accessor.set("previous".to_string());
        let handle = accessor.update(1, &params("a")).unwrap();
        let (_, reply) = rx.recv().await.unwrap();
        reply
            .send(Ok(HttpResponse {
                status: 500,
                headers: Vec::new(),
                body: String::new(),
            }))
            .unwrap();
        handle.await.unwrap();

        assert_eq!(accessor.value(), Some("previous".to_string()));
        let err = accessor.last_error().unwrap();
        assert!(matches!(
            *err,
            CallError::Remote(RemoteError::Http { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn stale_failure_is_not_recorded() {
        let (accessor, mut rx) = accessor();
        let first = accessor.update(1, &params("a")).unwrap();
        let _second = accessor.update(2, &params("b")).unwrap();
        let ((_, reply_a), (_, _reply_b)) = next_two(&mut rx).await;

        reply_a
            .send(Err(TransportError::Unreachable("down".to_string())))
            .unwrap();
        first.await.unwrap();
        assert!(accessor.last_error().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn error_and_key_stay_readable_while_a_borrow_blocks_resolution() {
        let (accessor, mut rx) = accessor();
        let handle = accessor.update(1, &params("a")).unwrap();
        let (_, reply) = rx.recv().await.unwrap();
        let changes = accessor.subscribe();

        {
            let held = changes.borrow();
            reply.send(ok(r#""late""#)).unwrap();
            std::thread::sleep(Duration::from_millis(50));
            assert!(accessor.last_error().is_none());
            assert_eq!(accessor.current_key(), Some(1));
            assert_eq!(*held, None);
        }

        handle.await.unwrap();
        assert_eq!(accessor.value(), Some("late".to_string()));
    }

    #[tokio::test]
    async fn clearing_leaves_an_unset_value_unnotified() {
        let (accessor, _rx) = accessor();
        let accessor = accessor.with_config(AccessorConfig {
            on_incomplete: IncompletePolicy::Clear,
        });
        let changes = accessor.subscribe();
        let incomplete = PartialParams::new().with_opt::<String>("dataset", None);
        accessor.update(1, &incomplete);
        assert!(!changes.has_changed().unwrap());
        assert_eq!(accessor.value(), None);
    }
}
