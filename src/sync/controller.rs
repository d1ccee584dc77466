use color_eyre::Result;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::cache::{KeyedCache, QueryKey};

use super::options::{BoxFuture, ConflictPolicy, ErrorCallback, SyncOptions, UpdateFn, UpdateOrdering};
use super::state::{FetchState, SyncError};

/// A factory function that creates futures for fetching the value of a key
type FetcherFn<T> = Arc<dyn Fn(String) -> BoxFuture<T> + Send + Sync>;

/// Work finished by a spawned task, delivered to the owning query on `poll()`.
enum Completion<T> {
  Fetch {
    generation: u64,
    result: std::result::Result<(T, u64), SyncError>,
  },
  Update {
    error: Option<SyncError>,
  },
}

/// The cache write made by an optimistic `set_data`, kept for the remote update.
struct OptimisticWrite<T> {
  version: u64,
  previous: Option<T>,
}

/// Keeps one consumer in sync with one cached data source.
///
/// SyncQuery<T> encapsulates:
/// - The fetching logic (via a closure receiving the cache key)
/// - Per-consumer data/error/loading state
/// - Local and optimistic writes through `set_data`
/// - Async result handling via channels
///
/// Spawned work writes the shared cache itself, so a query that is dropped
/// before its fetch resolves still leaves the result in the cache.
pub struct SyncQuery<T, P = ()> {
  cache: KeyedCache,
  key: String,
  description: String,
  fetcher: FetcherFn<T>,
  options: SyncOptions<T, P>,
  state: FetchState<T>,
  /// Cache version `state.data` was last taken from
  seen_version: Option<u64>,
  /// Bumped by every fetch so results for an old key or an abandoned fetch are ignored
  generation: u64,
  sender: mpsc::UnboundedSender<Completion<T>>,
  receiver: mpsc::UnboundedReceiver<Completion<T>>,
}

impl<T, P> SyncQuery<T, P>
where
  T: Clone + Send + Sync + 'static,
  P: Send + 'static,
{
  /// Create a query for `key` without fetching.
  ///
  /// If the cache already holds a value for the key it is exposed as `data`
  /// right away, otherwise the configured initial value is.
  pub fn new<K, F, Fut>(cache: KeyedCache, key: K, fetcher: F, options: SyncOptions<T, P>) -> Self
  where
    K: QueryKey,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let cache_key = key.cache_key();
    let (data, seen_version) = match cache.get_versioned::<T>(&cache_key) {
      Some((data, version)) => (Some(data), Some(version)),
      None => (options.initial_data.clone(), None),
    };
    let (sender, receiver) = mpsc::unbounded_channel();

    Self {
      cache,
      key: cache_key,
      description: key.description(),
      fetcher: Arc::new(move |key| -> BoxFuture<T> { Box::pin(fetcher(key)) }),
      options,
      state: FetchState::new(data),
      seen_version,
      generation: 0,
      sender,
      receiver,
    }
  }

  /// Create a query and start its initial fetch.
  pub fn mount<K, F, Fut>(cache: KeyedCache, key: K, fetcher: F, options: SyncOptions<T, P>) -> Self
  where
    K: QueryKey,
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let mut query = Self::new(cache, key, fetcher, options);
    query.fetch();
    query
  }

  /// Current state snapshot.
  pub fn state(&self) -> &FetchState<T> {
    &self.state
  }

  pub fn data(&self) -> Option<&T> {
    self.state.data()
  }

  pub fn error(&self) -> Option<&SyncError> {
    self.state.error()
  }

  pub fn is_loading(&self) -> bool {
    self.state.is_loading()
  }

  /// Cache key this query is bound to.
  pub fn key(&self) -> &str {
    &self.key
  }

  /// Start fetching if not already loading.
  pub fn fetch(&mut self) {
    if self.state.loading {
      return;
    }
    self.start_fetch();
  }

  /// Fetch again even if a fetch is already in flight.
  ///
  /// The earlier fetch still completes and writes the cache, but its result
  /// no longer changes this query's loading or error state.
  pub fn refetch(&mut self) {
    self.start_fetch();
  }

  /// Point the query at another data source.
  ///
  /// Re-fetches only when the new key's `cache_key()` differs from the current
  /// one. Returns whether it did.
  pub fn set_key<K: QueryKey>(&mut self, key: K) -> bool {
    let cache_key = key.cache_key();
    if cache_key == self.key {
      return false;
    }
    debug!(from = %self.key, to = %cache_key, "query key changed");

    self.key = cache_key;
    self.description = key.description();
    match self.cache.get_versioned::<T>(&self.key) {
      Some((data, version)) => {
        self.state.data = Some(data);
        self.seen_version = Some(version);
      }
      None => {
        self.state.data = self.options.initial_data.clone();
        self.seen_version = None;
      }
    }
    self.refetch();
    true
  }

  /// Write a new value for this query's key.
  ///
  /// Without an `update_remote` function the value is stored in the cache and
  /// nothing else happens. With one and `optimistic(true)`, the value is stored
  /// first and the remote update runs afterwards; if it fails the error is
  /// reported and the local value stays (see `ConflictPolicy`). With one and
  /// `optimistic(false)`, the cache is written only with the value the remote
  /// update resolves to.
  pub fn set_data(&mut self, value: T, payload: Option<P>) {
    let Some(update) = self.options.update_remote.clone() else {
      self.store_local(value);
      return;
    };

    if self.options.optimistic {
      let previous = self
        .cache
        .get::<T>(&self.key)
        .or_else(|| self.state.data.clone());
      let version = self.store_local(value.clone());
      self.spawn_update(update, payload, value, Some(OptimisticWrite { version, previous }));
    } else {
      self.spawn_update(update, payload, value, None);
    }
  }

  /// Apply results from finished fetches and updates.
  ///
  /// Returns `true` if the state changed. Call this in your event loop tick handler.
  pub fn poll(&mut self) -> bool {
    let mut changed = false;

    while let Ok(completion) = self.receiver.try_recv() {
      match completion {
        Completion::Fetch { generation, result } => {
          if generation != self.generation {
            continue;
          }
          self.state.loading = false;
          match result {
            Ok((data, version)) => {
              if self.seen_version.map_or(true, |seen| version > seen) {
                self.state.data = Some(data);
                self.seen_version = Some(version);
              }
              self.state.error = None;
            }
            Err(error) => self.state.error = Some(error),
          }
          changed = true;
        }
        Completion::Update { error } => {
          if let Some(error) = error {
            self.state.error = Some(error);
            changed = true;
          }
        }
      }
    }

    self.sync_from_cache() || changed
  }

  /// Pick up writes to our key made by spawned work or other consumers.
  fn sync_from_cache(&mut self) -> bool {
    let Some(version) = self.cache.version(&self.key) else {
      return false;
    };
    if self.seen_version.is_some_and(|seen| seen >= version) {
      return false;
    }
    match self.cache.get_versioned::<T>(&self.key) {
      Some((data, version)) => {
        self.state.data = Some(data);
        self.seen_version = Some(version);
        true
      }
      None => false,
    }
  }

  fn store_local(&mut self, value: T) -> u64 {
    let version = self.cache.write(&self.key, value.clone());
    self.state.data = Some(value);
    self.seen_version = Some(version);
    version
  }

  fn start_fetch(&mut self) {
    self.generation += 1;
    self.state.loading = true;

    let generation = self.generation;
    let key = self.key.clone();
    let cache = self.cache.clone();
    let sender = self.sender.clone();
    let on_error = self.options.on_error.clone();
    let future = (self.fetcher)(key.clone());
    debug!(source = %self.description, generation, "fetch started");

    tokio::spawn(async move {
      let result = match future.await {
        Ok(data) => {
          let version = cache.write(&key, data.clone());
          debug!(key = %key, version, "fetch finished");
          Ok((data, version))
        }
        Err(report) => {
          let error: SyncError = Arc::new(report);
          warn!(key = %key, error = %error, "fetch failed");
          notify(on_error.as_ref(), &error);
          Err(error)
        }
      };
      // Ignore send errors - the query may have been dropped
      let _ = sender.send(Completion::Fetch { generation, result });
    });
  }

  fn spawn_update(
    &self,
    update: UpdateFn<T, P>,
    payload: Option<P>,
    value: T,
    optimistic_write: Option<OptimisticWrite<T>>,
  ) {
    let key = self.key.clone();
    let cache = self.cache.clone();
    let sender = self.sender.clone();
    let on_error = self.options.on_error.clone();
    let policy = self.options.conflict_policy;
    let ordering = self.options.ordering;
    let future = update(payload, value);
    debug!(source = %self.description, optimistic = optimistic_write.is_some(), "remote update started");

    tokio::spawn(async move {
      let error = match future.await {
        Ok(persisted) => {
          match (ordering, &optimistic_write) {
            (UpdateOrdering::LastIssued, Some(write)) => {
              if cache.set_if_version(&key, write.version, persisted).is_none() {
                debug!(key = %key, "update resolved after a newer edit, result dropped");
              }
            }
            _ => {
              cache.write(&key, persisted);
            }
          }
          None
        }
        Err(report) => {
          let error: SyncError = Arc::new(report);
          warn!(key = %key, error = %error, "remote update failed");
          if let (ConflictPolicy::Revert, Some(write)) = (policy, optimistic_write) {
            if let Some(previous) = write.previous {
              if cache.set_if_version(&key, write.version, previous).is_some() {
                debug!(key = %key, "optimistic value reverted");
              }
            }
          }
          notify(on_error.as_ref(), &error);
          Some(error)
        }
      };
      let _ = sender.send(Completion::Update { error });
    });
  }
}

fn notify(callback: Option<&ErrorCallback>, error: &SyncError) {
  if let Some(callback) = callback {
    callback(error);
  }
}

impl<T: std::fmt::Debug, P> std::fmt::Debug for SyncQuery<T, P> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("SyncQuery")
      .field("key", &self.key)
      .field("state", &self.state)
      .field("seen_version", &self.seen_version)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use color_eyre::eyre::eyre;
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Mutex;
  use std::time::Duration;
  use tokio::sync::oneshot;

  async fn settle() {
    tokio::time::sleep(Duration::from_millis(10)).await;
  }

  fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
  }

  /// Remote update whose calls block until the test releases them by payload id.
  fn gated_update(
    gates: Arc<Mutex<HashMap<u32, oneshot::Receiver<()>>>>,
  ) -> impl Fn(Option<u32>, String) -> BoxFuture<String> + Send + Sync + 'static {
    move |payload, value| {
      let gate = gates.lock().unwrap().remove(&payload.unwrap()).unwrap();
      Box::pin(async move {
        gate.await.ok();
        Ok::<_, color_eyre::Report>(value)
      })
    }
  }

  #[tokio::test]
  async fn test_initial_data_comes_from_cache() {
    let cache = KeyedCache::new();
    cache.set("/merchant/get", "cached".to_string());

    let query: SyncQuery<String> = SyncQuery::mount(
      cache.clone(),
      "/merchant/get",
      |_key| async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        Ok::<_, color_eyre::Report>("fresh".to_string())
      },
      SyncOptions::new(),
    );

    assert!(query.is_loading());
    assert_eq!(query.data().map(String::as_str), Some("cached"));
  }

  #[tokio::test]
  async fn test_initial_value_without_cache() {
    let query: SyncQuery<Vec<u32>> = SyncQuery::new(
      KeyedCache::new(),
      "/merchant/metric/list",
      |_key| async { Ok::<_, color_eyre::Report>(vec![1]) },
      SyncOptions::new().initial_data(Vec::new()),
    );

    assert!(!query.is_loading());
    assert_eq!(query.data(), Some(&Vec::new()));
  }

  #[tokio::test]
  async fn test_fetch_success_writes_cache() {
    let cache = KeyedCache::new();
    let mut query: SyncQuery<Vec<u32>> = SyncQuery::mount(
      cache.clone(),
      "/merchant/metric/list",
      |key| async move {
        assert_eq!(key, "/merchant/metric/list");
        Ok::<_, color_eyre::Report>(vec![1, 2, 3])
      },
      SyncOptions::new(),
    );

    settle().await;

    assert!(query.poll());
    assert!(!query.is_loading());
    assert!(query.error().is_none());
    assert_eq!(query.data(), Some(&vec![1, 2, 3]));
    assert_eq!(cache.get::<Vec<u32>>("/merchant/metric/list"), Some(vec![1, 2, 3]));
  }

  #[tokio::test]
  async fn test_fetch_error_keeps_data_and_reports() {
    let cache = KeyedCache::new();
    cache.set("/merchant/get", 7u32);
    let reported = counter();
    let reported_clone = reported.clone();

    let mut query: SyncQuery<u32> = SyncQuery::mount(
      cache.clone(),
      "/merchant/get",
      |_key| async { Err(eyre!("503 Service Unavailable")) },
      SyncOptions::new().on_error(move |_| {
        reported_clone.fetch_add(1, Ordering::SeqCst);
      }),
    );

    settle().await;

    assert!(query.poll());
    assert!(!query.is_loading());
    assert_eq!(query.data(), Some(&7));
    assert_eq!(
      query.error().map(|e| e.to_string()),
      Some("503 Service Unavailable".to_string())
    );
    assert_eq!(reported.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get::<u32>("/merchant/get"), Some(7));
  }

  #[tokio::test]
  async fn test_successful_fetch_clears_error() {
    let calls = counter();
    let calls_clone = calls.clone();

    let mut query: SyncQuery<u32> = SyncQuery::mount(
      KeyedCache::new(),
      "/merchant/get",
      move |_key| {
        let attempt = calls_clone.fetch_add(1, Ordering::SeqCst);
        async move {
          if attempt == 0 {
            Err(eyre!("timeout"))
          } else {
            Ok(1)
          }
        }
      },
      SyncOptions::new(),
    );

    settle().await;
    query.poll();
    assert!(query.error().is_some());

    query.fetch();
    settle().await;
    query.poll();
    assert!(query.error().is_none());
    assert_eq!(query.data(), Some(&1));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }

  #[tokio::test]
  async fn test_fetch_while_loading_is_noop() {
    let calls = counter();
    let calls_clone = calls.clone();

    let mut query: SyncQuery<u32> = SyncQuery::mount(
      KeyedCache::new(),
      "k",
      move |_key| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async {
          tokio::time::sleep(Duration::from_millis(100)).await;
          Ok(1)
        }
      },
      SyncOptions::new(),
    );

    query.fetch();
    assert!(query.is_loading());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_set_key_refetches_only_on_change() {
    let calls = counter();
    let calls_clone = calls.clone();
    let cache = KeyedCache::new();

    let mut query: SyncQuery<String> = SyncQuery::mount(
      cache.clone(),
      "/merchant/invoice/detail?invoiceId=a",
      move |key| {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        async move { Ok(key) }
      },
      SyncOptions::new(),
    );
    settle().await;
    query.poll();

    assert!(!query.set_key("/merchant/invoice/detail?invoiceId=a"));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(query.set_key(crate::cache::BillingQueryKey::InvoiceDetail {
      invoice_id: "b".to_string(),
    }));
    assert!(query.is_loading());
    assert_eq!(query.data(), None);
    settle().await;
    query.poll();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    assert_eq!(query.key(), "/merchant/invoice/detail?invoiceId=b");
    assert_eq!(
      query.data().map(String::as_str),
      Some("/merchant/invoice/detail?invoiceId=b")
    );
    assert!(cache.contains("/merchant/invoice/detail?invoiceId=a"));
  }

  #[tokio::test]
  async fn test_plain_set_data_stays_local() {
    let cache = KeyedCache::new();
    let mut query: SyncQuery<String> = SyncQuery::new(
      cache.clone(),
      "settings",
      |_key| async { Ok::<_, color_eyre::Report>("remote".to_string()) },
      SyncOptions::new(),
    );

    query.set_data("edited".to_string(), None);

    assert_eq!(query.data().map(String::as_str), Some("edited"));
    assert_eq!(cache.get::<String>("settings").as_deref(), Some("edited"));
    assert!(!query.is_loading());
  }

  #[tokio::test]
  async fn test_optimistic_update_confirms_with_resolved_value() {
    let cache = KeyedCache::new();
    let mut query: SyncQuery<u32, &'static str> = SyncQuery::new(
      cache.clone(),
      "/merchant/config/get",
      |_key| async { Ok(0) },
      SyncOptions::new()
        .optimistic(true)
        .update_remote(|payload: Option<&'static str>, value: u32| async move {
          assert_eq!(payload, Some("toggle"));
          Ok(value * 10)
        }),
    );

    query.set_data(5, Some("toggle"));
    assert_eq!(query.data(), Some(&5));
    assert_eq!(cache.get::<u32>("/merchant/config/get"), Some(5));
    assert!(!query.is_loading());

    settle().await;

    assert!(query.poll());
    assert_eq!(query.data(), Some(&50));
    assert_eq!(cache.get::<u32>("/merchant/config/get"), Some(50));
  }

  #[tokio::test]
  async fn test_optimistic_failure_does_not_roll_back() {
    let cache = KeyedCache::new();
    cache.set("/merchant/config/get", "before".to_string());
    let reported = counter();
    let reported_clone = reported.clone();

    let mut query: SyncQuery<String> = SyncQuery::new(
      cache.clone(),
      "/merchant/config/get",
      |_key| async { Ok::<_, color_eyre::Report>("before".to_string()) },
      SyncOptions::new()
        .optimistic(true)
        .on_error(move |_| {
          reported_clone.fetch_add(1, Ordering::SeqCst);
        })
        .update_remote(|_payload: Option<()>, _value| async { Err(eyre!("rejected")) }),
    );

    query.set_data("after".to_string(), None);
    settle().await;
    query.poll();

    assert_eq!(cache.get::<String>("/merchant/config/get").as_deref(), Some("after"));
    assert_eq!(query.data().map(String::as_str), Some("after"));
    assert!(query.error().is_some());
    assert_eq!(reported.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn test_revert_policy_restores_previous_value() {
    let cache = KeyedCache::new();
    cache.set("/merchant/config/get", "before".to_string());

    let mut query: SyncQuery<String> = SyncQuery::new(
      cache.clone(),
      "/merchant/config/get",
      |_key| async { Ok::<_, color_eyre::Report>("before".to_string()) },
      SyncOptions::new()
        .optimistic(true)
        .conflict_policy(ConflictPolicy::Revert)
        .update_remote(|_payload: Option<()>, _value| async { Err(eyre!("rejected")) }),
    );

    query.set_data("after".to_string(), None);
    settle().await;
    query.poll();

    assert_eq!(cache.get::<String>("/merchant/config/get").as_deref(), Some("before"));
    assert_eq!(query.data().map(String::as_str), Some("before"));
  }

  #[tokio::test]
  async fn test_pessimistic_update_writes_after_success() {
    let cache = KeyedCache::new();
    let (release, gate) = oneshot::channel::<()>();
    let gate = Arc::new(Mutex::new(Some(gate)));

    let mut query: SyncQuery<u32> = SyncQuery::new(
      cache.clone(),
      "/merchant/member/list",
      |_key| async { Ok(0) },
      SyncOptions::new().update_remote(move |_payload: Option<()>, value: u32| {
        let gate = gate.lock().unwrap().take().unwrap();
        async move {
          gate.await.ok();
          Ok(value)
        }
      }),
    );

    query.set_data(3, None);
    assert_eq!(cache.get::<u32>("/merchant/member/list"), None);

    release.send(()).unwrap();
    settle().await;
    query.poll();

    assert_eq!(cache.get::<u32>("/merchant/member/list"), Some(3));
    assert_eq!(query.data(), Some(&3));
  }

  #[tokio::test]
  async fn test_overlapping_updates_last_resolved_wins() {
    let cache = KeyedCache::new();
    let gates = Arc::new(Mutex::new(HashMap::new()));
    let (release_first, first) = oneshot::channel();
    let (release_second, second) = oneshot::channel();
    gates.lock().unwrap().insert(1, first);
    gates.lock().unwrap().insert(2, second);

    let mut query: SyncQuery<String, u32> = SyncQuery::new(
      cache.clone(),
      "/merchant/webhook/endpoint_list",
      |_key| async { Ok(String::new()) },
      SyncOptions::new()
        .optimistic(true)
        .update_remote(gated_update(gates)),
    );

    query.set_data("A".to_string(), Some(1));
    query.set_data("B".to_string(), Some(2));
    assert_eq!(cache.get::<String>("/merchant/webhook/endpoint_list").as_deref(), Some("B"));

    release_second.send(()).unwrap();
    settle().await;
    release_first.send(()).unwrap();
    settle().await;
    query.poll();

    assert_eq!(cache.get::<String>("/merchant/webhook/endpoint_list").as_deref(), Some("A"));
    assert_eq!(query.data().map(String::as_str), Some("A"));
  }

  #[tokio::test]
  async fn test_overlapping_updates_last_issued_wins() {
    let cache = KeyedCache::new();
    let gates = Arc::new(Mutex::new(HashMap::new()));
    let (release_first, first) = oneshot::channel();
    let (release_second, second) = oneshot::channel();
    gates.lock().unwrap().insert(1, first);
    gates.lock().unwrap().insert(2, second);

    let mut query: SyncQuery<String, u32> = SyncQuery::new(
      cache.clone(),
      "/merchant/webhook/endpoint_list",
      |_key| async { Ok(String::new()) },
      SyncOptions::new()
        .optimistic(true)
        .ordering(UpdateOrdering::LastIssued)
        .update_remote(gated_update(gates)),
    );

    query.set_data("A".to_string(), Some(1));
    query.set_data("B".to_string(), Some(2));

    release_second.send(()).unwrap();
    settle().await;
    release_first.send(()).unwrap();
    settle().await;
    query.poll();

    assert_eq!(cache.get::<String>("/merchant/webhook/endpoint_list").as_deref(), Some("B"));
    assert_eq!(query.data().map(String::as_str), Some("B"));
  }

  #[tokio::test]
  async fn test_dropped_query_still_writes_cache() {
    let cache = KeyedCache::new();
    let query: SyncQuery<u32> = SyncQuery::mount(
      cache.clone(),
      "/merchant/payment/list?page=0&count=10",
      |_key| async {
        tokio::time::sleep(Duration::from_millis(5)).await;
        Ok(99)
      },
      SyncOptions::new(),
    );
    drop(query);

    settle().await;

    assert_eq!(cache.get::<u32>("/merchant/payment/list?page=0&count=10"), Some(99));
  }

  #[tokio::test]
  async fn test_consumers_of_one_key_share_writes() {
    let cache = KeyedCache::new();
    let fetcher = |_key: String| async { Ok::<_, color_eyre::Report>(1u32) };
    let mut first: SyncQuery<u32> = SyncQuery::new(cache.clone(), "shared", fetcher, SyncOptions::new());
    let mut second: SyncQuery<u32> = SyncQuery::new(cache.clone(), "shared", fetcher, SyncOptions::new());

    first.set_data(42, None);
    assert!(second.poll());
    assert_eq!(second.data(), Some(&42));
    assert!(!first.poll());
  }
}
