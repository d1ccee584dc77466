use color_eyre::Result;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use super::state::SyncError;

/// A boxed future resolving to a `color_eyre::Result<T>`
pub(crate) type BoxFuture<T> = Pin<Box<dyn Future<Output = Result<T>> + Send>>;

/// Pushes a locally edited value to the backend and resolves to the persisted value.
pub(crate) type UpdateFn<T, P> = Arc<dyn Fn(Option<P>, T) -> BoxFuture<T> + Send + Sync>;

pub(crate) type ErrorCallback = Arc<dyn Fn(&SyncError) + Send + Sync>;

/// What happens to an optimistically written value when the remote update fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ConflictPolicy {
  /// Keep the local edit. The failure is reported through `on_error` only.
  #[default]
  TrustLocal,
  /// Put back the value that was cached before the edit, unless the entry was
  /// written again in the meantime.
  Revert,
}

/// Which remote update result is kept when several overlap on one key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum UpdateOrdering {
  /// Whichever update resolves last is stored last.
  #[default]
  LastResolved,
  /// A resolution is dropped if the entry was written after its own optimistic
  /// write, so the most recently issued edit wins.
  LastIssued,
}

/// Configuration for a `SyncQuery`.
pub struct SyncOptions<T, P = ()> {
  pub(crate) initial_data: Option<T>,
  pub(crate) on_error: Option<ErrorCallback>,
  pub(crate) update_remote: Option<UpdateFn<T, P>>,
  pub(crate) optimistic: bool,
  pub(crate) conflict_policy: ConflictPolicy,
  pub(crate) ordering: UpdateOrdering,
}

impl<T, P> SyncOptions<T, P> {
  pub fn new() -> Self {
    Self {
      initial_data: None,
      on_error: None,
      update_remote: None,
      optimistic: false,
      conflict_policy: ConflictPolicy::default(),
      ordering: UpdateOrdering::default(),
    }
  }

  /// Value exposed before the first load when nothing is cached yet.
  pub fn initial_data(mut self, data: T) -> Self {
    self.initial_data = Some(data);
    self
  }

  /// Called with every fetch or update failure.
  pub fn on_error<F>(mut self, callback: F) -> Self
  where
    F: Fn(&SyncError) + Send + Sync + 'static,
  {
    self.on_error = Some(Arc::new(callback));
    self
  }

  /// Function used by `set_data` to persist a value remotely.
  ///
  /// It receives the caller's payload and the new value, and resolves to the
  /// authoritative value after the update.
  pub fn update_remote<F, Fut>(mut self, update: F) -> Self
  where
    T: 'static,
    P: 'static,
    F: Fn(Option<P>, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T>> + Send + 'static,
  {
    let update: UpdateFn<T, P> =
      Arc::new(move |payload, data| -> BoxFuture<T> { Box::pin(update(payload, data)) });
    self.update_remote = Some(update);
    self
  }

  /// Write to the cache before the remote update instead of after it.
  pub fn optimistic(mut self, optimistic: bool) -> Self {
    self.optimistic = optimistic;
    self
  }

  pub fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
    self.conflict_policy = policy;
    self
  }

  pub fn ordering(mut self, ordering: UpdateOrdering) -> Self {
    self.ordering = ordering;
    self
  }
}

impl<T, P> Default for SyncOptions<T, P> {
  fn default() -> Self {
    Self::new()
  }
}
