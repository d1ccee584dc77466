use std::sync::Arc;

/// A fetch or update failure.
///
/// Shared so the state snapshot and the `on_error` callback see the same value.
pub type SyncError = Arc<color_eyre::Report>;

/// Per-consumer view of a data source.
#[derive(Debug, Clone)]
pub struct FetchState<T> {
  /// Mirrors the cache entry for the consumer's key, or the initial value
  pub data: Option<T>,
  /// Most recent fetch or update failure. Only a later successful fetch clears it.
  pub error: Option<SyncError>,
  /// True only while a fetch is in flight. Updates never set it.
  pub loading: bool,
}

impl<T> FetchState<T> {
  pub(crate) fn new(data: Option<T>) -> Self {
    Self {
      data,
      error: None,
      loading: false,
    }
  }

  pub fn is_loading(&self) -> bool {
    self.loading
  }

  pub fn is_error(&self) -> bool {
    self.error.is_some()
  }

  pub fn data(&self) -> Option<&T> {
    self.data.as_ref()
  }

  pub fn error(&self) -> Option<&SyncError> {
    self.error.as_ref()
  }
}

impl<T> Default for FetchState<T> {
  fn default() -> Self {
    Self::new(None)
  }
}
