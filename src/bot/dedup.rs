use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use std::time::Instant;

pub const CALLBACK_DEDUP_TTL: Duration = Duration::from_secs(60);

/// Acknowledgement computed for a callback, kept so a provider delivery
/// retry can be answered identically without re-running side effects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedReply {
  pub text: Option<String>,
  pub show_alert: bool,
}

impl CachedReply {
  pub fn silent() -> Self {
    Self {
      text: None,
      show_alert: false,
    }
  }

  pub fn toast(text: impl Into<String>) -> Self {
    Self {
      text: Some(text.into()),
      show_alert: false,
    }
  }

  pub fn alert(text: impl Into<String>) -> Self {
    Self {
      text: Some(text.into()),
      show_alert: true,
    }
  }
}

/// Seen-set of callback ids with a short TTL. Entries expire on probe and
/// are swept on insert, so the map stays bounded by the callback rate
/// inside one TTL window.
pub struct CallbackCache {
  ttl: Duration,
  inner: Mutex<HashMap<String, (Instant, CachedReply)>>,
}

impl CallbackCache {
  pub fn new(ttl: Duration) -> Self {
    Self {
      ttl,
      inner: Mutex::new(HashMap::new()),
    }
  }

  /// The reply previously stored for this callback id, if it has not
  /// expired yet.
  pub fn replay(&self, callback_id: &str) -> Option<CachedReply> {
    let mut guard = match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    match guard.get(callback_id) {
      Some((stored_at, reply)) if stored_at.elapsed() < self.ttl => Some(reply.clone()),
      Some(_) => {
        guard.remove(callback_id);
        None
      },
      None => None,
    }
  }

  pub fn store(&self, callback_id: String, reply: CachedReply) {
    let mut guard = match self.inner.lock() {
      Ok(guard) => guard,
      Err(poisoned) => poisoned.into_inner(),
    };
    let ttl = self.ttl;
    guard.retain(|_, (stored_at, _)| stored_at.elapsed() < ttl);
    guard.insert(callback_id, (Instant::now(), reply));
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::CachedReply;
  use super::CallbackCache;

  #[test]
  fn replays_stored_reply() {
    let cache = CallbackCache::new(Duration::from_secs(60));
    cache.store("cb1".to_string(), CachedReply::toast("✅ Bid placed"));
    assert_eq!(cache.replay("cb1"), Some(CachedReply::toast("✅ Bid placed")));
    assert_eq!(cache.replay("cb2"), None);
  }

  #[test]
  fn replay_is_stable_across_repeats() {
    let cache = CallbackCache::new(Duration::from_secs(60));
    cache.store("cb1".to_string(), CachedReply::alert("⏳ wait"));
    for _ in 0 .. 5 {
      assert_eq!(cache.replay("cb1"), Some(CachedReply::alert("⏳ wait")));
    }
  }

  #[test]
  fn expired_entries_are_gone() {
    let cache = CallbackCache::new(Duration::ZERO);
    cache.store("cb1".to_string(), CachedReply::silent());
    assert_eq!(cache.replay("cb1"), None);
  }

  #[test]
  fn store_sweeps_expired_entries() {
    let cache = CallbackCache::new(Duration::ZERO);
    cache.store("cb1".to_string(), CachedReply::silent());
    cache.store("cb2".to_string(), CachedReply::silent());
    let guard = cache.inner.lock().expect("unpoisoned in test");
    assert_eq!(guard.len(), 1);
    assert!(guard.contains_key("cb2"));
  }
}
