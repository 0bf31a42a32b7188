use std::collections::HashSet;

use crate::bot::dedup::CALLBACK_DEDUP_TTL;
use crate::bot::dedup::CallbackCache;
use crate::db::Db;

pub struct AppContext {
  db: Db,
  admins: HashSet<i64>,
  bid_cooldown_ms: i64,
  callback_cache: CallbackCache,
}

impl AppContext {
  pub fn new(db: Db, admins: Vec<i64>, bid_cooldown_ms: i64) -> Self {
    Self {
      db,
      admins: admins.into_iter().collect(),
      bid_cooldown_ms,
      callback_cache: CallbackCache::new(CALLBACK_DEDUP_TTL),
    }
  }

  pub fn db(&self) -> &Db {
    &self.db
  }

  pub fn is_admin(&self, tg_id: i64) -> bool {
    self.admins.contains(&tg_id)
  }

  pub fn bid_cooldown_ms(&self) -> i64 {
    self.bid_cooldown_ms
  }

  pub fn callback_cache(&self) -> &CallbackCache {
    &self.callback_cache
  }
}
