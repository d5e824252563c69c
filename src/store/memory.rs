//! In-memory keyed store.
//!
//! All keys live behind a single mutex, so every trait operation is atomic
//! with respect to every other. Expiry is evaluated lazily against the
//! injected [`Clock`] whenever a key is touched.
//!
//! ## Limitations
//!
//! - Single process only: state is not shared across instances.
//! - No persistence: everything is lost when the process exits.
//! - Keys that are never touched again stay in memory until
//!   [`MemoryKeyedStore::purge_until_cancelled`] sweeps them.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{KeyedStore, Result, StoreError};
use crate::clock::{Clock, to_delta};

#[derive(Debug, Clone)]
enum Value {
    Str(String),
    List(VecDeque<String>),
}

#[derive(Debug, Clone)]
struct Entry {
    value: Value,
    expires_at: Option<DateTime<Utc>>,
}

/// Single-process [`KeyedStore`].
pub struct MemoryKeyedStore {
    entries: Mutex<HashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryKeyedStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        MemoryKeyedStore {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    /// Drops every expired key. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.lock();
        let before = entries.len();
        entries.retain(|_, e| !is_expired(e, now));
        before - entries.len()
    }

    /// Calls [`Self::purge_expired`] every `every` until `shutdown` fires.
    pub async fn purge_until_cancelled(self: Arc<Self>, every: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    let purged = self.purge_expired();
                    if purged > 0 {
                        debug!(purged, "Expired keys purged");
                    }
                }
            }
        }
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.lock().values().filter(|e| !is_expired(e, now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the lock cannot leave an entry half-written,
        // so the map is still consistent.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Locks the map and evicts `key` if it has expired.
    fn live(&self, key: &str) -> (MutexGuard<'_, HashMap<String, Entry>>, DateTime<Utc>) {
        let now = self.clock.now();
        let mut entries = self.lock();
        if entries.get(key).is_some_and(|e| is_expired(e, now)) {
            entries.remove(key);
        }
        (entries, now)
    }

    fn expiry(now: DateTime<Utc>, ttl: Option<Duration>) -> Option<DateTime<Utc>> {
        ttl.map(|t| now + to_delta(t))
    }
}

fn is_expired(entry: &Entry, now: DateTime<Utc>) -> bool {
    entry.expires_at.is_some_and(|at| at <= now)
}

fn list_mut<'a>(
    entries: &'a mut HashMap<String, Entry>,
    key: &str,
) -> Result<Option<&'a mut VecDeque<String>>> {
    match entries.get_mut(key) {
        None => Ok(None),
        Some(Entry {
            value: Value::List(list),
            ..
        }) => Ok(Some(list)),
        Some(_) => Err(StoreError::WrongType(key.to_string())),
    }
}

#[async_trait]
impl KeyedStore for MemoryKeyedStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let (entries, _) = self.live(key);
        match entries.get(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Str(s),
                ..
            }) => Ok(Some(s.clone())),
            Some(_) => Err(StoreError::WrongType(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<()> {
        let (mut entries, now) = self.live(key);
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Self::expiry(now, ttl),
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool> {
        let (mut entries, now) = self.live(key);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::Str(value.to_string()),
                expires_at: Self::expiry(now, ttl),
            },
        );
        Ok(true)
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let (mut entries, _) = self.live(key);
        Ok(entries.remove(key).is_some())
    }

    async fn push_front(&self, key: &str, value: &str) -> Result<usize> {
        let (mut entries, _) = self.live(key);
        if let Some(list) = list_mut(&mut entries, key)? {
            list.push_front(value.to_string());
            return Ok(list.len());
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: Value::List(VecDeque::from([value.to_string()])),
                expires_at: None,
            },
        );
        Ok(1)
    }

    async fn trim(&self, key: &str, max_len: usize) -> Result<usize> {
        let (mut entries, _) = self.live(key);
        let Some(list) = list_mut(&mut entries, key)? else {
            return Ok(0);
        };
        let dropped = list.len().saturating_sub(max_len);
        list.truncate(max_len);
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(dropped)
    }

    async fn remove_first(&self, key: &str, value: &str) -> Result<bool> {
        let (mut entries, _) = self.live(key);
        let Some(list) = list_mut(&mut entries, key)? else {
            return Ok(false);
        };
        let Some(pos) = list.iter().position(|v| v == value) else {
            return Ok(false);
        };
        list.remove(pos);
        if list.is_empty() {
            entries.remove(key);
        }
        Ok(true)
    }

    async fn list_recent(&self, key: &str, limit: usize) -> Result<Vec<String>> {
        let (mut entries, _) = self.live(key);
        match list_mut(&mut entries, key)? {
            Some(list) => Ok(list.iter().take(limit).cloned().collect()),
            None => Ok(Vec::new()),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool> {
        let (mut entries, now) = self.live(key);
        match entries.get_mut(key) {
            Some(entry) => {
                entry.expires_at = Self::expiry(now, Some(ttl));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64> {
        let (mut entries, _) = self.live(key);
        let entry = entries.entry(key.to_string()).or_insert_with(|| Entry {
            value: Value::Str("0".to_string()),
            expires_at: None,
        });
        let Value::Str(current) = &entry.value else {
            return Err(StoreError::WrongType(key.to_string()));
        };
        let next = current
            .parse::<i64>()
            .map_err(|_| StoreError::NotAnInteger(key.to_string()))?
            + 1;
        entry.value = Value::Str(next.to_string());
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use proptest::prelude::*;

    fn store() -> (MemoryKeyedStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        (MemoryKeyedStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn set_if_absent_only_once() {
        let (store, _) = store();
        assert!(store.set_if_absent("k", "a", None).await.unwrap());
        assert!(!store.set_if_absent("k", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn set_if_absent_succeeds_after_ttl() {
        let (store, clock) = store();
        let ttl = Some(Duration::from_secs(60));
        assert!(store.set_if_absent("k", "a", ttl).await.unwrap());
        clock.advance(Duration::from_secs(59));
        assert!(!store.set_if_absent("k", "b", ttl).await.unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(store.set_if_absent("k", "c", ttl).await.unwrap());
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("c"));
    }

    #[tokio::test]
    async fn set_replaces_ttl() {
        let (store, clock) = store();
        store.set("k", "a", Some(Duration::from_secs(10))).await.unwrap();
        store.set("k", "b", None).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        assert_eq!(store.get("k").await.unwrap().as_deref(), Some("b"));
    }

    #[tokio::test]
    async fn push_front_orders_most_recent_first() {
        let (store, _) = store();
        store.push_front("l", "1").await.unwrap();
        store.push_front("l", "2").await.unwrap();
        assert_eq!(store.push_front("l", "3").await.unwrap(), 3);
        assert_eq!(store.list_recent("l", 10).await.unwrap(), vec!["3", "2", "1"]);
        assert_eq!(store.list_recent("l", 2).await.unwrap(), vec!["3", "2"]);
    }

    #[tokio::test]
    async fn trim_drops_oldest() {
        let (store, _) = store();
        for i in 0..5 {
            store.push_front("l", &i.to_string()).await.unwrap();
        }
        assert_eq!(store.trim("l", 3).await.unwrap(), 2);
        assert_eq!(store.list_recent("l", 10).await.unwrap(), vec!["4", "3", "2"]);
    }

    #[tokio::test]
    async fn remove_first_removes_one_occurrence() {
        let (store, _) = store();
        store.push_front("l", "x").await.unwrap();
        store.push_front("l", "y").await.unwrap();
        store.push_front("l", "x").await.unwrap();
        assert!(store.remove_first("l", "x").await.unwrap());
        assert_eq!(store.list_recent("l", 10).await.unwrap(), vec!["y", "x"]);
        assert!(!store.remove_first("l", "z").await.unwrap());
    }

    #[tokio::test]
    async fn remove_first_on_missing_key() {
        let (store, _) = store();
        assert!(!store.remove_first("nope", "x").await.unwrap());
    }

    #[tokio::test]
    async fn emptied_list_is_deleted() {
        let (store, _) = store();
        store.push_front("l", "x").await.unwrap();
        store.remove_first("l", "x").await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn idle_list_expires() {
        let (store, clock) = store();
        store.push_front("l", "x").await.unwrap();
        assert!(store.expire("l", Duration::from_secs(600)).await.unwrap());
        clock.advance(Duration::from_secs(601));
        assert!(store.list_recent("l", 10).await.unwrap().is_empty());
        assert!(!store.expire("l", Duration::from_secs(600)).await.unwrap());
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let (store, _) = store();
        store.set("k", "v", None).await.unwrap();
        assert!(matches!(
            store.push_front("k", "x").await,
            Err(StoreError::WrongType(_))
        ));
        store.push_front("l", "x").await.unwrap();
        assert!(matches!(store.get("l").await, Err(StoreError::WrongType(_))));
    }

    #[tokio::test]
    async fn incr_counts_from_zero() {
        let (store, _) = store();
        assert_eq!(store.incr("c").await.unwrap(), 1);
        assert_eq!(store.incr("c").await.unwrap(), 2);
        store.set("s", "abc", None).await.unwrap();
        assert!(matches!(store.incr("s").await, Err(StoreError::NotAnInteger(_))));
    }

    #[tokio::test]
    async fn purge_expired_counts_removed_keys() {
        let (store, clock) = store();
        store.set("a", "1", Some(Duration::from_secs(1))).await.unwrap();
        store.set("b", "1", None).await.unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn purge_loop_sweeps_untouched_keys_until_cancelled() {
        let (store, clock) = store();
        let store = Arc::new(store);
        let shutdown = CancellationToken::new();
        let sweeper = tokio::spawn(
            store
                .clone()
                .purge_until_cancelled(Duration::from_secs(60), shutdown.clone()),
        );

        store.set("recordClick:a", "1", Some(Duration::from_secs(30))).await.unwrap();
        store.set("kept", "1", None).await.unwrap();
        clock.advance(Duration::from_secs(31));
        assert_eq!(store.lock().len(), 2);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(store.lock().len(), 1);

        shutdown.cancel();
        sweeper.await.unwrap();
    }

    #[tokio::test]
    async fn concurrent_set_if_absent_has_one_winner() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = Arc::new(MemoryKeyedStore::new(clock));
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .set_if_absent("gate", &i.to_string(), None)
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    proptest! {
        /// After any sequence of pushes and a trim, the list holds the
        /// `max_len` most recent values in reverse push order.
        #[test]
        fn trim_keeps_most_recent(values in prop::collection::vec("[a-z]{1,4}", 0..40), max_len in 0usize..20) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let (store, _) = store();
                for v in &values {
                    store.push_front("l", v).await.unwrap();
                }
                store.trim("l", max_len).await.unwrap();
                let got = store.list_recent("l", usize::MAX).await.unwrap();
                let expected: Vec<String> = values.iter().rev().take(max_len).cloned().collect();
                prop_assert_eq!(got, expected);
                Ok(())
            })?;
        }
    }
}
