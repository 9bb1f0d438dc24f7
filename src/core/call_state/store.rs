//! Process-wide call state keyed by call identifier.
//!
//! Every entry carries a monotonically increasing version. Writers read a
//! `(session, version)` pair, compute the next session and publish it with
//! [`CallStateStore::compare_and_set`]; a write based on a stale read is
//! rejected with [`StoreError::VersionConflict`]. Entries expire passively on
//! read and actively through [`spawn_sweeper`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::session::{CallSession, TransferIntent};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("Version conflict for call {call_id}: expected {expected}, found {actual}")]
    VersionConflict {
        call_id: String,
        expected: u64,
        actual: u64,
    },

    #[error("Unknown or expired call: {0}")]
    NotFound(String),
}

/// A session together with the version it was read at.
#[derive(Debug, Clone, PartialEq)]
pub struct Versioned {
    pub session: CallSession,
    pub version: u64,
}

#[derive(Debug)]
struct Entry {
    session: CallSession,
    version: u64,
    intent: Option<TransferIntent>,
    expires_at: Instant,
}

impl Entry {
    fn is_expired_at(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

#[derive(Debug)]
pub struct CallStateStore {
    entries: RwLock<HashMap<String, Entry>>,
    default_ttl: Duration,
}

impl CallStateStore {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Current session and version. An expired entry reads as missing and is dropped.
    pub fn get(&self, call_id: &str) -> Option<Versioned> {
        let now = Instant::now();
        {
            let entries = self.entries.read();
            match entries.get(call_id) {
                Some(entry) if !entry.is_expired_at(now) => {
                    return Some(Versioned {
                        session: entry.session.clone(),
                        version: entry.version,
                    });
                }
                Some(_) => {}
                None => return None,
            }
        }
        self.remove_if_expired(call_id, now);
        None
    }

    /// Unconditional write; returns the new version.
    pub fn put(&self, call_id: &str, session: CallSession, ttl: Option<Duration>) -> u64 {
        let now = Instant::now();
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write();
        match entries.get_mut(call_id) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.version += 1;
                entry.session = session;
                entry.expires_at = expires_at;
                entry.version
            }
            _ => {
                entries.insert(
                    call_id.to_string(),
                    Entry {
                        session,
                        version: 1,
                        intent: None,
                        expires_at,
                    },
                );
                1
            }
        }
    }

    /// Atomic read-modify-write guarded by `expected` version.
    ///
    /// `expected == 0` means the entry must not exist yet. The TTL is
    /// refreshed on every successful write.
    pub fn compare_and_set(
        &self,
        call_id: &str,
        expected: u64,
        session: CallSession,
        ttl: Option<Duration>,
    ) -> Result<u64, StoreError> {
        let now = Instant::now();
        let expires_at = now + ttl.unwrap_or(self.default_ttl);
        let mut entries = self.entries.write();

        let actual = entries
            .get(call_id)
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.version)
            .unwrap_or(0);

        if actual != expected {
            debug!(call_id, expected, actual, "Call state version conflict");
            return Err(StoreError::VersionConflict {
                call_id: call_id.to_string(),
                expected,
                actual,
            });
        }

        if actual == 0 {
            entries.insert(
                call_id.to_string(),
                Entry {
                    session,
                    version: 1,
                    intent: None,
                    expires_at,
                },
            );
            return Ok(1);
        }

        // Checked above: a live entry exists at `expected`.
        let entry = entries
            .get_mut(call_id)
            .ok_or_else(|| StoreError::NotFound(call_id.to_string()))?;
        entry.session = session;
        entry.version += 1;
        entry.expires_at = expires_at;
        Ok(entry.version)
    }

    /// Extends the entry's TTL without changing its version.
    pub fn touch(&self, call_id: &str, ttl: Option<Duration>) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(call_id) {
            Some(entry) if !entry.is_expired_at(now) => {
                entry.expires_at = now + ttl.unwrap_or(self.default_ttl);
                Ok(())
            }
            _ => Err(StoreError::NotFound(call_id.to_string())),
        }
    }

    /// Removes the entry and its intent. Returns whether a live entry existed.
    pub fn delete(&self, call_id: &str) -> bool {
        let now = Instant::now();
        self.entries
            .write()
            .remove(call_id)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    /// Stores the call's transfer intent, replacing any previous one.
    pub fn put_intent(&self, call_id: &str, intent: TransferIntent) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        match entries.get_mut(call_id) {
            Some(entry) if !entry.is_expired_at(now) => {
                // The intent may outlive the session TTL it was created under.
                if entry.expires_at < intent.expires_at() {
                    entry.expires_at = intent.expires_at();
                }
                entry.intent = Some(intent);
                Ok(())
            }
            _ => Err(StoreError::NotFound(call_id.to_string())),
        }
    }

    /// Live intent for the call. An expired intent reads as absent and is dropped.
    pub fn get_intent(&self, call_id: &str) -> Option<TransferIntent> {
        self.intent(call_id, false)
    }

    /// Removes and returns the live intent for the call.
    pub fn take_intent(&self, call_id: &str) -> Option<TransferIntent> {
        self.intent(call_id, true)
    }

    fn intent(&self, call_id: &str, take: bool) -> Option<TransferIntent> {
        let now = Instant::now();
        let mut entries = self.entries.write();
        let entry = entries.get_mut(call_id)?;
        if entry.is_expired_at(now) {
            entries.remove(call_id);
            return None;
        }
        match entry.intent.take() {
            Some(intent) if intent.is_expired_at(now) => {
                debug!(call_id, "Discarding expired transfer intent");
                None
            }
            Some(intent) => {
                if !take {
                    entry.intent = Some(intent.clone());
                }
                Some(intent)
            }
            None => None,
        }
    }

    fn remove_if_expired(&self, call_id: &str, now: Instant) {
        let mut entries = self.entries.write();
        if entries
            .get(call_id)
            .is_some_and(|entry| entry.is_expired_at(now))
        {
            entries.remove(call_id);
        }
    }

    /// Drops expired entries and intents; returns the call ids that expired.
    pub fn sweep_expired(&self) -> Vec<String> {
        let now = Instant::now();
        let mut expired = Vec::new();
        let mut entries = self.entries.write();
        entries.retain(|call_id, entry| {
            if entry.is_expired_at(now) {
                expired.push(call_id.clone());
                return false;
            }
            if entry
                .intent
                .as_ref()
                .is_some_and(|intent| intent.is_expired_at(now))
            {
                entry.intent = None;
            }
            true
        });
        expired
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Runs [`CallStateStore::sweep_expired`] every `interval` until `cancel` fires.
///
/// `on_expired` is called once per expired call id, outside the store lock.
pub fn spawn_sweeper<F>(
    store: Arc<CallStateStore>,
    interval: Duration,
    cancel: CancellationToken,
    on_expired: F,
) -> tokio::task::JoinHandle<()>
where
    F: Fn(&str) + Send + Sync + 'static,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // First tick completes immediately.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    let expired = store.sweep_expired();
                    if !expired.is_empty() {
                        info!(count = expired.len(), "Swept expired call sessions");
                    }
                    for call_id in &expired {
                        on_expired(call_id);
                    }
                }
            }
        }
        debug!("Call state sweeper stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::call_state::session::Phase;
    use std::sync::Mutex;

    const TTL: Duration = Duration::from_secs(60);

    fn session(call_id: &str) -> CallSession {
        CallSession::new(call_id, Some("+15551230000".to_string()))
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_get_delete() {
        let store = CallStateStore::new(TTL);
        assert!(store.get("CA1").is_none());

        assert_eq!(store.put("CA1", session("CA1"), None), 1);
        let read = store.get("CA1").unwrap();
        assert_eq!(read.version, 1);
        assert_eq!(read.session.phase, Phase::Connecting);

        assert!(store.delete("CA1"));
        assert!(store.get("CA1").is_none());
        assert!(!store.delete("CA1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_compare_and_set_rejects_stale_write() {
        let store = CallStateStore::new(TTL);
        assert_eq!(store.compare_and_set("CA1", 0, session("CA1"), None), Ok(1));

        let first = store.get("CA1").unwrap();
        let second = store.get("CA1").unwrap();

        let mut next = first.session.clone();
        next.enter(Phase::AwaitingIdentification);
        assert_eq!(
            store.compare_and_set("CA1", first.version, next, None),
            Ok(2)
        );

        let mut stale = second.session.clone();
        stale.enter(Phase::Failed);
        let err = store
            .compare_and_set("CA1", second.version, stale, None)
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::VersionConflict {
                call_id: "CA1".to_string(),
                expected: 1,
                actual: 2
            }
        );
        assert_eq!(
            store.get("CA1").unwrap().session.phase,
            Phase::AwaitingIdentification
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_conflicts_with_existing_entry() {
        let store = CallStateStore::new(TTL);
        store.put("CA1", session("CA1"), None);
        assert!(matches!(
            store.compare_and_set("CA1", 0, session("CA1"), None),
            Err(StoreError::VersionConflict { actual: 1, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_reads_as_missing() {
        let store = CallStateStore::new(TTL);
        store.put("CA1", session("CA1"), None);
        tokio::time::advance(TTL).await;

        assert!(store.get("CA1").is_none());
        assert!(store.is_empty());
        // A fresh create succeeds against the expired key.
        assert_eq!(store.compare_and_set("CA1", 0, session("CA1"), None), Ok(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_writes_refresh_ttl() {
        let store = CallStateStore::new(TTL);
        store.put("CA1", session("CA1"), None);
        tokio::time::advance(Duration::from_secs(50)).await;
        let read = store.get("CA1").unwrap();
        store
            .compare_and_set("CA1", read.version, read.session, None)
            .unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        assert!(store.get("CA1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_intent_per_call() {
        let store = CallStateStore::new(TTL);
        assert!(matches!(
            store.put_intent(
                "CA1",
                TransferIntent::new(None, None, Duration::from_secs(10))
            ),
            Err(StoreError::NotFound(_))
        ));

        store.put("CA1", session("CA1"), None);
        store
            .put_intent(
                "CA1",
                TransferIntent::new(Some("+1111".into()), None, Duration::from_secs(120)),
            )
            .unwrap();
        store
            .put_intent(
                "CA1",
                TransferIntent::new(Some("+2222".into()), None, Duration::from_secs(120)),
            )
            .unwrap();

        assert_eq!(
            store.get_intent("CA1").unwrap().target.as_deref(),
            Some("+2222")
        );
        assert!(store.take_intent("CA1").is_some());
        assert!(store.get_intent("CA1").is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_intent_behaves_like_none() {
        let store = CallStateStore::new(Duration::from_secs(900));
        store.put("CA1", session("CA1"), None);
        store
            .put_intent(
                "CA1",
                TransferIntent::new(Some("+1111".into()), None, Duration::from_secs(120)),
            )
            .unwrap();

        tokio::time::advance(Duration::from_secs(121)).await;
        assert!(store.get_intent("CA1").is_none());
        assert!(store.take_intent("CA1").is_none());
        // The session itself is still live.
        assert!(store.get("CA1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_intent_extends_short_session_ttl() {
        let store = CallStateStore::new(Duration::from_secs(30));
        store.put("CA1", session("CA1"), None);
        store
            .put_intent(
                "CA1",
                TransferIntent::new(None, None, Duration::from_secs(120)),
            )
            .unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(store.get_intent("CA1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_reports_expired_ids() {
        let store = CallStateStore::new(TTL);
        store.put("old", session("old"), Some(Duration::from_secs(10)));
        store.put("new", session("new"), None);
        tokio::time::advance(Duration::from_secs(11)).await;

        assert_eq!(store.sweep_expired(), vec!["old".to_string()]);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper_invokes_callback() {
        let store = Arc::new(CallStateStore::new(TTL));
        store.put("CA1", session("CA1"), Some(Duration::from_secs(5)));

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let cancel = CancellationToken::new();
        let handle = spawn_sweeper(
            store.clone(),
            Duration::from_secs(10),
            cancel.clone(),
            move |call_id| sink.lock().unwrap().push(call_id.to_string()),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(*seen.lock().unwrap(), vec!["CA1".to_string()]);

        cancel.cancel();
        handle.await.unwrap();
    }
}
