//! Per-adapter session cache
//!
//! Adapters that exchange credentials for short-lived tokens keep one of these
//! per adapter instance, keyed by connection id.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{Duration, Utc};
use lru::LruCache;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::Session;

#[derive(Clone)]
pub struct SessionCache {
    sessions: Arc<RwLock<LruCache<Uuid, Session>>>,
    refresh_lead: Duration,
}

impl SessionCache {
    pub fn new(capacity: usize, refresh_lead: Duration) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: Arc::new(RwLock::new(LruCache::new(capacity))),
            refresh_lead,
        }
    }

    /// Cached session for the connection if it is not close to expiry.
    pub async fn get_fresh(&self, connection_id: &Uuid) -> Option<Session> {
        let mut cache = self.sessions.write().await;
        match cache.get(connection_id) {
            Some(session) if session.is_fresh(Utc::now(), self.refresh_lead) => {
                Some(session.clone())
            }
            Some(_) => {
                cache.pop(connection_id);
                None
            }
            None => None,
        }
    }

    pub async fn put(&self, connection_id: Uuid, session: Session) {
        self.sessions.write().await.put(connection_id, session);
    }

    pub async fn invalidate(&self, connection_id: &Uuid) {
        self.sessions.write().await.pop(connection_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_fresh_sessions_and_evicts_expiring_ones() {
        let cache = SessionCache::new(4, Duration::minutes(5));
        let fresh_id = Uuid::new_v4();
        let stale_id = Uuid::new_v4();

        cache
            .put(
                fresh_id,
                Session::bearer("fresh", Some(Utc::now() + Duration::hours(1))),
            )
            .await;
        cache
            .put(
                stale_id,
                Session::bearer("stale", Some(Utc::now() + Duration::minutes(2))),
            )
            .await;

        let hit = cache.get_fresh(&fresh_id).await.expect("fresh session");
        assert_eq!(hit.token().unwrap(), "fresh");
        assert!(cache.get_fresh(&stale_id).await.is_none());
    }

    #[tokio::test]
    async fn invalidate_drops_entry() {
        let cache = SessionCache::new(1, Duration::minutes(1));
        let id = Uuid::new_v4();
        cache.put(id, Session::bearer("t", None)).await;
        cache.invalidate(&id).await;
        assert!(cache.get_fresh(&id).await.is_none());
    }
}
