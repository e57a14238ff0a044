use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::{Session, SessionId};
use crate::errors::SessionStoreError;

/// Key-value persistence for sessions. Durable backends live outside this
/// crate; the engine only needs these operations.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError>;
    async fn put(&self, session: Session) -> Result<(), SessionStoreError>;
    async fn delete(&self, id: &SessionId) -> Result<bool, SessionStoreError>;
    async fn len(&self) -> Result<usize, SessionStoreError>;
}

#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, id: &SessionId) -> Result<Option<Session>, SessionStoreError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn put(&self, session: Session) -> Result<(), SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<bool, SessionStoreError> {
        let mut sessions = self.sessions.write().await;
        Ok(sessions.remove(&id.0).is_some())
    }

    async fn len(&self) -> Result<usize, SessionStoreError> {
        Ok(self.sessions.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::domain::Session;
    use crate::store::{InMemorySessionStore, SessionStore};

    #[tokio::test]
    async fn in_memory_session_store_round_trip() {
        let store = InMemorySessionStore::default();
        let mut session = Session::new("user-1");
        session.set_variable("city", json!("Lisbon"));

        store.put(session.clone()).await.expect("save session");
        let found = store.get(&session.id).await.expect("find session");

        assert_eq!(found, Some(session));
    }

    #[tokio::test]
    async fn delete_removes_session() {
        let store = InMemorySessionStore::default();
        let session = Session::new("user-1");
        store.put(session.clone()).await.expect("save session");

        assert!(store.delete(&session.id).await.expect("delete session"));
        assert!(!store.delete(&session.id).await.expect("second delete"));
        assert_eq!(store.get(&session.id).await.expect("lookup"), None);
        assert_eq!(store.len().await.expect("len"), 0);
    }
}
