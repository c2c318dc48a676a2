use actix_web::cookie::{time, Cookie, SameSite};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::auth::{generate_random_string, AuthError, StrategyRegistry};
use crate::database::{DatabaseService, StoreError};
use crate::models::{Account, SessionPayload};

const SID_LENGTH: usize = 32;

/// Stored session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub sid: String,
    pub payload: Option<SessionPayload>,
    pub expires_at: DateTime<Utc>,
}

impl SessionRecord {
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now()
    }
}

/// Per-request view of the session, inserted into request extensions
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    pub sid: Option<String>,
    pub user: Option<Account>,
}

/// Session persistence
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError>;
    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError>;
    async fn destroy(&self, sid: &str) -> Result<(), StoreError>;
    /// Returns the number of removed sessions
    async fn cleanup_expired(&self) -> Result<u64, StoreError>;
}

/// Sessions in the `sessions` table
pub struct PgSessionStore {
    db: Arc<DatabaseService>,
}

impl PgSessionStore {
    pub fn new(db: Arc<DatabaseService>) -> Self {
        Self { db }
    }

    pub async fn init_schema(&self) -> Result<(), StoreError> {
        self.db.init_session_schema().await
    }
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError> {
        let client = self.db.get_client().await?;
        let row = client
            .query_opt(
                "SELECT sid, user_id, strategy, expires_at FROM sessions WHERE sid = $1",
                &[&sid],
            )
            .await?;

        Ok(row.map(|row| {
            let user_id: Option<uuid::Uuid> = row.get(1);
            let strategy: Option<String> = row.get(2);
            SessionRecord {
                sid: row.get(0),
                payload: user_id
                    .zip(strategy)
                    .map(|(id, strategy)| SessionPayload { id, strategy }),
                expires_at: row.get(3),
            }
        }))
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        let client = self.db.get_client().await?;
        let user_id = record.payload.as_ref().map(|p| p.id);
        let strategy = record.payload.as_ref().map(|p| p.strategy.clone());

        client
            .execute(
                "INSERT INTO sessions (sid, user_id, strategy, expires_at) VALUES ($1, $2, $3, $4) \
                 ON CONFLICT (sid) DO UPDATE SET user_id = $2, strategy = $3, expires_at = $4",
                &[&record.sid, &user_id, &strategy, &record.expires_at],
            )
            .await?;
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), StoreError> {
        let client = self.db.get_client().await?;
        client.execute("DELETE FROM sessions WHERE sid = $1", &[&sid]).await?;
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let client = self.db.get_client().await?;
        let removed = client
            .execute("DELETE FROM sessions WHERE expires_at <= NOW()", &[])
            .await?;
        Ok(removed)
    }
}

/// In-process session store
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, sid: &str) -> Result<Option<SessionRecord>, StoreError> {
        Ok(self.sessions.read().await.get(sid).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<(), StoreError> {
        self.sessions
            .write()
            .await
            .insert(record.sid.clone(), record.clone());
        Ok(())
    }

    async fn destroy(&self, sid: &str) -> Result<(), StoreError> {
        self.sessions.write().await.remove(sid);
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| !record.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

/// Session settings used by the manager
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cookie_name: String,
    pub ttl: Duration,
    pub secure_cookie: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            cookie_name: "sid".to_string(),
            ttl: Duration::days(14),
            secure_cookie: false,
        }
    }
}

/// Log-in/log-out/resolve on top of a session store and the strategy registry
pub struct SessionManager {
    store: Arc<dyn SessionStore>,
    registry: Arc<StrategyRegistry>,
    settings: SessionSettings,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn SessionStore>,
        registry: Arc<StrategyRegistry>,
        settings: SessionSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.settings.cookie_name
    }

    /// Persist a new session for `account` and return its cookie
    pub async fn log_in(&self, account: &Account, strategy: &str) -> Result<Cookie<'static>, AuthError> {
        let payload = self.registry.serialize(account, strategy)?;
        let record = SessionRecord {
            sid: generate_random_string(SID_LENGTH),
            payload: Some(payload),
            expires_at: Utc::now() + self.settings.ttl,
        };
        self.store.save(&record).await?;

        log::debug!("Session created for {} via {}", account.id, strategy);

        Ok(Cookie::build(self.settings.cookie_name.clone(), record.sid)
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.settings.secure_cookie)
            .max_age(time::Duration::seconds(self.settings.ttl.num_seconds()))
            .finish())
    }

    /// Destroy the session and return a cookie that clears it client-side
    pub async fn log_out(&self, sid: Option<&str>) -> Result<Cookie<'static>, StoreError> {
        if let Some(sid) = sid {
            self.store.destroy(sid).await?;
        }

        let mut cookie = Cookie::build(self.settings.cookie_name.clone(), "")
            .path("/")
            .finish();
        cookie.make_removal();
        Ok(cookie)
    }

    /// Current user for `sid`. Expired records are removed and resolve to no user.
    pub async fn resolve(&self, sid: &str) -> Result<Option<Account>, AuthError> {
        let record = match self.store.load(sid).await? {
            Some(record) => record,
            None => return Ok(None),
        };

        if record.is_expired() {
            self.store.destroy(sid).await?;
            return Ok(None);
        }

        self.registry.deserialize(record.payload.as_ref()).await
    }

    pub async fn destroy(&self, sid: &str) -> Result<(), StoreError> {
        self.store.destroy(sid).await
    }

    pub async fn cleanup_expired(&self) -> Result<u64, StoreError> {
        self.store.cleanup_expired().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{BcryptHasher, PasswordHasher, StrategyConfig};
    use crate::database::{AccountStore, MemoryAccountStore};
    use crate::models::NewAccount;

    async fn setup() -> (SessionManager, Arc<MemorySessionStore>, Arc<MemoryAccountStore>, Account) {
        let hasher = Arc::new(BcryptHasher::new(4));
        let users = Arc::new(MemoryAccountStore::new("User"));
        let account = users
            .insert(NewAccount {
                full_name: "Ann".into(),
                email: "ann@example.com".into(),
                username: None,
                password_hash: hasher.hash("secret").unwrap(),
                token: None,
            })
            .await
            .unwrap();

        let registry = StrategyRegistry::from_configs(
            hasher,
            vec![StrategyConfig::new("user-local", users.clone())],
        )
        .unwrap();
        let store = Arc::new(MemorySessionStore::new());
        let manager = SessionManager::new(store.clone(), Arc::new(registry), SessionSettings::default());
        (manager, store, users, account)
    }

    #[tokio::test]
    async fn login_cookie_resolves_to_account() {
        let (manager, _, _, account) = setup().await;
        let cookie = manager.log_in(&account, "user-local").await.unwrap();

        assert_eq!(cookie.name(), "sid");
        assert_eq!(cookie.value().len(), 32);
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));

        let user = manager.resolve(cookie.value()).await.unwrap();
        assert_eq!(user.map(|u| u.id), Some(account.id));
    }

    #[tokio::test]
    async fn logout_destroys_record() {
        let (manager, store, _, account) = setup().await;
        let cookie = manager.log_in(&account, "user-local").await.unwrap();
        let sid = cookie.value().to_string();

        let removal = manager.log_out(Some(&sid)).await.unwrap();
        assert_eq!(removal.value(), "");
        assert!(store.load(&sid).await.unwrap().is_none());
        assert!(manager.resolve(&sid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_sessions_resolve_to_nobody() {
        let (manager, store, _, account) = setup().await;
        store
            .save(&SessionRecord {
                sid: "stale".into(),
                payload: Some(SessionPayload { id: account.id, strategy: "user-local".into() }),
                expires_at: Utc::now() - Duration::minutes(1),
            })
            .await
            .unwrap();

        assert!(manager.resolve("stale").await.unwrap().is_none());
        assert!(store.load("stale").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn deleted_account_is_an_error() {
        let (manager, _, users, account) = setup().await;
        let cookie = manager.log_in(&account, "user-local").await.unwrap();
        users.delete(account.id).await.unwrap();

        let result = manager.resolve(cookie.value()).await;
        assert!(matches!(result, Err(AuthError::UserNotFound)));
    }

    #[tokio::test]
    async fn cleanup_counts_removed_sessions() {
        let store = MemorySessionStore::new();
        for (sid, offset) in [("a", -5), ("b", -1), ("c", 60)] {
            store
                .save(&SessionRecord {
                    sid: sid.into(),
                    payload: None,
                    expires_at: Utc::now() + Duration::minutes(offset),
                })
                .await
                .unwrap();
        }
        assert_eq!(store.cleanup_expired().await.unwrap(), 2);
        assert!(store.load("c").await.unwrap().is_some());
    }
}
