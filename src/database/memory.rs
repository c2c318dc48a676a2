use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{AccountStore, StoreError};
use crate::models::{Account, LoginField, NewAccount};

/// In-process account store with the same uniqueness rules as the Postgres table.
/// Used by tests and by projects running without a database.
pub struct MemoryAccountStore {
    model_name: String,
    accounts: RwLock<HashMap<Uuid, Account>>,
}

impl MemoryAccountStore {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            accounts: RwLock::new(HashMap::new()),
        }
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn find_by_login(&self, field: LoginField, value: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.login_value(field) == Some(value))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.read().await.get(&id).cloned())
    }

    async fn find_by_token(&self, token_digest: &str) -> Result<Option<Account>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts
            .values()
            .find(|a| a.token.as_deref() == Some(token_digest))
            .cloned())
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        let mut accounts = self.accounts.write().await;

        let taken = accounts.values().any(|a| {
            a.email == account.email
                || (account.username.is_some() && a.username == account.username)
        });
        if taken {
            return Err(StoreError::Duplicate);
        }

        let now = Utc::now();
        let record = Account {
            id: Uuid::new_v4(),
            full_name: account.full_name,
            email: account.email,
            username: account.username,
            password_hash: account.password_hash,
            account_active: false,
            token: account.token,
            created_at: now,
            updated_at: now,
        };
        accounts.insert(record.id, record.clone());
        Ok(record)
    }

    async fn activate(&self, id: Uuid) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(a) => {
                a.account_active = true;
                a.token = None;
                a.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_token(&self, id: Uuid, token_digest: &str) -> Result<bool, StoreError> {
        let mut accounts = self.accounts.write().await;
        match accounts.get_mut(&id) {
            Some(a) => {
                a.token = Some(token_digest.to_string());
                a.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<Option<Account>, StoreError> {
        let mut accounts = self.accounts.write().await;
        Ok(accounts.get_mut(&id).map(|a| {
            a.password_hash = password_hash.to_string();
            a.token = None;
            a.updated_at = Utc::now();
            a.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.accounts.write().await.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_account(email: &str, username: Option<&str>) -> NewAccount {
        NewAccount {
            full_name: "Test User".to_string(),
            email: email.to_string(),
            username: username.map(str::to_string),
            password_hash: "hash".to_string(),
            token: Some("digest".to_string()),
        }
    }

    #[tokio::test]
    async fn rejects_duplicate_email_and_username() {
        let store = MemoryAccountStore::new("User");
        store.insert(new_account("a@example.com", Some("ann"))).await.unwrap();

        let dup_email = store.insert(new_account("a@example.com", None)).await;
        assert!(matches!(dup_email, Err(StoreError::Duplicate)));

        let dup_name = store.insert(new_account("b@example.com", Some("ann"))).await;
        assert!(matches!(dup_name, Err(StoreError::Duplicate)));

        // Accounts without a username never collide on it
        store.insert(new_account("c@example.com", None)).await.unwrap();
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn activate_clears_token() {
        let store = MemoryAccountStore::new("User");
        let account = store.insert(new_account("a@example.com", None)).await.unwrap();
        assert!(!account.account_active);

        assert!(store.activate(account.id).await.unwrap());
        let stored = store.find_by_id(account.id).await.unwrap().unwrap();
        assert!(stored.account_active);
        assert!(stored.token.is_none());
        assert!(store.find_by_token("digest").await.unwrap().is_none());

        assert!(!store.activate(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn lookups_by_login_field() {
        let store = MemoryAccountStore::new("Admin");
        store.insert(new_account("root@example.com", Some("root"))).await.unwrap();

        let by_name = store.find_by_login(LoginField::Username, "root").await.unwrap();
        assert_eq!(by_name.map(|a| a.email), Some("root@example.com".to_string()));
        assert!(store
            .find_by_login(LoginField::Email, "nobody@example.com")
            .await
            .unwrap()
            .is_none());
    }
}
