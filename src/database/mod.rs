use async_trait::async_trait;
use chrono::Utc;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;
use uuid::Uuid;

use crate::models::{Account, LoginField, NewAccount};

pub mod memory;

pub use memory::MemoryAccountStore;

/// Database connection pool
pub type DbPool = Pool;

/// Errors raised by account and session stores
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("invalid table name \"{0}\"")]
    InvalidTable(String),
    #[error("failed to create connection pool: {0}")]
    Pool(String),
    #[error("database error: {0}")]
    Database(#[from] tokio_postgres::Error),
    #[error("connection error: {0}")]
    Connection(#[from] deadpool_postgres::PoolError),
}

impl StoreError {
    fn from_query(err: tokio_postgres::Error) -> Self {
        if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            StoreError::Duplicate
        } else {
            StoreError::Database(err)
        }
    }
}

/// Persistence for one account model. Each local strategy is bound to one store.
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Model name used in messages, e.g. "User"
    fn model_name(&self) -> &str;

    async fn find_by_login(&self, field: LoginField, value: &str) -> Result<Option<Account>, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError>;

    async fn find_by_token(&self, token_digest: &str) -> Result<Option<Account>, StoreError>;

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError>;

    /// Mark the account active and clear its token. Returns whether a record matched.
    async fn activate(&self, id: Uuid) -> Result<bool, StoreError>;

    /// Store a token digest. Returns whether a record matched.
    async fn set_token(&self, id: Uuid, token_digest: &str) -> Result<bool, StoreError>;

    /// Replace the credential hash and clear the token.
    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<Option<Account>, StoreError>;

    /// Returns whether a record was deleted.
    async fn delete(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Database service
pub struct DatabaseService {
    pool: DbPool,
    uri: String,
}

impl DatabaseService {
    /// Build a connection pool for `uri`. Connections are opened on first use.
    pub fn connect_lazy(uri: &str, max_connections: usize) -> Result<Self, StoreError> {
        let mut cfg = Config::new();
        cfg.url = Some(uri.to_string());
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });
        cfg.pool = Some(PoolConfig::new(max_connections.max(1)));

        let pool = cfg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| StoreError::Pool(e.to_string()))?;

        Ok(Self {
            pool,
            uri: uri.to_string(),
        })
    }

    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Get a database client from the pool
    pub async fn get_client(&self) -> Result<deadpool_postgres::Client, StoreError> {
        Ok(self.pool.get().await?)
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<(), StoreError> {
        let client = self.get_client().await?;
        client.execute("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Create the sessions table and its expiry index
    pub async fn init_session_schema(&self) -> Result<(), StoreError> {
        let client = self.get_client().await?;

        client.execute("\
            CREATE TABLE IF NOT EXISTS sessions (\
                sid VARCHAR(128) PRIMARY KEY,\
                user_id UUID,\
                strategy VARCHAR(100),\
                expires_at TIMESTAMPTZ NOT NULL,\
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
            )\
        ", &[]).await?;
        client.execute("CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at)", &[]).await?;

        log::info!("Session schema initialized");
        Ok(())
    }
}

/// Only plain identifiers may be spliced into SQL as table names
pub fn validate_table_name(name: &str) -> Result<(), StoreError> {
    let valid = !name.is_empty()
        && name.len() <= 63
        && name.chars().next().is_some_and(|c| c.is_ascii_lowercase() || c == '_')
        && name.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidTable(name.to_string()))
    }
}

const ACCOUNT_COLUMNS: &str =
    "id, full_name, email, username, password_hash, account_active, token, created_at, updated_at";

/// Account model backed by one Postgres table
pub struct PgAccountStore {
    db: std::sync::Arc<DatabaseService>,
    table: String,
    model_name: String,
}

impl PgAccountStore {
    pub fn new(
        db: std::sync::Arc<DatabaseService>,
        model_name: &str,
        table: &str,
    ) -> Result<Self, StoreError> {
        validate_table_name(table)?;
        Ok(Self {
            db,
            table: table.to_string(),
            model_name: model_name.to_string(),
        })
    }

    /// Create the model table if missing
    pub async fn init_schema(&self) -> Result<(), StoreError> {
        let client = self.db.get_client().await?;

        if let Err(err) = client.execute("CREATE EXTENSION IF NOT EXISTS pgcrypto", &[]).await {
            log::warn!("Could not enable pgcrypto: {}", err);
        }

        let create_table = format!("\
            CREATE TABLE IF NOT EXISTS {t} (\
                id UUID PRIMARY KEY DEFAULT gen_random_uuid(),\
                full_name VARCHAR(255) NOT NULL,\
                email VARCHAR(255) UNIQUE NOT NULL,\
                username VARCHAR(50) UNIQUE,\
                password_hash VARCHAR(255) NOT NULL,\
                account_active BOOLEAN NOT NULL DEFAULT false,\
                token VARCHAR(128),\
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),\
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()\
            )", t = self.table);
        client.execute(create_table.as_str(), &[]).await?;

        let create_index = format!("CREATE INDEX IF NOT EXISTS idx_{t}_token ON {t}(token)", t = self.table);
        client.execute(create_index.as_str(), &[]).await?;

        log::info!("Schema ensured for model {} (table {})", self.model_name, self.table);
        Ok(())
    }

    async fn query_one_opt(
        &self,
        sql: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Option<Account>, StoreError> {
        let client = self.db.get_client().await?;
        let row = client.query_opt(sql, params).await?;
        Ok(row.as_ref().map(Self::row_to_account))
    }

    /// Helper to convert database row to Account
    fn row_to_account(row: &tokio_postgres::Row) -> Account {
        Account {
            id: row.get(0),
            full_name: row.get(1),
            email: row.get(2),
            username: row.get(3),
            password_hash: row.get(4),
            account_active: row.get(5),
            token: row.get(6),
            created_at: row.get(7),
            updated_at: row.get(8),
        }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    fn model_name(&self) -> &str {
        &self.model_name
    }

    async fn find_by_login(&self, field: LoginField, value: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = $1",
            ACCOUNT_COLUMNS,
            self.table,
            field.as_str()
        );
        self.query_one_opt(&sql, &[&value]).await
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE id = $1", ACCOUNT_COLUMNS, self.table);
        self.query_one_opt(&sql, &[&id]).await
    }

    async fn find_by_token(&self, token_digest: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {} FROM {} WHERE token = $1", ACCOUNT_COLUMNS, self.table);
        self.query_one_opt(&sql, &[&token_digest]).await
    }

    async fn insert(&self, account: NewAccount) -> Result<Account, StoreError> {
        let client = self.db.get_client().await?;
        let sql = format!(
            "INSERT INTO {} (full_name, email, username, password_hash, token) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {}",
            self.table, ACCOUNT_COLUMNS
        );
        let row = client
            .query_one(
                sql.as_str(),
                &[
                    &account.full_name,
                    &account.email,
                    &account.username,
                    &account.password_hash,
                    &account.token,
                ],
            )
            .await
            .map_err(StoreError::from_query)?;

        Ok(Self::row_to_account(&row))
    }

    async fn activate(&self, id: Uuid) -> Result<bool, StoreError> {
        let client = self.db.get_client().await?;
        let sql = format!(
            "UPDATE {} SET account_active = true, token = NULL, updated_at = NOW() WHERE id = $1",
            self.table
        );
        Ok(client.execute(sql.as_str(), &[&id]).await? > 0)
    }

    async fn set_token(&self, id: Uuid, token_digest: &str) -> Result<bool, StoreError> {
        let client = self.db.get_client().await?;
        let sql = format!(
            "UPDATE {} SET token = $2, updated_at = NOW() WHERE id = $1",
            self.table
        );
        Ok(client.execute(sql.as_str(), &[&id, &token_digest]).await? > 0)
    }

    async fn reset_password(&self, id: Uuid, password_hash: &str) -> Result<Option<Account>, StoreError> {
        let sql = format!(
            "UPDATE {} SET password_hash = $2, token = NULL, updated_at = $3 WHERE id = $1 RETURNING {}",
            self.table, ACCOUNT_COLUMNS
        );
        self.query_one_opt(&sql, &[&id, &password_hash, &Utc::now()]).await
    }

    async fn delete(&self, id: Uuid) -> Result<bool, StoreError> {
        let client = self.db.get_client().await?;
        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        Ok(client.execute(sql.as_str(), &[&id]).await? > 0)
    }
}
