use chrono::{Duration, Utc};
use std::sync::Arc;

use namune::auth::hash_token;
use namune::database::{AccountStore, DatabaseService, PgAccountStore, StoreError};
use namune::models::{LoginField, NewAccount};
use namune::session::{PgSessionStore, SessionRecord, SessionStore};

#[tokio::test]
async fn account_lifecycle_against_postgres() {
    // Skip the test if DATABASE_URL is not set in the environment
    let db_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        }
    };

    let db = Arc::new(DatabaseService::connect_lazy(&db_url, 4).expect("pool"));
    let table = format!("users_it_{}", uuid::Uuid::new_v4().simple());
    let store = PgAccountStore::new(Arc::clone(&db), "User", &table).expect("store");
    store.init_schema().await.expect("init schema");

    let email = "pg@example.com".to_string();
    let created = store
        .insert(NewAccount {
            full_name: "Pg User".into(),
            email: email.clone(),
            username: Some("pguser".into()),
            password_hash: "hash".into(),
            token: Some(hash_token("first")),
        })
        .await
        .expect("insert");
    assert!(!created.account_active);

    let dup = store
        .insert(NewAccount {
            full_name: "Again".into(),
            email: email.clone(),
            username: None,
            password_hash: "hash".into(),
            token: None,
        })
        .await;
    assert!(matches!(dup, Err(StoreError::Duplicate)));

    let by_token = store.find_by_token(&hash_token("first")).await.unwrap().unwrap();
    assert_eq!(by_token.id, created.id);
    assert!(store.activate(created.id).await.unwrap());
    assert!(store.find_by_token(&hash_token("first")).await.unwrap().is_none());

    let by_name = store.find_by_login(LoginField::Username, "pguser").await.unwrap().unwrap();
    assert!(by_name.account_active);

    assert!(store.set_token(created.id, &hash_token("reset")).await.unwrap());
    let updated = store.reset_password(created.id, "new-hash").await.unwrap().unwrap();
    assert_eq!(updated.password_hash, "new-hash");
    assert!(updated.token.is_none());

    assert!(store.delete(created.id).await.unwrap());
    assert!(!store.delete(created.id).await.unwrap());

    let client = db.get_client().await.unwrap();
    client
        .execute(format!("DROP TABLE {}", table).as_str(), &[])
        .await
        .unwrap();
}

#[tokio::test]
async fn sessions_persist_and_expire_in_postgres() {
    let db_url = match std::env::var("DATABASE_URL") {
        Ok(v) => v,
        Err(_) => {
            eprintln!("Skipping test: DATABASE_URL not set");
            return;
        }
    };

    let db = Arc::new(DatabaseService::connect_lazy(&db_url, 4).expect("pool"));
    let store = PgSessionStore::new(db);
    store.init_schema().await.expect("session schema");

    let live = SessionRecord {
        sid: format!("live-{}", uuid::Uuid::new_v4()),
        payload: None,
        expires_at: Utc::now() + Duration::hours(1),
    };
    let stale = SessionRecord {
        sid: format!("stale-{}", uuid::Uuid::new_v4()),
        payload: None,
        expires_at: Utc::now() - Duration::hours(1),
    };
    store.save(&live).await.unwrap();
    store.save(&stale).await.unwrap();

    assert_eq!(store.load(&live.sid).await.unwrap().map(|r| r.sid), Some(live.sid.clone()));
    assert!(store.cleanup_expired().await.unwrap() >= 1);
    assert!(store.load(&stale.sid).await.unwrap().is_none());

    store.destroy(&live.sid).await.unwrap();
    assert!(store.load(&live.sid).await.unwrap().is_none());
}
