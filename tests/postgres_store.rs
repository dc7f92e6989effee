use chrono::{Duration, Utc};
use sqlx::{Connection, Executor, PgConnection, PgPool};
use std::sync::Arc;
use token_gate::auth::{AuthServices, RefreshToken, TokenSubject};
use token_gate::configuration::{get_configuration, DatabaseSettings};
use token_gate::error::{AppError, AuthError, StoreError};
use token_gate::identity::{roles, IdentityProvider, PgIdentityStore, User, MIN_HASH_COST};
use token_gate::startup::build_services;
use token_gate::store::{PgRefreshTokenStore, RefreshTokenStore};
use uuid::Uuid;

pub struct TestDb {
    pub pool: PgPool,
    pub alice: User,
}

async fn spawn_db() -> TestDb {
    let mut configuration = get_configuration().expect("Failed to read configuration.");
    configuration.database.database_name = Uuid::new_v4().to_string();
    let pool = configure_database(&configuration.database).await;

    let alice = User {
        id: Uuid::new_v4(),
        username: "alice".to_string(),
        email: "Alice@Example.com".to_string(),
    };
    let password_hash = bcrypt::hash("correct-pw", MIN_HASH_COST).expect("Failed to hash password");
    sqlx::query("INSERT INTO users (id, username, email, password_hash) VALUES ($1, $2, $3, $4)")
        .bind(alice.id)
        .bind(&alice.username)
        .bind(&alice.email)
        .bind(password_hash)
        .execute(&pool)
        .await
        .expect("Failed to seed user");
    for role in [roles::USER, roles::ADMIN] {
        sqlx::query("INSERT INTO user_roles (user_id, role) VALUES ($1, $2)")
            .bind(alice.id)
            .bind(role)
            .execute(&pool)
            .await
            .expect("Failed to seed role");
    }

    TestDb { pool, alice }
}

pub async fn configure_database(config: &DatabaseSettings) -> PgPool {
    // Create database
    let mut connection = PgConnection::connect(&config.connection_string_without_db())
        .await
        .expect("Failed to connect to Postgres");
    connection
        .execute(&*format!(r#"CREATE DATABASE "{}";"#, config.database_name))
        .await
        .expect("Failed to create database.");
    // Migrate database
    let connection_pool = PgPool::connect(&config.connection_string())
        .await
        .expect("Failed to connect to Postgres.");
    sqlx::migrate!("./migrations")
        .run(&connection_pool)
        .await
        .expect("Failed to migrate the database.");
    connection_pool
}

fn active_record(user_id: Uuid) -> (RefreshToken, String) {
    RefreshToken::issue(user_id, "jti".to_string(), Utc::now() + Duration::days(1))
}

async fn count_records(pool: &PgPool, user_id: Uuid) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM refresh_tokens WHERE user_id = $1")
        .bind(user_id)
        .fetch_one(pool)
        .await
        .expect("Failed to count refresh tokens")
}

// --- Refresh token store ---

#[tokio::test]
async fn store_creates_finds_and_revokes() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (record, secret) = active_record(db.alice.id);

    let id = store.create(&record).await.expect("Failed to create record");

    assert_eq!(id, record.id);
    let found = store.find_by_token(&secret).await.unwrap().expect("Record not found by secret");
    assert_eq!(found.id, record.id);
    assert_eq!(found.user_id, db.alice.id);
    assert_eq!(found.jwt_id.as_deref(), Some("jti"));
    assert!(!found.is_revoked);
    assert!(store.find_by_id(record.id).await.unwrap().is_some());
    assert!(store.find_by_token("unknown").await.unwrap().is_none());

    store.revoke(record.id).await.unwrap();
    store.revoke(record.id).await.unwrap();
    store.revoke(Uuid::new_v4()).await.unwrap();
    assert!(store.find_by_id(record.id).await.unwrap().unwrap().is_revoked);
}

#[tokio::test]
async fn store_keeps_only_the_secret_hash() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (record, secret) = active_record(db.alice.id);
    store.create(&record).await.unwrap();

    let stored: String =
        sqlx::query_scalar("SELECT token_hash FROM refresh_tokens WHERE id = $1")
            .bind(record.id)
            .fetch_one(&db.pool)
            .await
            .unwrap();

    assert_ne!(stored, secret);
    assert_eq!(stored, token_gate::auth::hash_token(&secret));
    assert!(store.find_by_token(&stored).await.unwrap().is_none());
}

#[tokio::test]
async fn revoke_if_active_succeeds_once() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (record, _) = active_record(db.alice.id);
    store.create(&record).await.unwrap();

    assert!(store.revoke_if_active(record.id).await.unwrap());
    assert!(!store.revoke_if_active(record.id).await.unwrap());
    assert!(!store.revoke_if_active(Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn duplicate_secret_is_a_conflict() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (first, _) = active_record(db.alice.id);
    let (mut second, _) = active_record(db.alice.id);
    second.token_hash = first.token_hash.clone();

    store.create(&first).await.unwrap();
    let result = store.create(&second).await;

    assert!(matches!(result, Err(AppError::Store(StoreError::Conflict(_)))));
    assert_eq!(count_records(&db.pool, db.alice.id).await, 1);
}

#[tokio::test]
async fn replace_revokes_and_inserts_together() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (stale, _) = active_record(db.alice.id);
    let (fresh, fresh_secret) = active_record(db.alice.id);
    store.create(&stale).await.unwrap();

    assert!(store.replace(stale.id, &fresh).await.unwrap());
    assert!(store.find_by_id(stale.id).await.unwrap().unwrap().is_revoked);
    assert!(store.find_by_token(&fresh_secret).await.unwrap().is_some());

    // The stale record is spent; a second replacement writes nothing
    let (another, _) = active_record(db.alice.id);
    assert!(!store.replace(stale.id, &another).await.unwrap());
    assert!(store.find_by_id(another.id).await.unwrap().is_none());
    assert_eq!(count_records(&db.pool, db.alice.id).await, 2);
}

#[tokio::test]
async fn failed_replace_rolls_back_revocation() {
    let db = spawn_db().await;
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (stale, stale_secret) = active_record(db.alice.id);
    let (mut clash, _) = active_record(db.alice.id);
    clash.token_hash = stale.token_hash.clone();
    store.create(&stale).await.unwrap();

    let result = store.replace(stale.id, &clash).await;

    assert!(matches!(result, Err(AppError::Store(StoreError::Conflict(_)))));
    let kept = store.find_by_token(&stale_secret).await.unwrap().unwrap();
    assert!(!kept.is_revoked);
}

// --- Identity ---

#[tokio::test]
async fn identity_lookup_ignores_email_case() {
    let db = spawn_db().await;
    let identity = PgIdentityStore::new(db.pool.clone());

    let by_email = identity
        .find_user_by_email("alice@example.com")
        .await
        .unwrap()
        .expect("User not found by lowercase email");
    assert_eq!(by_email, db.alice);
    assert_eq!(identity.find_user_by_id(db.alice.id).await.unwrap(), Some(db.alice.clone()));
    assert!(identity.find_user_by_email("bob@example.com").await.unwrap().is_none());
    assert!(identity.find_user_by_id(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn identity_checks_password_and_reads_roles() {
    let db = spawn_db().await;
    let identity = PgIdentityStore::new(db.pool.clone());

    assert!(identity.check_password(&db.alice, "correct-pw").await.unwrap());
    assert!(!identity.check_password(&db.alice, "wrong-pw").await.unwrap());
    assert_eq!(
        identity.get_roles(&db.alice).await.unwrap(),
        vec!["Admin".to_string(), "User".to_string()]
    );
}

// --- Rotation over Postgres ---

fn services(db: &TestDb) -> AuthServices {
    let configuration = get_configuration().expect("Failed to read configuration.");
    build_services(db.pool.clone(), &configuration.jwt).expect("Invalid JWT settings")
}

fn expired_access_token(services: &AuthServices, user: &User) -> String {
    let subject = TokenSubject {
        user_id: user.id,
        username: user.username.clone(),
        email: user.email.clone(),
        roles: vec![roles::USER.to_string()],
    };
    services
        .signer
        .sign(&subject, Duration::zero())
        .expect("Failed to sign token")
        .token
}

#[tokio::test]
async fn login_then_refresh_keeps_refresh_token() {
    let db = spawn_db().await;
    let services = services(&db);

    let login = services.issuer.login("alice@example.com", "correct-pw").await.unwrap();
    let rotated = services
        .coordinator
        .rotate(&login.token, &login.refresh_token)
        .await
        .unwrap();

    assert_eq!(rotated.refresh_token, login.refresh_token);
    assert_eq!(count_records(&db.pool, db.alice.id).await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_rotations_replace_stale_record_once() {
    let db = spawn_db().await;
    let services = services(&db);
    let store = PgRefreshTokenStore::new(db.pool.clone());
    let (mut stale, stale_secret) =
        RefreshToken::issue(db.alice.id, "old-jti".to_string(), Utc::now() - Duration::days(1));
    stale.date_added = Utc::now() - Duration::days(200);
    store.create(&stale).await.unwrap();
    let access = expired_access_token(&services, &db.alice);

    let barrier = Arc::new(tokio::sync::Barrier::new(2));
    let spawn_rotation = || {
        let coordinator = services.coordinator.clone();
        let barrier = barrier.clone();
        let access = access.clone();
        let refresh = stale_secret.clone();
        tokio::spawn(async move {
            barrier.wait().await;
            coordinator.rotate(&access, &refresh).await
        })
    };
    let first = spawn_rotation();
    let second = spawn_rotation();
    let (first, second) = tokio::join!(first, second);
    let results = [first.unwrap(), second.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(AppError::Auth(AuthError::InvalidRefreshToken)))));
    assert_eq!(count_records(&db.pool, db.alice.id).await, 2);
    assert!(store.find_by_id(stale.id).await.unwrap().unwrap().is_revoked);
}
