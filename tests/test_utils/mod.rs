//! Test utilities for API and database testing.
//!
//! Sets up in-memory SQLite databases with migrations applied and spawns the
//! full application on an ephemeral port.

use anyhow::{Context, Result};
use migration::{Migrator, MigratorTrait};
use sea_orm::{Database, DatabaseConnection};
use tenancy::config::AppConfig;
use tenancy::repositories::UserRepository;
use tenancy::server::{build_state, create_app};
use tokio::{net::TcpListener, sync::oneshot, task::JoinHandle};
use uuid::Uuid;

/// Sets up an in-memory SQLite database with all migrations applied.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = Database::connect("sqlite::memory:").await?;
    Migrator::up(&db, None).await?;
    Ok(db)
}

/// Configuration for a test server, with usable secrets.
pub fn test_app_config() -> AppConfig {
    AppConfig {
        crypto_secret: Some("integration-test-secret".to_string()),
        crypto_salt: Some("integration-salt".to_string()),
        jwt_secret: Some("integration-test-jwt-secret".to_string()),
        ..AppConfig::default()
    }
}

pub struct TestServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    join_handle: Option<JoinHandle<Result<()>>>,
}

impl TestServerHandle {
    fn new(shutdown_tx: oneshot::Sender<()>, join_handle: JoinHandle<Result<()>>) -> Self {
        Self {
            shutdown_tx: Some(shutdown_tx),
            join_handle: Some(join_handle),
        }
    }

    #[allow(dead_code)]
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(handle) = self.join_handle.take() {
            handle.await.context("server task join failed")??;
        }

        Ok(())
    }
}

impl Drop for TestServerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

/// Spawns the application over a fresh in-memory master database.
pub async fn spawn_test_app() -> Result<(String, DatabaseConnection, TestServerHandle)> {
    let db = setup_test_db().await?;
    let state = build_state(test_app_config(), db.clone())?;
    let app = create_app(state);

    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let base_url = format!("http://{}", addr);

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let join_handle = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .context("server error")
    });

    Ok((
        base_url,
        db,
        TestServerHandle::new(shutdown_tx, join_handle),
    ))
}

/// Inserts a user through the repository and returns the user id.
pub async fn seed_user(
    db: &DatabaseConnection,
    email: &str,
    password: &str,
    global_roles: &[&str],
) -> Result<Uuid> {
    let user = UserRepository::new(db)
        .create_user(
            email,
            password,
            global_roles.iter().map(|r| r.to_string()).collect(),
        )
        .await?;
    Ok(user.id)
}

/// Logs in and returns the bearer token.
pub async fn login(
    client: &reqwest::Client,
    base_url: &str,
    email: &str,
    password: &str,
) -> Result<String> {
    let response = client
        .post(format!("{}/auth/login", base_url))
        .json(&serde_json::json!({ "email": email, "password": password }))
        .send()
        .await?;
    anyhow::ensure!(
        response.status().is_success(),
        "login failed with status {}",
        response.status()
    );

    let body: serde_json::Value = response.json().await?;
    body["token"]
        .as_str()
        .map(|t| t.to_string())
        .context("login response had no token")
}
