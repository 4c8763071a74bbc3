//! # Server Configuration
//!
//! This module contains the server setup and configuration for the tenancy
//! service: shared application state, the router, and the serve loop with
//! graceful shutdown of the tenant connection pool.

use std::sync::Arc;

use axum::{
    Router,
    extract::Request,
    middleware::Next,
    response::Response,
    routing::{delete, get, post, put},
};
use sea_orm::DatabaseConnection;
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::auth::auth_middleware;
use crate::config::AppConfig;
use crate::crypto::CredentialCipher;
use crate::directory::MasterDirectory;
use crate::handlers;
use crate::pool::{SeaOrmConnectionFactory, TenantPool};
use crate::telemetry::{self, TraceContext};
use crate::token::TokenKeys;

/// Application state containing shared resources
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DatabaseConnection,
    pub pool: TenantPool,
    pub cipher: Arc<CredentialCipher>,
    pub token_keys: Arc<TokenKeys>,
}

/// Attach a fresh trace id to every request so errors and logs correlate.
async fn trace_middleware(request: Request, next: Next) -> Response {
    let context = TraceContext::new();
    let trace_id = context.trace_id.clone();

    let mut request = request;
    request.extensions_mut().insert(context.clone());

    telemetry::with_trace_context(context, next.run(request)).await
}

/// Creates and configures the Axum application router
pub fn create_app(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/v1/tenants", post(handlers::tenants::create_tenant))
        .route(
            "/api/v1/tenants/mine",
            get(handlers::tenants::list_my_tenants),
        )
        .route(
            "/api/v1/tenants/{tenant_id}",
            get(handlers::tenants::get_tenant)
                .put(handlers::tenants::update_tenant)
                .delete(handlers::tenants::delete_tenant),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/suspend",
            post(handlers::tenants::suspend_tenant),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/resume",
            post(handlers::tenants::resume_tenant),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/users",
            get(handlers::tenants::list_members).post(handlers::tenants::add_member),
        )
        .route(
            "/api/v1/tenants/{tenant_id}/users/{user_id}",
            put(handlers::tenants::update_member_roles).delete(handlers::tenants::remove_member),
        )
        .route("/api/v1/data", get(handlers::data::get_tenant_data))
        .route(
            "/api/v1/admin/users",
            get(handlers::admin::list_users).post(handlers::admin::create_user),
        )
        .route(
            "/api/v1/admin/users/{user_id}/roles",
            post(handlers::admin::grant_global_role),
        )
        .route(
            "/api/v1/admin/users/{user_id}/roles/{role}",
            delete(handlers::admin::revoke_global_role),
        )
        .layer(axum::middleware::from_fn_with_state(
            Arc::clone(&state.token_keys),
            auth_middleware,
        ));

    Router::new()
        .route("/", get(handlers::root))
        .route("/healthz", get(handlers::healthz))
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(axum::middleware::from_fn(trace_middleware))
        .with_state(state)
        .merge(SwaggerUi::new("/docs").url("/openapi.json", ApiDoc::openapi()))
}

/// Build the application state from configuration and a master database
/// connection. Fails fast when the configured secrets are unusable.
pub fn build_state(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<AppState> {
    let crypto_secret = config
        .crypto_secret
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("crypto secret missing"))?;
    let crypto_salt = config
        .crypto_salt
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("crypto salt missing"))?;
    let jwt_secret = config
        .jwt_secret
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("JWT secret missing"))?;

    // The slow key derivation runs exactly once, here at startup.
    let cipher = Arc::new(CredentialCipher::from_secret(
        crypto_secret,
        crypto_salt.as_bytes(),
    )?);
    let token_keys = Arc::new(TokenKeys::from_secret(jwt_secret));

    let pool = TenantPool::new(
        Arc::new(MasterDirectory::new(db.clone())),
        Arc::clone(&cipher),
        Arc::new(SeaOrmConnectionFactory),
        config.pool.to_pool_config(),
    );

    Ok(AppState {
        config: Arc::new(config),
        db,
        pool,
        cipher,
        token_keys,
    })
}

/// Starts the server with the given configuration
pub async fn run_server(config: AppConfig, db: DatabaseConnection) -> anyhow::Result<()> {
    let addr = config
        .bind_addr()
        .map_err(|e| anyhow::anyhow!("Invalid server address: {}", e))?;
    let profile = config.profile.clone();

    let state = build_state(config, db)?;
    state.pool.start();

    let pool = state.pool.clone();
    let app = create_app(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, profile = %profile, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Every cached tenant connection is closed before the process exits.
    pool.shutdown().await;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}

/// Build an [`AppState`] over a disconnected database, for handler and
/// middleware tests.
pub fn create_test_app_state() -> AppState {
    let config = AppConfig {
        crypto_secret: Some("test-crypto-secret-0123".to_string()),
        crypto_salt: Some("test-salt-16byte".to_string()),
        jwt_secret: Some("test-jwt-secret-0123456789".to_string()),
        ..AppConfig::default()
    };

    build_state(config, DatabaseConnection::default()).expect("test state")
}

/// OpenAPI documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        crate::handlers::root,
        crate::handlers::healthz,
        crate::handlers::auth::register,
        crate::handlers::auth::login,
        crate::handlers::tenants::create_tenant,
        crate::handlers::tenants::list_my_tenants,
        crate::handlers::tenants::get_tenant,
        crate::handlers::tenants::update_tenant,
        crate::handlers::tenants::suspend_tenant,
        crate::handlers::tenants::resume_tenant,
        crate::handlers::tenants::delete_tenant,
        crate::handlers::tenants::list_members,
        crate::handlers::tenants::add_member,
        crate::handlers::tenants::update_member_roles,
        crate::handlers::tenants::remove_member,
        crate::handlers::data::get_tenant_data,
        crate::handlers::admin::list_users,
        crate::handlers::admin::create_user,
        crate::handlers::admin::grant_global_role,
        crate::handlers::admin::revoke_global_role,
    ),
    components(
        schemas(
            crate::models::ServiceInfo,
            crate::handlers::HealthResponse,
            crate::handlers::auth::LoginRequestDto,
            crate::handlers::auth::LoginResponseDto,
            crate::handlers::auth::RegisterRequestDto,
            crate::handlers::auth::RegisterResponseDto,
            crate::handlers::tenants::CreateTenantRequestDto,
            crate::handlers::tenants::UpdateTenantRequestDto,
            crate::handlers::tenants::TenantResponseDto,
            crate::handlers::tenants::MyTenantDto,
            crate::handlers::tenants::AddMemberRequestDto,
            crate::handlers::tenants::UpdateMemberRolesRequestDto,
            crate::handlers::tenants::MemberDto,
            crate::handlers::data::TenantDataResponseDto,
            crate::handlers::admin::CreateUserRequestDto,
            crate::handlers::admin::GrantRoleRequestDto,
            crate::handlers::admin::UserResponseDto,
        )
    ),
    info(
        title = "Tenancy API",
        description = "Multi-tenant backend core: tenant directory, pooled tenant database connections, and two-level authorization",
        version = env!("CARGO_PKG_VERSION"),
    )
)]
pub struct ApiDoc;
