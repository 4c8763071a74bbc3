//! End-to-end tests for authentication, tenant lifecycle and membership.

use anyhow::Result;
use reqwest::StatusCode;
use serde_json::{Value, json};

#[path = "test_utils/mod.rs"]
mod test_utils;
use test_utils::{login, seed_user, spawn_test_app};

#[tokio::test]
async fn login_rejects_bad_credentials_uniformly() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "admin@example.com", "correct password", &["admin"]).await?;
    let client = reqwest::Client::new();

    let unknown_email = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "nobody@example.com", "password": "whatever" }))
        .send()
        .await?;
    let wrong_password = client
        .post(format!("{}/auth/login", base))
        .json(&json!({ "email": "admin@example.com", "password": "wrong" }))
        .send()
        .await?;

    assert_eq!(unknown_email.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password.status(), StatusCode::UNAUTHORIZED);

    // Both failures read identically; account existence is not leaked.
    let body_a: Value = unknown_email.json().await?;
    let body_b: Value = wrong_password.json().await?;
    assert_eq!(body_a["message"], body_b["message"]);

    Ok(())
}

#[tokio::test]
async fn registration_creates_an_account_without_roles() -> Result<()> {
    let (base, _db, _server) = spawn_test_app().await?;
    let client = reqwest::Client::new();

    let registered = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "New@Example.com", "password": "password123" }))
        .send()
        .await?;
    assert_eq!(registered.status(), StatusCode::CREATED);
    let body: Value = registered.json().await?;
    assert_eq!(body["email"], "new@example.com");

    let duplicate = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "new@example.com", "password": "password123" }))
        .send()
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let short_password = client
        .post(format!("{}/auth/register", base))
        .json(&json!({ "email": "other@example.com", "password": "short" }))
        .send()
        .await?;
    assert_eq!(short_password.status(), StatusCode::BAD_REQUEST);

    // The new account can log in but carries no roles or grants.
    let token = login(&client, &base, "new@example.com", "password123").await?;
    let mine = client
        .get(format!("{}/api/v1/tenants/mine", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(mine.status(), StatusCode::OK);
    let body: Value = mine.json().await?;
    assert_eq!(body, json!([]));

    Ok(())
}

#[tokio::test]
async fn protected_routes_require_a_token() -> Result<()> {
    let (base, _db, _server) = spawn_test_app().await?;
    let client = reqwest::Client::new();

    let no_token = client
        .get(format!("{}/api/v1/tenants/mine", base))
        .send()
        .await?;
    assert_eq!(no_token.status(), StatusCode::UNAUTHORIZED);

    let garbage = client
        .get(format!("{}/api/v1/tenants/mine", base))
        .header("Authorization", "Bearer not-a-token")
        .send()
        .await?;
    assert_eq!(garbage.status(), StatusCode::UNAUTHORIZED);
    let body: Value = garbage.json().await?;
    assert_eq!(body["code"], "TOKEN_MALFORMED");

    Ok(())
}

#[tokio::test]
async fn tenant_creation_requires_global_admin() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "user@example.com", "password123", &[]).await?;
    let client = reqwest::Client::new();
    let token = login(&client, &base, "user@example.com", "password123").await?;

    let response = client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Corp",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "FORBIDDEN");

    Ok(())
}

#[tokio::test]
async fn tenant_lifecycle_transitions() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "admin@example.com", "password123", &["admin"]).await?;
    let client = reqwest::Client::new();
    let token = login(&client, &base, "admin@example.com", "password123").await?;

    let created = client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Corp",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await?;
    assert_eq!(body["tenant_id"], "acme");
    assert_eq!(body["status"], "active");

    // A duplicate identifier is a conflict, not a second tenant.
    let duplicate = client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Again",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;
    assert_eq!(duplicate.status(), StatusCode::CONFLICT);

    let renamed = client
        .put(format!("{}/api/v1/tenants/acme", base))
        .bearer_auth(&token)
        .json(&json!({ "name": "Acme Corporation" }))
        .send()
        .await?;
    assert_eq!(renamed.status(), StatusCode::OK);
    let body: Value = renamed.json().await?;
    assert_eq!(body["name"], "Acme Corporation");
    assert_eq!(body["tenant_id"], "acme");

    let suspended = client
        .post(format!("{}/api/v1/tenants/acme/suspend", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(suspended.status(), StatusCode::OK);
    let body: Value = suspended.json().await?;
    assert_eq!(body["status"], "suspended");

    let suspend_again = client
        .post(format!("{}/api/v1/tenants/acme/suspend", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(suspend_again.status(), StatusCode::CONFLICT);

    let resumed = client
        .post(format!("{}/api/v1/tenants/acme/resume", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(resumed.status(), StatusCode::OK);
    let body: Value = resumed.json().await?;
    assert_eq!(body["status"], "active");

    let deleted = client
        .delete(format!("{}/api/v1/tenants/acme", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(deleted.status(), StatusCode::NO_CONTENT);

    let gone = client
        .get(format!("{}/api/v1/tenants/acme", base))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);

    Ok(())
}

#[tokio::test]
async fn membership_gates_tenant_data_access() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "admin@example.com", "password123", &["admin"]).await?;
    seed_user(&db, "member@example.com", "password123", &[]).await?;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &base, "admin@example.com", "password123").await?;

    let created = client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&admin_token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Corp",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);

    // Before membership exists, the data endpoint refuses the caller
    // without revealing whether the tenant exists.
    let member_token = login(&client, &base, "member@example.com", "password123").await?;
    let refused = client
        .get(format!("{}/api/v1/data", base))
        .bearer_auth(&member_token)
        .header("X-Tenant-Id", "acme")
        .send()
        .await?;
    assert_eq!(refused.status(), StatusCode::FORBIDDEN);
    let body: Value = refused.json().await?;
    assert_eq!(body["code"], "TENANT_ACCESS_DENIED");

    let added = client
        .post(format!("{}/api/v1/tenants/acme/users", base))
        .bearer_auth(&admin_token)
        .json(&json!({ "email": "member@example.com", "roles": ["member"] }))
        .send()
        .await?;
    assert_eq!(added.status(), StatusCode::CREATED);

    // Grants are captured at login, so a fresh token is needed.
    let member_token = login(&client, &base, "member@example.com", "password123").await?;
    let data = client
        .get(format!("{}/api/v1/data", base))
        .bearer_auth(&member_token)
        .header("X-Tenant-Id", "acme")
        .send()
        .await?;
    assert_eq!(data.status(), StatusCode::OK);
    let body: Value = data.json().await?;
    assert_eq!(body["tenant_id"], "acme");
    assert_eq!(body["database"], "ok");

    // The tenant id can also be supplied as a query parameter.
    let data = client
        .get(format!("{}/api/v1/data?tenant_id=acme", base))
        .bearer_auth(&member_token)
        .send()
        .await?;
    assert_eq!(data.status(), StatusCode::OK);

    let mine = client
        .get(format!("{}/api/v1/tenants/mine", base))
        .bearer_auth(&member_token)
        .send()
        .await?;
    assert_eq!(mine.status(), StatusCode::OK);
    let body: Value = mine.json().await?;
    assert_eq!(body[0]["tenant_id"], "acme");
    assert_eq!(body[0]["roles"][0], "member");

    Ok(())
}

#[tokio::test]
async fn suspended_tenant_is_unavailable_to_members() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "admin@example.com", "password123", &["admin"]).await?;
    seed_user(&db, "member@example.com", "password123", &[]).await?;
    let client = reqwest::Client::new();
    let admin_token = login(&client, &base, "admin@example.com", "password123").await?;

    client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&admin_token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Corp",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;
    client
        .post(format!("{}/api/v1/tenants/acme/users", base))
        .bearer_auth(&admin_token)
        .json(&json!({ "email": "member@example.com", "roles": ["member"] }))
        .send()
        .await?;
    client
        .post(format!("{}/api/v1/tenants/acme/suspend", base))
        .bearer_auth(&admin_token)
        .send()
        .await?;

    let member_token = login(&client, &base, "member@example.com", "password123").await?;
    let response = client
        .get(format!("{}/api/v1/data", base))
        .bearer_auth(&member_token)
        .header("X-Tenant-Id", "acme")
        .send()
        .await?;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = response.json().await?;
    assert_eq!(body["code"], "TENANT_UNAVAILABLE");

    Ok(())
}

#[tokio::test]
async fn admins_cannot_act_on_themselves() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    let admin_id = seed_user(
        &db,
        "admin@example.com",
        "password123",
        &["admin", "superadmin"],
    )
    .await?;
    let client = reqwest::Client::new();
    let token = login(&client, &base, "admin@example.com", "password123").await?;

    client
        .post(format!("{}/api/v1/tenants", base))
        .bearer_auth(&token)
        .json(&json!({
            "tenant_id": "acme",
            "name": "Acme Corp",
            "connection_string": "sqlite::memory:"
        }))
        .send()
        .await?;
    client
        .post(format!("{}/api/v1/tenants/acme/users", base))
        .bearer_auth(&token)
        .json(&json!({ "email": "admin@example.com", "roles": ["admin"] }))
        .send()
        .await?;

    let self_removal = client
        .delete(format!("{}/api/v1/tenants/acme/users/{}", base, admin_id))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(self_removal.status(), StatusCode::FORBIDDEN);

    let self_demotion = client
        .put(format!("{}/api/v1/tenants/acme/users/{}", base, admin_id))
        .bearer_auth(&token)
        .json(&json!({ "roles": ["member"] }))
        .send()
        .await?;
    assert_eq!(self_demotion.status(), StatusCode::FORBIDDEN);

    let self_revocation = client
        .delete(format!(
            "{}/api/v1/admin/users/{}/roles/superadmin",
            base, admin_id
        ))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(self_revocation.status(), StatusCode::FORBIDDEN);

    Ok(())
}

#[tokio::test]
async fn superadmin_manages_users_and_roles() -> Result<()> {
    let (base, db, _server) = spawn_test_app().await?;
    seed_user(&db, "root@example.com", "password123", &["superadmin"]).await?;
    let client = reqwest::Client::new();
    let token = login(&client, &base, "root@example.com", "password123").await?;

    let created = client
        .post(format!("{}/api/v1/admin/users", base))
        .bearer_auth(&token)
        .json(&json!({ "email": "new@example.com", "password": "password123" }))
        .send()
        .await?;
    assert_eq!(created.status(), StatusCode::CREATED);
    let body: Value = created.json().await?;
    let new_user_id = body["id"].as_str().unwrap().to_string();
    assert_eq!(body["global_roles"], json!([]));

    let granted = client
        .post(format!("{}/api/v1/admin/users/{}/roles", base, new_user_id))
        .bearer_auth(&token)
        .json(&json!({ "role": "admin" }))
        .send()
        .await?;
    assert_eq!(granted.status(), StatusCode::OK);
    let body: Value = granted.json().await?;
    assert_eq!(body["global_roles"], json!(["admin"]));

    let revoked = client
        .delete(format!(
            "{}/api/v1/admin/users/{}/roles/admin",
            base, new_user_id
        ))
        .bearer_auth(&token)
        .send()
        .await?;
    assert_eq!(revoked.status(), StatusCode::OK);
    let body: Value = revoked.json().await?;
    assert_eq!(body["global_roles"], json!([]));

    // The new credentials work end to end.
    login(&client, &base, "new@example.com", "password123").await?;

    Ok(())
}
