mod common;

use axum::http::StatusCode;
use common::{spawn_app, TestApp};
use serde_json::json;

async fn seed_superadmin(app: &TestApp) -> String {
    app.seed_user("root@example.com", "Sup3r!Secret!Pw", "superadmin")
        .await;
    app.login_access_token("root@example.com", "Sup3r!Secret!Pw")
        .await
}

#[tokio::test]
async fn test_invite_register_login_round_trip() {
    let app = spawn_app();
    let admin_token = seed_superadmin(&app).await;

    // Superadmin mints an invite.
    let (status, body) = app
        .post_json_auth(
            "/admin/invite",
            &admin_token,
            json!({ "email": "new.hire@example.com", "role": "employee" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    let invite_token = body["invite_token"].as_str().expect("invite token").to_string();

    // The new hire registers with the invite.
    let (status, body) = app
        .post_json(
            "/auth/register",
            json!({
                "email": "new.hire@example.com",
                "password": "Str0ng!Passw0rd",
                "invite_token": invite_token,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    assert_eq!(body["user"]["role"], "employee");

    // And logs in.
    let login = app.login("new.hire@example.com", "Str0ng!Passw0rd").await;
    assert_eq!(login["mfa_required"], false);
    let access = login["access_token"].as_str().unwrap().to_string();
    let refresh = login["refresh_token"].as_str().unwrap().to_string();
    assert_eq!(login["token_type"], "bearer");

    // Access token works against the introspection route.
    let (status, body) = app.get_auth("/auth/validate", &access).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], true);
    assert_eq!(body["user"]["email"], "new.hire@example.com");

    // Refresh yields a fresh access token.
    let (status, body) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    let new_access = body["access_token"].as_str().unwrap().to_string();
    let (status, _) = app.get_auth("/auth/validate", &new_access).await;
    assert_eq!(status, StatusCode::OK);

    // Logout revokes the presented token and kills the refresh slot.
    let (status, _) = app
        .request("POST", "/auth/logout", Some(&access), None)
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.get_auth("/auth/validate", &access).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_register_rejects_unknown_invite() {
    let app = spawn_app();

    let (status, body) = app
        .post_json(
            "/auth/register",
            json!({
                "email": "stranger@example.com",
                "password": "Str0ng!Passw0rd",
                "invite_token": "0".repeat(64),
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Invalid invite token or email");
}

#[tokio::test]
async fn test_invite_is_bound_to_email() {
    let app = spawn_app();
    let admin_token = seed_superadmin(&app).await;

    let (_, body) = app
        .post_json_auth(
            "/admin/invite",
            &admin_token,
            json!({ "email": "alice@example.com", "role": "employee" }),
        )
        .await;
    let invite_token = body["invite_token"].as_str().unwrap().to_string();

    let (status, _) = app
        .post_json(
            "/auth/register",
            json!({
                "email": "mallory@example.com",
                "password": "Str0ng!Passw0rd",
                "invite_token": invite_token,
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_login_failures_are_indistinguishable() {
    let app = spawn_app();
    app.seed_user("user@example.com", "Str0ng!Passw0rd", "employee")
        .await;

    let (wrong_pw_status, wrong_pw_body) = app
        .post_json(
            "/auth/login",
            json!({ "email": "user@example.com", "password": "not-the-password" }),
        )
        .await;
    let (no_user_status, no_user_body) = app
        .post_json(
            "/auth/login",
            json!({ "email": "ghost@example.com", "password": "not-the-password" }),
        )
        .await;

    assert_eq!(wrong_pw_status, StatusCode::UNAUTHORIZED);
    assert_eq!(no_user_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_pw_body["error"], no_user_body["error"]);
}

#[tokio::test]
async fn test_refresh_rejects_access_token() {
    let app = spawn_app();
    app.seed_user("user@example.com", "Str0ng!Passw0rd", "employee")
        .await;

    let access = app
        .login_access_token("user@example.com", "Str0ng!Passw0rd")
        .await;
    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": access }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_second_login_rotates_refresh_token() {
    let app = spawn_app();
    app.seed_user("user@example.com", "Str0ng!Passw0rd", "employee")
        .await;

    let first = app.login("user@example.com", "Str0ng!Passw0rd").await;
    let first_refresh = first["refresh_token"].as_str().unwrap().to_string();

    app.login("user@example.com", "Str0ng!Passw0rd").await;

    let (status, _) = app
        .post_json("/auth/refresh", json!({ "refresh_token": first_refresh }))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_requires_bearer() {
    let app = spawn_app();

    let (status, _) = app.request("GET", "/auth/validate", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app.get_auth("/auth/validate", "garbage-token").await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_health_endpoint() {
    let app = spawn_app();

    let (status, body) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    app.ledger.set_unavailable(true);
    let (status, _) = app.request("GET", "/health", None, None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}
