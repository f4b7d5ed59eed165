use demo_app::build_app;
use demo_app::models::UserView;
use mitsuki::config::ConfigStore;
use mitsuki::http::StatusCode;
use mitsuki_test::TestApp;

async fn test_app() -> TestApp {
    let config = ConfigStore::from_yaml_str(
        "app:\n  greeting: \"hi there\"\n  max-users: 3\n",
        "",
    )
    .unwrap();
    let app = build_app(config).await.unwrap();
    TestApp::from_app(&app)
}

#[tokio::test]
async fn list_users_hides_password_hash() {
    let app = test_app().await;
    let response = app.get("/api/users").await.assert_status(StatusCode::OK);
    let body: serde_json::Value = response.json();

    let users = body.as_array().unwrap();
    assert_eq!(users.len(), 2);
    assert!(users.iter().all(|u| u.get("password_hash").is_none()));
    assert_eq!(users[0]["name"], "Alice");
}

#[tokio::test]
async fn get_user_by_id() {
    let app = test_app().await;
    let response = app.get("/api/users/1").await.assert_status(StatusCode::OK);
    let user: UserView = response.json();
    assert_eq!(user.id, 1);
    assert_eq!(user.email, "alice@example.com");
}

#[tokio::test]
async fn get_unknown_user_is_404() {
    let app = test_app().await;
    let response = app.get("/api/users/99").await;
    response.assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn get_user_bad_id_is_400() {
    let app = test_app().await;
    let response = app.get("/api/users/banana").await;
    let body: serde_json::Value = response.assert_status(StatusCode::BAD_REQUEST).json();
    assert_eq!(body["details"]["parameter"], "id");
}

#[tokio::test]
async fn create_then_fetch_user() {
    let app = test_app().await;

    let response = app
        .post_json(
            "/api/users?notify=true",
            &serde_json::json!({ "name": "Carol", "email": "carol@example.com" }),
        )
        .await
        .assert_status(StatusCode::CREATED);
    let created: serde_json::Value = response.json();
    assert_eq!(created["name"], "Carol");
    assert!(created.get("password_hash").is_none());

    let id = created["id"].as_u64().unwrap();
    let fetched: UserView = app
        .get(&format!("/api/users/{id}"))
        .await
        .assert_status(StatusCode::OK)
        .json();
    assert_eq!(fetched.name, "Carol");
}

#[tokio::test]
async fn capacity_limit_from_config() {
    let app = test_app().await;

    // max-users is 3 and two are seeded; the second insert must fail.
    app.post_json(
        "/api/users",
        &serde_json::json!({ "name": "C", "email": "c@example.com" }),
    )
    .await
    .assert_status(StatusCode::CREATED);

    let response = app
        .post_json(
            "/api/users",
            &serde_json::json!({ "name": "D", "email": "d@example.com" }),
        )
        .await;
    response.assert_status(StatusCode::CONFLICT);
}

#[tokio::test]
async fn create_rejects_malformed_body() {
    let app = test_app().await;
    let response = app
        .post_json("/api/users", &serde_json::json!({ "name": 42 }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn delete_user() {
    let app = test_app().await;
    app.delete("/api/users/2")
        .await
        .assert_status(StatusCode::NO_CONTENT);
    app.get("/api/users/2")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn info_reports_configured_greeting() {
    let app = test_app().await;
    let body: serde_json::Value = app
        .get("/info")
        .await
        .assert_status(StatusCode::OK)
        .json();
    assert_eq!(body["greeting"], "hi there");
    assert_eq!(body["via"], "direct");
}

#[tokio::test]
async fn health_endpoint_installed() {
    let app = test_app().await;
    let response = app.get("/health").await.assert_status(StatusCode::OK);
    assert_eq!(response.text(), "OK");
}
