use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use http_body_util::BodyExt;
use mitsuki_core::config::ConfigStore;
use mitsuki_core::container::{BoxError, Component, ComponentContext, ComponentKind};
use mitsuki_core::http::{Body, Request, StatusCode};
use mitsuki_core::prelude::*;
use mitsuki_core::web::RouteSpec;
use mitsuki_core::DependencyRequest;
use serde::{Deserialize, Serialize};
use tower::util::ServiceExt;

// ── Fixture application ─────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct CreateUser {
    name: String,
    age: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct UserView {
    id: i64,
    name: String,
}

#[derive(Clone)]
struct UserService;

impl Component for UserService {
    fn kind() -> ComponentKind {
        ComponentKind::Service
    }
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(UserService)
    }
}

#[derive(Clone)]
struct UserController {
    _service: UserService,
}

impl Component for UserController {
    fn dependencies() -> Vec<DependencyRequest> {
        vec![DependencyRequest::component::<UserService>("service")]
    }
    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Self {
            _service: ctx.component("service")?,
        })
    }
}

impl Controller for UserController {
    fn base_path() -> &'static str {
        "/api"
    }

    fn routes() -> Vec<RouteSpec> {
        vec![
            RouteSpec::post("/users/{id}")
                .operation("create_user")
                .path_param::<i64>("id")
                .query_param_or::<bool>("notify", false)
                .body::<CreateUser>()
                .handler(|_: UserController, args: Args| async move {
                    let id: i64 = args.get("id")?;
                    let notify: bool = args.get("notify")?;
                    let body: CreateUser = args.body()?;
                    Ok::<_, HttpError>(Reply::created(serde_json::json!({
                        "id": id,
                        "notify": notify,
                        "name": body.name,
                        "age": body.age,
                    })))
                }),
            RouteSpec::get("/users/{id}/view")
                .operation("view_user")
                .path_param::<i64>("id")
                .exclude_fields(["password_hash", "admin_notes"])
                .handler(|_: UserController, args: Args| async move {
                    let id: i64 = args.get("id")?;
                    Ok::<_, HttpError>(Reply::ok(serde_json::json!({
                        "user": {
                            "id": id,
                            "password_hash": "x",
                            "profile": { "bio": "b", "admin_notes": "n" }
                        }
                    })))
                }),
            RouteSpec::get("/users/{id}/strict")
                .operation("strict_user")
                .path_param::<i64>("id")
                .produces::<UserView>()
                .handler(|_: UserController, args: Args| async move {
                    let id: i64 = args.get("id")?;
                    let reply = if id == 0 {
                        // Deliberately violates the egress contract.
                        Reply::ok(serde_json::json!({ "unexpected": true }))
                    } else {
                        Reply::ok(UserView {
                            id,
                            name: "A".into(),
                        })
                    };
                    Ok::<_, HttpError>(reply)
                }),
            RouteSpec::get("/paged")
                .operation("paged")
                .query_param::<i64>("page")
                .handler(|_: UserController, args: Args| async move {
                    let page: i64 = args.get("page")?;
                    Ok::<_, HttpError>(Reply::ok(serde_json::json!({ "page": page })))
                }),
            RouteSpec::get("/missing")
                .operation("missing")
                .handler(|_: UserController, _args: Args| async move {
                    Err::<Reply, _>(HttpError::not_found("no such user"))
                }),
            RouteSpec::get("/teapot")
                .operation("teapot")
                .handler(|_: UserController, _args: Args| async move {
                    Reply::status(StatusCode::IM_A_TEAPOT)
                        .body(serde_json::json!({ "short": "stout" }))
                }),
            RouteSpec::get("/echo-headers")
                .operation("echo_headers")
                .request_info()
                .handler(|_: UserController, args: Args| async move {
                    let ua = args
                        .request()?
                        .header("user-agent")
                        .unwrap_or("none")
                        .to_string();
                    Ok::<_, HttpError>(Reply::ok(serde_json::json!({ "user_agent": ua })))
                }),
        ]
    }
}

#[derive(Serialize)]
#[serde(rename_all = "snake_case")]
enum AccountState {
    Active,
}

#[derive(Clone)]
struct TypesController;

impl Component for TypesController {
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(TypesController)
    }
}

impl Controller for TypesController {
    fn routes() -> Vec<RouteSpec> {
        vec![RouteSpec::get("/types")
            .operation("types")
            .handler(|_: TypesController, _args: Args| async move {
                use chrono::TimeZone;
                #[derive(Serialize)]
                struct Payload {
                    instant: chrono::DateTime<chrono::Utc>,
                    date: chrono::NaiveDate,
                    id: uuid::Uuid,
                    amount: rust_decimal::Decimal,
                    state: AccountState,
                    blob: Vec<u8>,
                    tags: HashSet<String>,
                }
                let payload = Payload {
                    instant: chrono::Utc.with_ymd_and_hms(2024, 6, 3, 13, 0, 0).unwrap(),
                    date: chrono::NaiveDate::from_ymd_opt(2024, 6, 3).unwrap(),
                    id: uuid::Uuid::nil(),
                    amount: "19.99".parse().unwrap(),
                    state: AccountState::Active,
                    blob: vec![1, 2, 3],
                    tags: ["b".to_string(), "a".to_string()].into_iter().collect(),
                };
                Ok::<_, HttpError>(Reply::ok(payload))
            })]
    }
}

async fn build_app() -> App {
    Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "").unwrap())
        .register::<UserService>()
        .register_controller::<UserController>()
        .register_controller::<TypesController>()
        .with(Health)
        .build()
        .await
        .unwrap()
}

async fn send(app: &App, req: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.router().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::String(
            String::from_utf8_lossy(&bytes).to_string(),
        ))
    };
    (status, json)
}

fn post_json(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(path: &str) -> Request<Body> {
    Request::builder().uri(path).body(Body::empty()).unwrap()
}

// ── Binding ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn path_query_body_binding() {
    let app = build_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/users/42?notify=true", r#"{"name":"A","age":30}"#),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        body,
        serde_json::json!({ "id": 42, "notify": true, "name": "A", "age": 30 })
    );
}

#[tokio::test]
async fn query_default_applied_when_absent() {
    let app = build_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/users/7", r#"{"name":"B","age":1}"#),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["notify"], false);
}

#[tokio::test]
async fn bad_path_coercion_is_400_naming_parameter() {
    let app = build_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/users/abc", r#"{"name":"A","age":30}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["parameter"], "id");
}

#[tokio::test]
async fn missing_required_query_is_400() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/paged")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["parameter"], "page");
}

#[tokio::test]
async fn invalid_json_body_is_400() {
    let app = build_app().await;
    let (status, _) = send(&app, post_json("/api/users/1", "{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn body_failing_ingress_type_is_400() {
    let app = build_app().await;
    let (status, body) = send(
        &app,
        post_json("/api/users/1", r#"{"name":"A","age":"old"}"#),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "Request body validation failed");
}

#[tokio::test]
async fn request_info_exposes_headers() {
    let app = build_app().await;
    let req = Request::builder()
        .uri("/api/echo-headers")
        .header("user-agent", "mitsuki-test")
        .body(Body::empty())
        .unwrap();
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user_agent"], "mitsuki-test");
}

// ── Egress ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn egress_exclusions_strip_nested_fields() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/users/1/view")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "user": { "id": 1, "profile": { "bio": "b" } } })
    );
}

#[tokio::test]
async fn conforming_egress_passes() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/users/5/strict")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], 5);
}

#[tokio::test]
async fn nonconforming_egress_is_opaque_500() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/users/0/strict")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "Internal server error");
}

#[tokio::test]
async fn egress_failure_detail_visible_in_dev_profile() {
    let app = Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "dev").unwrap())
        .register::<UserService>()
        .register_controller::<UserController>()
        .register_controller::<TypesController>()
        .build()
        .await
        .unwrap();
    let (status, body) = send(&app, get("/api/users/0/strict")).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["details"]["message"]
        .as_str()
        .unwrap()
        .contains("UserView"));
}

// ── Response shaping ────────────────────────────────────────────────────────

#[tokio::test]
async fn handler_error_maps_through_taxonomy() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/missing")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "no such user");
}

#[tokio::test]
async fn arbitrary_status_with_body() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/api/teapot")).await;
    assert_eq!(status, StatusCode::IM_A_TEAPOT);
    assert_eq!(body["short"], "stout");
}

#[tokio::test]
async fn unmatched_path_is_404() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/nope")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "Not Found");
}

#[tokio::test]
async fn health_plugin_route() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::Value::String("OK".into()));
}

// ── JSON codec round-trip ───────────────────────────────────────────────────

#[tokio::test]
async fn native_type_encoding_round_trip() {
    let app = build_app().await;
    let (status, body) = send(&app, get("/types")).await;
    assert_eq!(status, StatusCode::OK);

    assert_eq!(body["instant"], "2024-06-03T13:00:00Z");
    assert_eq!(body["date"], "2024-06-03");
    assert_eq!(body["id"], "00000000-0000-0000-0000-000000000000");
    assert_eq!(body["amount"], serde_json::json!(19.99));
    assert_eq!(body["state"], "active");
    assert_eq!(body["blob"], "AQID");
    assert_eq!(body["tags"], serde_json::json!(["a", "b"]));

    // Parsing the JSON back yields the same logical values.
    let instant: chrono::DateTime<chrono::Utc> =
        serde_json::from_value(body["instant"].clone()).unwrap();
    assert_eq!(instant.timestamp(), 1_717_419_600);
    let id: uuid::Uuid = serde_json::from_value(body["id"].clone()).unwrap();
    assert!(id.is_nil());
    let amount: rust_decimal::Decimal =
        serde_json::from_value(body["amount"].clone()).unwrap();
    assert_eq!(amount, "19.99".parse::<rust_decimal::Decimal>().unwrap());
}

// ── Route metadata view ─────────────────────────────────────────────────────

#[tokio::test]
async fn openapi_view_round_trips_route_shapes() {
    let app = build_app().await;
    let view = app.openapi_view();
    assert!(!view.is_empty());

    // Serialize the view and rebuild it; the (method, pattern, param
    // shapes) set must survive unchanged.
    let json = serde_json::to_string(&view).unwrap();
    let rebuilt: Vec<mitsuki_core::RouteInfo> = serde_json::from_str(&json).unwrap();

    let shapes = |infos: &[mitsuki_core::RouteInfo]| {
        let mut v: Vec<_> = infos
            .iter()
            .map(|i| format!("{:?}", i.shape()))
            .collect();
        v.sort();
        v
    };
    assert_eq!(shapes(&view), shapes(&rebuilt));

    let create = view
        .iter()
        .find(|r| r.operation_id == "create_user")
        .unwrap();
    assert_eq!(create.method, "POST");
    assert_eq!(create.path, "/api/users/{id}");
    assert_eq!(create.request_body_type.as_deref(), Some("CreateUser"));
    assert_eq!(create.params.len(), 3);
}

// ── Multipart uploads ───────────────────────────────────────────────────────

#[derive(Clone)]
struct UploadController;

impl Component for UploadController {
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(UploadController)
    }
}

impl Controller for UploadController {
    fn routes() -> Vec<RouteSpec> {
        vec![RouteSpec::post("/upload")
            .operation("upload")
            .multipart_file(
                "doc",
                UploadLimits {
                    max_file_size: Some(16),
                    max_total_size: Some(64),
                    allowed_types: vec!["text/plain".to_string()],
                },
            )
            .multipart_field_or::<String>("note", "none".to_string())
            .handler(|_: UploadController, args: Args| async move {
                let doc = args.file("doc")?;
                let note: String = args.get("note")?;
                Ok::<_, HttpError>(Reply::ok(serde_json::json!({
                    "filename": doc.filename,
                    "size": doc.len(),
                    "note": note,
                })))
            })]
    }
}

fn multipart_request(parts: &[(&str, Option<(&str, &str)>, &str)]) -> Request<Body> {
    let boundary = "mitsuki-test-boundary";
    let mut body = String::new();
    for (name, file, content) in parts {
        body.push_str(&format!("--{boundary}\r\n"));
        match file {
            Some((filename, content_type)) => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\n"
                ));
                body.push_str(&format!("Content-Type: {content_type}\r\n\r\n"));
            }
            None => {
                body.push_str(&format!(
                    "Content-Disposition: form-data; name=\"{name}\"\r\n\r\n"
                ));
            }
        }
        body.push_str(content);
        body.push_str("\r\n");
    }
    body.push_str(&format!("--{boundary}--\r\n"));

    Request::builder()
        .method("POST")
        .uri("/upload")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={boundary}"),
        )
        .body(Body::from(body))
        .unwrap()
}

async fn upload_app() -> App {
    Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "").unwrap())
        .register_controller::<UploadController>()
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn multipart_file_and_field_bind() {
    let app = upload_app().await;
    let req = multipart_request(&[
        ("doc", Some(("a.txt", "text/plain")), "hello"),
        ("note", None, "from the form"),
    ]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        serde_json::json!({ "filename": "a.txt", "size": 5, "note": "from the form" })
    );
}

#[tokio::test]
async fn multipart_field_default_applied() {
    let app = upload_app().await;
    let req = multipart_request(&[("doc", Some(("a.txt", "text/plain")), "hello")]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["note"], "none");
}

#[tokio::test]
async fn multipart_missing_required_file_is_400() {
    let app = upload_app().await;
    let req = multipart_request(&[("note", None, "no file here")]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["parameter"], "doc");
}

#[tokio::test]
async fn multipart_file_over_limit_is_400() {
    let app = upload_app().await;
    let req = multipart_request(&[(
        "doc",
        Some(("big.txt", "text/plain")),
        "this body is longer than sixteen bytes",
    )]);
    let (status, _) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn multipart_disallowed_content_type_is_400() {
    let app = upload_app().await;
    let req = multipart_request(&[("doc", Some(("a.bin", "application/zip")), "PK")]);
    let (status, body) = send(&app, req).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["details"]["parameter"], "doc");
}

// ── Codec extension through the container ───────────────────────────────────

#[derive(Clone, Serialize)]
struct Money(i64);

#[derive(Clone)]
struct MoneyController;

impl Component for MoneyController {
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(MoneyController)
    }
}

impl Controller for MoneyController {
    fn routes() -> Vec<RouteSpec> {
        vec![RouteSpec::get("/price")
            .operation("price")
            .handler(|_: MoneyController, _args: Args| async move {
                Ok::<_, HttpError>(Reply::ok(Money(5)))
            })]
    }
}

#[tokio::test]
async fn registered_encoder_component_extends_the_codec() {
    let mut encoders = mitsuki_core::EncoderRegistry::new();
    encoders.insert::<Money, _>(|m| serde_json::json!(format!("{}.00 EUR", m.0)));

    let app = Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "").unwrap())
        .provide("jsonEncoders", encoders)
        .register_controller::<MoneyController>()
        .build()
        .await
        .unwrap();

    let (status, body) = send(&app, get("/price")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, serde_json::json!("5.00 EUR"));
}

// ── Startup validation ──────────────────────────────────────────────────────

#[derive(Clone)]
struct ClashController;

impl Component for ClashController {
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(ClashController)
    }
}

impl Controller for ClashController {
    fn routes() -> Vec<RouteSpec> {
        vec![
            RouteSpec::get("/dup")
                .operation("a")
                .handler(|_: ClashController, _args: Args| async move {
                    Ok::<_, HttpError>(Reply::no_content())
                }),
            RouteSpec::get("/dup")
                .operation("b")
                .handler(|_: ClashController, _args: Args| async move {
                    Ok::<_, HttpError>(Reply::no_content())
                }),
        ]
    }
}

#[tokio::test]
async fn conflicting_routes_abort_startup() {
    let result = Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "").unwrap())
        .register_controller::<ClashController>()
        .build()
        .await;
    assert!(matches!(
        result,
        Err(mitsuki_core::StartupError::Routing(_))
    ));
}

// ── Prototype controllers ───────────────────────────────────────────────────

static PROTO_BUILDS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
struct CountingController {
    _marker: Arc<()>,
}

impl Component for CountingController {
    fn scope() -> Scope {
        Scope::Prototype
    }
    fn construct(_ctx: &ComponentContext) -> Result<Self, BoxError> {
        PROTO_BUILDS.fetch_add(1, Ordering::SeqCst);
        Ok(Self {
            _marker: Arc::new(()),
        })
    }
}

impl Controller for CountingController {
    fn routes() -> Vec<RouteSpec> {
        vec![RouteSpec::get("/count")
            .operation("count")
            .handler(|_: CountingController, _args: Args| async move {
                Ok::<_, HttpError>(Reply::no_content())
            })]
    }
}

#[tokio::test]
async fn prototype_controller_fresh_per_request() {
    let app = Mitsuki::builder()
        .with_config(ConfigStore::from_yaml_str("{}", "").unwrap())
        .register_controller::<CountingController>()
        .build()
        .await
        .unwrap();

    let before = PROTO_BUILDS.load(Ordering::SeqCst);
    let _ = send(&app, get("/count")).await;
    let _ = send(&app, get("/count")).await;
    let after = PROTO_BUILDS.load(Ordering::SeqCst);
    assert_eq!(after - before, 2);
}
