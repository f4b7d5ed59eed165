use mitsuki::prelude::*;
use mitsuki::DependencyRequest;

use crate::models::{CreateUser, UserView};
use crate::services::UserService;

#[derive(Clone)]
pub struct UserController {
    service: UserService,
}

impl Component for UserController {
    fn dependencies() -> Vec<DependencyRequest> {
        vec![DependencyRequest::component::<UserService>("service")]
    }

    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Self {
            service: ctx.component("service")?,
        })
    }
}

impl Controller for UserController {
    fn base_path() -> &'static str {
        "/api/users"
    }

    fn routes() -> Vec<RouteSpec> {
        vec![
            RouteSpec::get("/")
                .operation("list_users")
                .summary("List all users")
                .tag("users")
                .exclude_field("password_hash")
                .handler(|c: UserController, _args: Args| async move {
                    Ok::<_, HttpError>(Reply::ok(c.service.list().await))
                }),
            RouteSpec::get("/{id}")
                .operation("get_user")
                .path_param::<u64>("id")
                .produces::<UserView>()
                .exclude_field("password_hash")
                .tag("users")
                .handler(|c: UserController, args: Args| async move {
                    let id: u64 = args.get("id")?;
                    match c.service.get(id).await {
                        Some(user) => Ok(Reply::ok(user)),
                        None => Err(HttpError::not_found(format!("user {id} not found"))),
                    }
                }),
            RouteSpec::post("/")
                .operation("create_user")
                .body::<CreateUser>()
                .query_param_or::<bool>("notify", false)
                .exclude_field("password_hash")
                .tag("users")
                .handler(|c: UserController, args: Args| async move {
                    let body: CreateUser = args.body()?;
                    let notify: bool = args.get("notify")?;
                    let user = c.service.create(body.name, body.email).await?;
                    if notify {
                        tracing::info!(user = user.id, "would send welcome mail");
                    }
                    Ok::<_, HttpError>(Reply::created(user))
                }),
            RouteSpec::delete("/{id}")
                .operation("delete_user")
                .path_param::<u64>("id")
                .tag("users")
                .handler(|c: UserController, args: Args| async move {
                    let id: u64 = args.get("id")?;
                    if c.service.delete(id).await {
                        Ok(Reply::no_content())
                    } else {
                        Err(HttpError::not_found(format!("user {id} not found")))
                    }
                }),
        ]
    }
}

/// Serves the configured greeting; shows value injection on a controller.
#[derive(Clone)]
pub struct InfoController {
    greeting: String,
}

impl Component for InfoController {
    fn dependencies() -> Vec<DependencyRequest> {
        vec![DependencyRequest::value_or(
            "greeting",
            "app.greeting",
            "hello",
        )]
    }

    fn construct(ctx: &ComponentContext) -> Result<Self, BoxError> {
        Ok(Self {
            greeting: ctx.value("greeting")?,
        })
    }
}

impl Controller for InfoController {
    fn routes() -> Vec<RouteSpec> {
        vec![RouteSpec::get("/info")
            .operation("info")
            .summary("Service greeting and profile")
            .request_info()
            .handler(|c: InfoController, args: Args| async move {
                let via = args
                    .request()?
                    .header("x-forwarded-for")
                    .unwrap_or("direct")
                    .to_string();
                Ok::<_, HttpError>(Reply::ok(serde_json::json!({
                    "greeting": c.greeting,
                    "via": via,
                })))
            })]
    }
}
