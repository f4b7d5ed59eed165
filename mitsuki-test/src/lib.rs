//! In-process HTTP test client for Mitsuki applications.
//!
//! Dispatches requests straight into the assembled router via
//! `tower::ServiceExt::oneshot`, without binding a TCP port.

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{Method, Request, StatusCode};
use http_body_util::BodyExt;
use mitsuki_core::builder::App;
use mitsuki_core::http::{Body, Router};
use serde::de::DeserializeOwned;
use tower::util::ServiceExt;

/// In-process test client wrapping an application router.
pub struct TestApp {
    router: Router,
}

impl TestApp {
    /// Wrap an already assembled router.
    pub fn new(router: Router) -> Self {
        Self { router }
    }

    /// Wrap a built [`App`] (startup hooks are not run).
    pub fn from_app(app: &App) -> Self {
        Self::new(app.router())
    }

    /// Send an arbitrary request.
    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("failed to send request");

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .expect("failed to read response body")
            .to_bytes();

        TestResponse { status, body }
    }

    /// Send a GET request to the given path.
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::GET)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    /// Send a DELETE request to the given path.
    pub async fn delete(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method(Method::DELETE)
            .uri(path)
            .body(Body::empty())
            .unwrap();
        self.send(req).await
    }

    /// Send a POST request with a JSON body.
    pub async fn post_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.json_request(Method::POST, path, body).await
    }

    /// Send a PUT request with a JSON body.
    pub async fn put_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.json_request(Method::PUT, path, body).await
    }

    /// Send a PATCH request with a JSON body.
    pub async fn patch_json(&self, path: &str, body: &impl serde::Serialize) -> TestResponse {
        self.json_request(Method::PATCH, path, body).await
    }

    async fn json_request(
        &self,
        method: Method,
        path: &str,
        body: &impl serde::Serialize,
    ) -> TestResponse {
        let json = serde_json::to_vec(body).unwrap();
        let req = Request::builder()
            .method(method)
            .uri(path)
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(json))
            .unwrap();
        self.send(req).await
    }
}

/// A fully buffered response.
pub struct TestResponse {
    pub status: StatusCode,
    pub body: Bytes,
}

impl TestResponse {
    /// Deserialize the body as JSON into `T`.
    ///
    /// # Panics
    ///
    /// Panics when the body is not valid JSON for `T`.
    pub fn json<T: DeserializeOwned>(&self) -> T {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "response body is not valid JSON for the requested type: {e}\nbody: {}",
                self.text()
            )
        })
    }

    /// The body as UTF-8 text (lossy).
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).to_string()
    }

    /// Assert the response status, returning `self` for chaining.
    #[track_caller]
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.status,
            expected,
            "unexpected status; body: {}",
            String::from_utf8_lossy(&self.body)
        );
        self
    }
}
