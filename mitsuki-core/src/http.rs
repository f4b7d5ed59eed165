//! Re-exports of the HTTP types user code interacts with, so applications
//! depend on `mitsuki-core` without naming the underlying stack.

pub use axum::body::Body;
pub use axum::extract::{ConnectInfo, FromRef, FromRequest, FromRequestParts, Request};
pub use axum::http::{
    header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri,
};
pub use axum::response::{IntoResponse, Response};
pub use axum::{serve, Extension, Json, Router};
pub use bytes::Bytes;
