//! HTTP middleware for the API server.

use axum::{
    body::Body,
    http::{HeaderValue, Method, Request, header},
    middleware::Next,
    response::Response,
};
use tower_http::cors::{Any, CorsLayer};
use uuid::Uuid;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Read-only API: GET from anywhere.
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any)
}

/// Tag each request and its response with a request ID. A caller
/// supplied ID is kept.
pub async fn request_id(mut request: Request<Body>, next: Next) -> Response {
    let id = match request.headers().get(REQUEST_ID_HEADER) {
        Some(existing) => existing.clone(),
        None => {
            let generated = HeaderValue::from_str(&Uuid::new_v4().to_string());
            match generated {
                Ok(value) => {
                    request.headers_mut().insert(REQUEST_ID_HEADER, value.clone());
                    value
                }
                Err(_) => return next.run(request).await,
            }
        }
    };

    let mut response = next.run(request).await;
    response.headers_mut().insert(REQUEST_ID_HEADER, id);
    response
}
