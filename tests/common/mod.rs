//! Shared helpers for driving the router in-process.

#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::http::{Request, Response};
use http_body_util::BodyExt;
use mediadrop::{Envelope, ServerConfig, ServerState, build_router};
use std::path::Path;
use std::sync::Arc;
use tower::ServiceExt;

pub const API_KEY: &str = "secret";
const BOUNDARY: &str = "mediadrop-test-boundary";

pub fn test_config(upload_dir: &Path) -> ServerConfig {
    let mut config = ServerConfig::with_api_key(API_KEY);
    config.upload_dir = upload_dir.to_path_buf();
    config
}

pub fn test_app(config: ServerConfig) -> Router {
    build_router(Arc::new(ServerState::new(config)))
}

pub async fn send(app: &Router, request: Request<Body>) -> Response<Body> {
    app.clone().oneshot(request).await.expect("router is infallible")
}

pub async fn body_bytes(response: Response<Body>) -> Vec<u8> {
    response
        .into_body()
        .collect()
        .await
        .expect("body collects")
        .to_bytes()
        .to_vec()
}

pub async fn json_envelope(response: Response<Body>) -> Envelope {
    let bytes = body_bytes(response).await;
    serde_json::from_slice(&bytes).expect("body is a JSON envelope")
}

/// A single-part multipart body. Returns the content type and the bytes.
pub fn multipart_body(field: &str, data: &[u8]) -> (String, Vec<u8>) {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"{field}\"; filename=\"blob.bin\"\r\n\
             Content-Type: application/octet-stream\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(data);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    (format!("multipart/form-data; boundary={BOUNDARY}"), body)
}

pub fn upload_request(path: &str, api_key: Option<&str>, field: &str, data: &[u8]) -> Request<Body> {
    let (content_type, body) = multipart_body(field, data);
    let mut builder = Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", content_type);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::from(body)).expect("valid request")
}

pub fn get(path: &str, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("GET").uri(path);
    if let Some(key) = api_key {
        builder = builder.header("x-api-key", key);
    }
    builder.body(Body::empty()).expect("valid request")
}

/// File names in `dir`, sorted. Hidden in-progress files included.
pub fn dir_entries(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .expect("upload dir readable")
        .map(|e| e.expect("dir entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
