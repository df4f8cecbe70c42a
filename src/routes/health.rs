use crate::encoding::Envelope;
use axum::http::StatusCode;

pub const GREETING: &str = "Hello World!";

/// Root acknowledgement endpoint (`GET /`)
pub async fn hello() -> Envelope {
    Envelope::new(StatusCode::OK, GREETING)
}
