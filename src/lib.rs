//! mediadrop - minimal authenticated upload service
//!
//! A thin HTTP server that checks a static API key on every request, answers a
//! root health probe and stores multipart uploads (audio/video blobs) on local
//! disk under a caller-supplied identifier.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use mediadrop::ServerConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServerConfig::load()?;
//!     mediadrop::start_server(config).await?;
//!     Ok(())
//! }
//! ```
//!
//! # API Endpoints
//!
//! All endpoints require `X-API-KEY`; a mismatch is a bare 401.
//!
//! - `GET /` - acknowledgement envelope
//! - `POST /save/{id}`, `POST /upload/{id}` - store the multipart file part
//!
//! Responses are `{message, code}` envelopes, JSON by default and XML when
//! the request declares `Content-Type: application/xml`. `?pretty=1` indents,
//! `?null=1` keeps JSON nulls.

pub mod config;
pub mod encoding;
pub mod error;
pub mod middleware;
pub mod routes;
pub mod server;
pub mod state;
pub mod storage;

pub use config::{ConfigError, NamingPolicy, ServerConfig};
pub use encoding::{Encoder, Envelope, Toggles};
pub use error::{ServerError, ServerResult};
pub use server::{Lifecycle, Server, build_router, start_server};
pub use state::ServerState;
pub use storage::UploadStore;
