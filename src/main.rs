//! mediadrop server binary
//!
//! Loads configuration from `.env` and the environment, then serves until
//! SIGTERM or Ctrl+C. A missing `API_KEY` aborts before anything binds.

use mediadrop::ServerConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServerConfig::load()?;

    mediadrop::start_server(config).await?;

    Ok(())
}
