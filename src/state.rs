use crate::config::ServerConfig;
use crate::storage::UploadStore;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio_util::sync::CancellationToken;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration, immutable after startup
    pub config: Arc<ServerConfig>,

    /// Upload destination and naming policy
    pub store: Arc<UploadStore>,

    /// Cancelled when the drain timeout expires; handlers still reading a
    /// body give up and drop their partial file.
    pub shutdown: CancellationToken,
}

impl ServerState {
    pub fn new(config: ServerConfig) -> Self {
        let store = UploadStore::from_config(&config);
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            shutdown: CancellationToken::new(),
        }
    }

    /// Compare a presented key with the configured one in constant time.
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        let expected = self.config.api_key();
        !expected.is_empty() && bool::from(key.as_bytes().ct_eq(expected.as_bytes()))
    }
}
