//! Authenticated Drive API client.

mod executor;

pub use executor::{encode_segment, RequestExecutor};

use std::sync::Arc;

use crate::auth::AuthenticatedClient;
use crate::config::DriveApiConfig;
use crate::services::FilesService;
use crate::transport::HttpTransport;

/// Drive API client bound to one set of credentials.
///
/// Clients are cheap to build; one is created per attempt so a retried
/// request always carries the most recently refreshed token.
#[derive(Clone)]
pub struct DriveClient {
    executor: Arc<RequestExecutor>,
}

impl DriveClient {
    /// Creates a client.
    pub fn new(
        config: DriveApiConfig,
        transport: Arc<dyn HttpTransport>,
        credentials: AuthenticatedClient,
    ) -> Self {
        Self {
            executor: Arc::new(RequestExecutor::new(config, transport, credentials)),
        }
    }

    /// Access the files service.
    pub fn files(&self) -> FilesService {
        FilesService::new(self.executor.clone())
    }

    /// Node identity the client authenticates as.
    pub fn node_id(&self) -> &str {
        self.executor.credentials().node_id()
    }
}
