mod request_id;

use crate::config::AppConfig;
use crate::error::GatewayError;
use crate::routing::ModelRouter;
use crate::stream::ReasoningMode;
use crate::transport::{HttpTransport, PreparedUpstream};

use request_id::RequestIdGenerator;

/// Shared application state accessible to all handlers. Read-only after
/// startup apart from the request id counter.
pub struct AppState {
    pub config: AppConfig,
    pub transport: HttpTransport,
    pub model_router: ModelRouter,
    pub upstream: PreparedUpstream,
    request_ids: RequestIdGenerator,
}

impl AppState {
    #[must_use]
    pub fn new(
        config: AppConfig,
        transport: HttpTransport,
        model_router: ModelRouter,
        upstream: PreparedUpstream,
    ) -> Self {
        Self {
            config,
            transport,
            model_router,
            upstream,
            request_ids: RequestIdGenerator::new(),
        }
    }

    /// Build every collaborator from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `GatewayError::Config` when the upstream URL, key or proxy is
    /// unusable.
    pub fn from_config(config: AppConfig) -> Result<Self, GatewayError> {
        let upstream = PreparedUpstream::new(&config.upstream)?;
        let transport = HttpTransport::new(&config.server, upstream.proxy())?;
        let model_router = ModelRouter::new(&config);
        Ok(Self::new(config, transport, model_router, upstream))
    }

    #[must_use]
    pub fn reasoning_mode(&self) -> ReasoningMode {
        ReasoningMode::from_show_reasoning(self.config.features.show_reasoning)
    }

    /// Fresh id for the next request.
    pub fn next_request_id(&self) -> uuid::Uuid {
        let seq = self.request_ids.next_seq();
        self.request_ids.request_uuid(seq)
    }
}
