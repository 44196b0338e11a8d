//! Staffing engine configuration: loaded from environment variables.

#[derive(Clone, Debug)]
pub struct StaffingConfig {
    /// Base URL of the document generation service. Empty disables rendering.
    pub document_service_url: String,
    /// Endpoint receiving real-time "up for grabs" events. Empty disables it.
    pub broadcast_url: String,
    /// Timeout applied to HTTP requests and outbound collaborator calls.
    pub request_timeout_secs: u64,
    /// Maximum pooled database connections.
    pub pool_max_size: usize,
}

impl StaffingConfig {
    pub fn from_env() -> Self {
        let document_service_url =
            std::env::var("STAFFING_DOCUMENT_SERVICE_URL").unwrap_or_default();
        let broadcast_url = std::env::var("STAFFING_BROADCAST_URL").unwrap_or_default();
        let request_timeout_secs = std::env::var("STAFFING_REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(30);
        let pool_max_size = std::env::var("STAFFING_POOL_MAX_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(10);

        if document_service_url.is_empty() {
            tracing::warn!(
                "STAFFING_DOCUMENT_SERVICE_URL not set -- timesheet documents will not be generated"
            );
        }
        if broadcast_url.is_empty() {
            tracing::warn!("STAFFING_BROADCAST_URL not set -- real-time broadcasts disabled");
        }

        Self {
            document_service_url,
            broadcast_url,
            request_timeout_secs,
            pool_max_size,
        }
    }
}

impl Default for StaffingConfig {
    fn default() -> Self {
        Self {
            document_service_url: String::new(),
            broadcast_url: String::new(),
            request_timeout_secs: 30,
            pool_max_size: 10,
        }
    }
}
