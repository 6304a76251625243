//! Client configuration.

use std::time::Duration;

use campus_core::ApiUrl;

/// Default timeout for every request to the service.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound on the best-effort remote logout call.
pub const DEFAULT_LOGOUT_TIMEOUT: Duration = Duration::from_secs(5);

/// Settings for a [`CampusClient`](crate::CampusClient).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the API, e.g. `https://learn.example.com/api`.
    pub api_url: ApiUrl,
    pub request_timeout: Duration,
    pub logout_timeout: Duration,
    pub user_agent: String,
}

impl ClientConfig {
    /// Configuration with default timeouts for the given API.
    pub fn new(api_url: ApiUrl) -> Self {
        Self {
            api_url,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            logout_timeout: DEFAULT_LOGOUT_TIMEOUT,
            user_agent: concat!("campus/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_logout_timeout(mut self, timeout: Duration) -> Self {
        self.logout_timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}
