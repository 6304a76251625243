//! campus-http - Authenticated HTTP client for the campus service.
//!
//! Requests flow through a [`RequestPipeline`] that attaches the current
//! access token and, on a 401, waits for a single shared token refresh before
//! retrying once. The [`RefreshCoordinator`] guarantees that no matter how
//! many requests fail together, the refresh endpoint is called once per
//! expiry.
//!
//! Most callers only need [`CampusClient`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use campus_core::{ApiUrl, MemoryStore, SessionState};
//! use campus_http::{CampusClient, ClientConfig};
//!
//! # async fn example() -> campus_core::Result<()> {
//! let api = ApiUrl::new("https://learn.example.com/api")?;
//! let client = CampusClient::new(ClientConfig::new(api), Arc::new(MemoryStore::new()))?;
//!
//! if let SessionState::Authenticated(user) = client.bootstrap().await? {
//!     println!("welcome back, {}", user.display_name());
//! }
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod bootstrap;
pub mod campus;
pub mod config;
pub mod coordinator;
pub mod pipeline;

pub use api::{ApiClient, ApiRequest, ApiResponse, Method};
pub use bootstrap::SessionBootstrapper;
pub use campus::CampusClient;
pub use config::{ClientConfig, DEFAULT_LOGOUT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
pub use coordinator::{RefreshCoordinator, RefreshedTokens, TokenRefresher};
pub use pipeline::RequestPipeline;
