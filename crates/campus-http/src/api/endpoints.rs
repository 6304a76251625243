//! Endpoint paths and request/response bodies.

use serde::{Deserialize, Serialize};

use campus_core::{CredentialPair, Identity};

// ============================================================================
// Endpoint Paths
// ============================================================================

pub const REGISTER: &str = "auth/register/";

pub const LOGIN: &str = "auth/login/";

pub const LOGOUT: &str = "auth/logout/";

/// Called directly, never through the request pipeline.
pub const TOKEN_REFRESH: &str = "auth/token/refresh/";

pub const PROFILE: &str = "auth/profile/";

pub const CHANGE_PASSWORD: &str = "auth/change-password/";

pub const STATS: &str = "auth/stats/";

pub const ACHIEVEMENTS: &str = "auth/achievements/";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Request body for login.
#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// Response from login and registration.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    pub user: Identity,
    pub tokens: CredentialPair,
}

/// Request body for token refresh.
#[derive(Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

/// Response from token refresh. `refresh` is present when the service
/// rotates refresh tokens.
#[derive(Deserialize)]
pub struct RefreshResponse {
    pub access: String,
    #[serde(default)]
    pub refresh: Option<String>,
}

/// Request body for logout.
#[derive(Serialize)]
pub struct LogoutRequest<'a> {
    pub refresh_token: &'a str,
}

/// Request body for password change.
#[derive(Serialize)]
pub struct ChangePasswordRequest<'a> {
    pub old_password: &'a str,
    pub new_password: &'a str,
    pub new_password2: &'a str,
}
