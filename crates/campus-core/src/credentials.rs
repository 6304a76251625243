//! Login and registration inputs.

use std::fmt;

use serde::Serialize;

/// Login credentials: the account email and password.
///
/// # Security
///
/// The password is never exposed in Debug output to prevent accidental logging.
///
/// # Example
///
/// ```
/// use campus_core::Credentials;
///
/// let creds = Credentials::new("ada@example.com", "hunter22");
/// assert_eq!(creds.email(), "ada@example.com");
/// ```
#[derive(Clone)]
pub struct Credentials {
    email: String,
    password: String,
}

impl Credentials {
    /// Create new credentials.
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the account email.
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the password.
    ///
    /// # Security
    ///
    /// Use this only when constructing authentication requests.
    pub fn password(&self) -> &str {
        &self.password
    }
}

// Intentionally hide password in Debug output
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Account registration details.
///
/// Serialises to the registration body the service expects, including the
/// password confirmation field.
#[derive(Clone, Serialize)]
pub struct Registration {
    pub email: String,
    pub username: String,
    password: String,
    password2: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub last_name: String,
}

impl Registration {
    /// Create a registration with the password confirmed.
    pub fn new(
        email: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            email: email.into(),
            username: username.into(),
            password2: password.clone(),
            password,
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    /// Set the display name fields.
    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("email", &self.email)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("first_name", &self.first_name)
            .field("last_name", &self.last_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_hides_password_in_debug() {
        let creds = Credentials::new("ada@example.com", "secret123");
        let debug = format!("{:?}", creds);
        assert!(debug.contains("ada@example.com"));
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn registration_body_confirms_password() {
        let reg = Registration::new("ada@example.com", "ada", "s3cret!").with_name("Ada", "");
        let body = serde_json::to_value(&reg).unwrap();
        assert_eq!(body["password"], "s3cret!");
        assert_eq!(body["password2"], "s3cret!");
        assert_eq!(body["first_name"], "Ada");
        assert!(body.get("last_name").is_none());
        assert!(!format!("{:?}", reg).contains("s3cret!"));
    }
}
