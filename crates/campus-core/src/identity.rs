//! The signed-in user's profile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The user profile the service returns for the current session.
///
/// Fields the client does not model are kept in `extra` so a profile
/// round-trips without losing data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub level: u32,
    /// Total experience earned across the platform.
    #[serde(default, rename = "total_points", alias = "total_experience")]
    pub experience: u64,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Identity {
    /// A minimal identity, mostly useful in tests and fixtures.
    pub fn new(id: u64, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            avatar: None,
            bio: String::new(),
            level: 0,
            experience: 0,
            extra: Map::new(),
        }
    }

    /// Display name, falling back to the username.
    pub fn display_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let full = full.trim();
        if full.is_empty() {
            self.username.clone()
        } else {
            full.to_string()
        }
    }

    /// Merge a patch into this identity.
    ///
    /// Only fields present in the patch change; everything else is kept.
    pub fn apply(&mut self, patch: &IdentityPatch) {
        if let Some(ref username) = patch.username {
            self.username = username.clone();
        }
        if let Some(ref email) = patch.email {
            self.email = email.clone();
        }
        if let Some(ref first_name) = patch.first_name {
            self.first_name = first_name.clone();
        }
        if let Some(ref last_name) = patch.last_name {
            self.last_name = last_name.clone();
        }
        if let Some(ref avatar) = patch.avatar {
            self.avatar = Some(avatar.clone());
        }
        if let Some(ref bio) = patch.bio {
            self.bio = bio.clone();
        }
        if let Some(level) = patch.level {
            self.level = level;
        }
        if let Some(experience) = patch.experience {
            self.experience = experience;
        }
        for (key, value) in &patch.extra {
            self.extra.insert(key.clone(), value.clone());
        }
    }
}

/// A partial profile update.
///
/// Serialises only the fields that are set, so it doubles as a `PATCH` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdentityPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bio: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<u32>,
    #[serde(
        default,
        rename = "total_points",
        alias = "total_experience",
        skip_serializing_if = "Option::is_none"
    )]
    pub experience: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdentityPatch {
    /// Returns true if the patch would change nothing.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}
