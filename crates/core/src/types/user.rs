//! Account identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::email::Email;
use super::id::UserId;
use super::role::Role;

/// The identity half of a session: who is signed in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: UserId,
    pub email: Email,
    /// Display name.
    pub username: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl UserProfile {
    /// Whether this account may manage inventory.
    #[must_use]
    pub const fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_role_defaults_to_user() {
        let profile: UserProfile = serde_json::from_str(
            r#"{"id": 3, "email": "demo@example.com", "username": "Demo User"}"#,
        )
        .unwrap();
        assert_eq!(profile.role, Role::User);
        assert!(!profile.is_admin());
    }
}
