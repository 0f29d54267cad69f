//! Signed-in identity and bearer credential.

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sweetshop_core::UserProfile;

/// An authenticated session.
///
/// Implements `Debug` manually to redact the token.
#[derive(Clone)]
pub struct Session {
    user: UserProfile,
    token: SecretString,
}

impl Session {
    #[must_use]
    pub const fn new(user: UserProfile, token: SecretString) -> Self {
        Self { user, token }
    }

    #[must_use]
    pub const fn user(&self) -> &UserProfile {
        &self.user
    }

    /// Bearer credential for API calls.
    #[must_use]
    pub const fn token(&self) -> &SecretString {
        &self.token
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// On-disk form of a session.
#[derive(Serialize, Deserialize)]
pub struct PersistedSession {
    pub user: UserProfile,
    pub token: String,
}

impl From<PersistedSession> for Session {
    fn from(persisted: PersistedSession) -> Self {
        Self::new(persisted.user, SecretString::from(persisted.token))
    }
}

impl From<&Session> for PersistedSession {
    fn from(session: &Session) -> Self {
        Self {
            user: session.user.clone(),
            token: session.token.expose_secret().to_string(),
        }
    }
}

/// Holds at most one session.
#[derive(Debug, Default)]
pub struct SessionStore {
    current: Option<Session>,
}

impl SessionStore {
    #[must_use]
    pub const fn new() -> Self {
        Self { current: None }
    }

    /// Start a session, replacing any existing one.
    pub fn login(&mut self, session: Session) {
        self.current = Some(session);
    }

    /// End the session, returning it if there was one.
    pub fn logout(&mut self) -> Option<Session> {
        self.current.take()
    }

    #[must_use]
    pub const fn current(&self) -> Option<&Session> {
        self.current.as_ref()
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserProfile> {
        self.current.as_ref().map(Session::user)
    }

    #[must_use]
    pub fn token(&self) -> Option<&SecretString> {
        self.current.as_ref().map(Session::token)
    }

    #[must_use]
    pub const fn is_authenticated(&self) -> bool {
        self.current.is_some()
    }

    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.user().is_some_and(UserProfile::is_admin)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use chrono::Utc;
    use sweetshop_core::{Email, Role, UserId};

    use super::*;

    fn profile(role: Role) -> UserProfile {
        UserProfile {
            id: UserId::new(1),
            email: Email::parse("admin@example.com").unwrap(),
            username: "Admin".to_string(),
            role,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_login_logout() {
        let mut sessions = SessionStore::new();
        assert!(!sessions.is_authenticated());

        sessions.login(Session::new(
            profile(Role::Admin),
            SecretString::from("mock-token-1"),
        ));
        assert!(sessions.is_authenticated());
        assert!(sessions.is_admin());

        let ended = sessions.logout().unwrap();
        assert_eq!(ended.token().expose_secret(), "mock-token-1");
        assert!(sessions.token().is_none());
        assert!(!sessions.is_admin());
    }

    #[test]
    fn test_debug_redacts_token() {
        let session = Session::new(profile(Role::User), SecretString::from("mock-token-xyz"));
        let debug_output = format!("{session:?}");
        assert!(debug_output.contains("[REDACTED]"));
        assert!(!debug_output.contains("mock-token-xyz"));
    }

    #[test]
    fn test_persisted_round_trip() {
        let session = Session::new(profile(Role::User), SecretString::from("mock-token-1"));
        let json = serde_json::to_string(&PersistedSession::from(&session)).unwrap();
        let restored: Session = serde_json::from_str::<PersistedSession>(&json).unwrap().into();
        assert_eq!(restored.user(), session.user());
        assert_eq!(restored.token().expose_secret(), "mock-token-1");
    }
}
