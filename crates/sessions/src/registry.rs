//! Bearer session registry

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::TeacherIdentity;

const TOKEN_BYTES: usize = 32;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Token lifetime in hours
    pub ttl_hours: i64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self { ttl_hours: 4 }
    }
}

/// Token handed back on login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct Session {
    identity: TeacherIdentity,
    expires_at: DateTime<Utc>,
}

/// Token -> identity map with fixed expiry and no renewal
pub struct SessionRegistry {
    ttl: Duration,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(config: &SessionConfig) -> Self {
        Self {
            ttl: Duration::hours(config.ttl_hours.max(0)),
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // Entries are inserted or removed whole; poisoning is ignored
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Issue a fresh token for the identity
    pub fn issue(&self, identity: TeacherIdentity) -> IssuedToken {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        let token = hex::encode(bytes);
        let expires_at = Utc::now() + self.ttl;

        debug!("Issued session for {} until {}", identity.username, expires_at);
        self.lock().insert(
            token.clone(),
            Session {
                identity,
                expires_at,
            },
        );
        IssuedToken { token, expires_at }
    }

    pub fn validate(&self, token: &str) -> Option<TeacherIdentity> {
        self.validate_at(token, Utc::now())
    }

    /// Validate as of `now`; an expired token is evicted and stays invalid
    pub fn validate_at(&self, token: &str, now: DateTime<Utc>) -> Option<TeacherIdentity> {
        let mut sessions = self.lock();
        let expired = match sessions.get(token) {
            None => return None,
            Some(session) => now > session.expires_at,
        };
        if expired {
            sessions.remove(token);
            debug!("Evicted expired session");
            return None;
        }
        sessions.get(token).map(|s| s.identity.clone())
    }

    /// Drop a token; returns whether it existed
    pub fn revoke(&self, token: &str) -> bool {
        self.lock().remove(token).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(&SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn teacher() -> TeacherIdentity {
        TeacherIdentity {
            username: "alice".into(),
            display_name: "Alice".into(),
        }
    }

    #[test]
    fn test_issue_and_validate() {
        let registry = SessionRegistry::default();
        let issued = registry.issue(teacher());
        assert_eq!(issued.token.len(), 64);
        assert!(issued.token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(registry.validate(&issued.token), Some(teacher()));
        assert_eq!(registry.validate("nope"), None);
    }

    #[test]
    fn test_expired_token_stays_invalid() {
        let registry = SessionRegistry::default();
        let issued = registry.issue(teacher());
        let later = issued.expires_at + Duration::seconds(1);

        assert_eq!(registry.validate_at(&issued.token, later), None);
        assert_eq!(registry.len(), 0);
        // No resurrection, even at an earlier clock reading
        assert_eq!(registry.validate_at(&issued.token, Utc::now()), None);
    }

    #[test]
    fn test_valid_until_expiry_instant() {
        let registry = SessionRegistry::default();
        let issued = registry.issue(teacher());
        assert!(registry.validate_at(&issued.token, issued.expires_at).is_some());
        assert!(issued.expires_at - Utc::now() <= Duration::hours(4));
    }

    #[test]
    fn test_revoke() {
        let registry = SessionRegistry::default();
        let issued = registry.issue(teacher());
        assert!(registry.revoke(&issued.token));
        assert!(!registry.revoke(&issued.token));
        assert!(registry.validate(&issued.token).is_none());
    }

    proptest! {
        #[test]
        fn prop_tokens_unique(n in 1usize..50) {
            let registry = SessionRegistry::default();
            let tokens: std::collections::HashSet<_> =
                (0..n).map(|_| registry.issue(teacher()).token).collect();
            prop_assert_eq!(tokens.len(), n);
            prop_assert_eq!(registry.len(), n);
        }
    }
}
