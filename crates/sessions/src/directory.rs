//! Teacher accounts

use std::collections::HashMap;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::SessionError;

// Verified against when the username is unknown so both paths cost one hash
const DUMMY_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$ZHVtbXlzYWx0ZHVtbXk$YWJjZGVmZ2hpamtsbW5vcHFyc3R1dnd4eXoxMjM0NTY";

/// Configured teacher account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeacherAccount {
    pub username: String,
    /// Argon2 PHC string
    pub password_hash: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Authenticated teacher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeacherIdentity {
    pub username: String,
    pub display_name: String,
}

/// Hash a password into an Argon2 PHC string
pub fn hash_password(password: &str) -> Result<String, SessionError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|h| h.to_string())
        .map_err(|e| SessionError::Hash(e.to_string()))
}

fn verify(password: &str, hash: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Lookup of teacher accounts by username
#[derive(Debug, Clone, Default)]
pub struct TeacherDirectory {
    accounts: HashMap<String, TeacherAccount>,
}

impl TeacherDirectory {
    /// Build from configured accounts; every hash must be a valid PHC string
    pub fn new(accounts: Vec<TeacherAccount>) -> Result<Self, SessionError> {
        let mut map = HashMap::new();
        for account in accounts {
            if let Err(e) = PasswordHash::new(&account.password_hash) {
                return Err(SessionError::InvalidAccount {
                    username: account.username,
                    reason: e.to_string(),
                });
            }
            map.insert(account.username.clone(), account);
        }
        if map.is_empty() {
            warn!("No teacher accounts configured; privileged routes are unreachable");
        } else {
            info!("Loaded {} teacher accounts", map.len());
        }
        Ok(Self { accounts: map })
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Check credentials
    pub fn login(&self, username: &str, password: &str) -> Option<TeacherIdentity> {
        let Some(account) = self.accounts.get(username) else {
            verify(password, DUMMY_HASH);
            info!("Login rejected for unknown teacher {}", username);
            return None;
        };
        if !verify(password, &account.password_hash) {
            info!("Login rejected for teacher {}", username);
            return None;
        }
        info!("Teacher {} logged in", username);
        Some(TeacherIdentity {
            username: account.username.clone(),
            display_name: account
                .display_name
                .clone()
                .unwrap_or_else(|| account.username.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn directory() -> TeacherDirectory {
        TeacherDirectory::new(vec![TeacherAccount {
            username: "alice".into(),
            password_hash: hash_password("correct horse").unwrap(),
            display_name: Some("Dr. Alice".into()),
        }])
        .unwrap()
    }

    #[test]
    fn test_login() {
        let dir = directory();
        let who = dir.login("alice", "correct horse").unwrap();
        assert_eq!(who.username, "alice");
        assert_eq!(who.display_name, "Dr. Alice");
        assert!(dir.login("alice", "wrong").is_none());
        assert!(dir.login("bob", "correct horse").is_none());
    }

    #[test]
    fn test_rejects_plaintext_hash() {
        let result = TeacherDirectory::new(vec![TeacherAccount {
            username: "carol".into(),
            password_hash: "hunter2".into(),
            display_name: None,
        }]);
        assert!(matches!(result, Err(SessionError::InvalidAccount { .. })));
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify("same", &a) && verify("same", &b));
    }
}
