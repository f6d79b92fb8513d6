//! Teacher Sessions
//!
//! Privileged access for the proctor dashboard:
//! - Teacher accounts with Argon2 password hashes
//! - Opaque random bearer tokens with a fixed lifetime
//! - Lazy eviction of expired tokens

pub mod directory;
pub mod registry;

pub use directory::{hash_password, TeacherAccount, TeacherDirectory, TeacherIdentity};
pub use registry::{IssuedToken, SessionConfig, SessionRegistry};

use thiserror::Error;

/// Session error types
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Password hashing failed: {0}")]
    Hash(String),

    #[error("Invalid teacher account {username}: {reason}")]
    InvalidAccount { username: String, reason: String },
}
