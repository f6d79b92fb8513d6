//! Face Authentication Module
//!
//! Student identity verification for exam sessions:
//! - Face region detection seam and the exactly-one-face gate
//! - Enrollment store with stable integer labels
//! - LBPH recognizer, retrained on every enrollment change
//! - Claimed-identity matching and open-set identification

pub mod config;
pub mod detector;
pub mod enrollment;
pub mod lbph;
pub mod matcher;

pub use config::FaceAuthConfig;
pub use detector::{FaceGate, FaceRegion, FaceRegionDetector, WholeFrameDetector};
pub use enrollment::{EnrollmentSnapshot, FaceEnrollmentStore, RemovalScope, Template};
pub use lbph::{LbphModel, LbphParams};
pub use matcher::{FaceMatcher, IdentityJudgment, IdentityVerdict, RegionIdentity};

use thiserror::Error;

/// Recognizer label assigned to an enrolled student
pub type LabelId = u32;

/// Student identifier (roll number)
pub type StudentId = String;

/// Face authentication error types
#[derive(Error, Debug)]
pub enum FaceAuthError {
    #[error("Face not detected")]
    NoFace,

    #[error("Expected one face, found {0}")]
    MultipleFaces(usize),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid recognizer configuration: {0}")]
    InvalidConfig(String),

    #[error("Face detection failed: {0}")]
    Detection(String),

    #[error("Recognizer model error: {0}")]
    Model(String),

    #[error("Lock error: {0}")]
    Lock(String),
}

impl FaceAuthError {
    /// Status string reported to exam clients for gate outcomes
    pub fn gate_status(&self) -> Option<&'static str> {
        match self {
            FaceAuthError::NoFace => Some("no_face"),
            FaceAuthError::MultipleFaces(_) => Some("multiple_faces"),
            _ => None,
        }
    }
}
