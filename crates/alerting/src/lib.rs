//! Alerting System
//!
//! Immutable proctoring alerts and their persisted log.

mod alert;
mod alert_log;

pub use alert::{Alert, AlertKind};
pub use alert_log::{AlertLog, AlertQuery, ALERTS_COLLECTION};

use storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AlertError {
    #[error(transparent)]
    Storage(#[from] StorageError),
}
