//! Persisted alert log

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use storage::{Filter, Repository};
use tracing::{debug, info, warn};

use crate::{Alert, AlertError, AlertKind};

/// Collection holding alert documents
pub const ALERTS_COLLECTION: &str = "alerts";

/// Alert listing filter
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertQuery {
    pub exam_id: Option<String>,
    pub student_id: Option<String>,
    pub kind: Option<AlertKind>,
    pub limit: Option<usize>,
}

impl AlertQuery {
    fn filter(&self) -> Filter {
        Filter::new()
            .field_opt("exam_id", self.exam_id.as_deref())
            .field_opt("student_id", self.student_id.as_deref())
            .field_opt("kind", self.kind.map(|k| k.as_str()))
    }
}

/// Insert/list/count/reset over the `alerts` collection
#[derive(Clone)]
pub struct AlertLog {
    repo: Arc<Repository>,
}

impl AlertLog {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Persist an alert. Failures are logged, never propagated; returns
    /// whether the alert was stored.
    pub async fn record(&self, alert: &Alert) -> bool {
        let doc = match serde_json::to_value(alert) {
            Ok(doc) => doc,
            Err(e) => {
                warn!("Could not encode alert {}: {}", alert.id, e);
                return false;
            }
        };
        match self.repo.insert(ALERTS_COLLECTION, doc).await {
            Ok(()) => {
                info!(
                    "Alert {} for student {} in exam {}: {:?}",
                    alert.kind, alert.student_id, alert.exam_id, alert.reason
                );
                true
            }
            Err(e) => {
                warn!("Failed to persist {} alert for {}: {}", alert.kind, alert.student_id, e);
                false
            }
        }
    }

    /// Matching alerts, newest first
    pub async fn list(&self, query: &AlertQuery) -> Result<Vec<Alert>, AlertError> {
        let docs = self.repo.find(ALERTS_COLLECTION, &query.filter()).await?;
        let mut alerts: Vec<Alert> = docs
            .into_iter()
            .rev()
            .filter_map(|doc| match serde_json::from_value(doc) {
                Ok(alert) => Some(alert),
                Err(e) => {
                    warn!("Skipping unreadable alert document: {}", e);
                    None
                }
            })
            .collect();
        // Stable: equal timestamps keep newest-inserted first
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        if let Some(limit) = query.limit {
            alerts.truncate(limit);
        }
        Ok(alerts)
    }

    pub async fn count(&self, query: &AlertQuery) -> Result<u64, AlertError> {
        Ok(self.repo.count(ALERTS_COLLECTION, &query.filter()).await?)
    }

    /// Delete an exam's alerts, or one student's alerts within it
    pub async fn reset(&self, exam_id: &str, student_id: Option<&str>) -> Result<u64, AlertError> {
        let filter = Filter::new()
            .field("exam_id", exam_id)
            .field_opt("student_id", student_id);
        let deleted = self.repo.delete_many(ALERTS_COLLECTION, &filter).await?;
        debug!("Reset removed {} alerts for exam {}", deleted, exam_id);
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::{json, Value};

    fn log() -> AlertLog {
        AlertLog::new(Arc::new(Repository::in_memory()))
    }

    fn alert(student: &str, exam: &str, kind: AlertKind) -> Alert {
        Alert::new(student, exam, kind, vec![kind.as_str().to_string()], Value::Null)
    }

    #[tokio::test]
    async fn test_record_and_list_newest_first() {
        let log = log();
        let mut first = alert("s1", "math", AlertKind::Gaze);
        first.created_at -= Duration::seconds(10);
        assert!(log.record(&first).await);
        let second = alert("s1", "math", AlertKind::Audio);
        assert!(log.record(&second).await);

        let listed = log.list(&AlertQuery::default()).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, second.id);
        assert_eq!(listed[1].id, first.id);
    }

    #[tokio::test]
    async fn test_query_filters_and_limit() {
        let log = log();
        log.record(&alert("s1", "math", AlertKind::Gaze)).await;
        log.record(&alert("s2", "math", AlertKind::Object)).await;
        log.record(&alert("s1", "bio", AlertKind::Gaze)).await;

        let q = AlertQuery {
            kind: Some(AlertKind::Gaze),
            ..Default::default()
        };
        assert_eq!(log.count(&q).await.unwrap(), 2);

        let q = AlertQuery {
            exam_id: Some("math".into()),
            student_id: Some("s2".into()),
            ..Default::default()
        };
        let listed = log.list(&q).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].kind, AlertKind::Object);

        let q = AlertQuery {
            limit: Some(1),
            ..Default::default()
        };
        assert_eq!(log.list(&q).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_reset_scope() {
        let log = log();
        log.record(&alert("s1", "math", AlertKind::Gaze)).await;
        log.record(&alert("s2", "math", AlertKind::Gaze)).await;
        log.record(&alert("s1", "bio", AlertKind::Gaze)).await;

        assert_eq!(log.reset("math", Some("s1")).await.unwrap(), 1);
        assert_eq!(log.reset("math", None).await.unwrap(), 1);
        assert_eq!(log.count(&AlertQuery::default()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreadable_documents_are_skipped() {
        let repo = Arc::new(Repository::in_memory());
        repo.insert(ALERTS_COLLECTION, json!({"garbage": true})).await.unwrap();
        let log = AlertLog::new(Arc::clone(&repo));
        log.record(&alert("s1", "math", AlertKind::Identity)).await;
        assert_eq!(log.list(&AlertQuery::default()).await.unwrap().len(), 1);
    }
}
