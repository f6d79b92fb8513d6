//! Repository Implementation

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use serde_json::Value;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tracing::{debug, info, warn};

use crate::{Filter, StorageError};

/// A stored document; always a JSON object
pub type Document = Value;

const SCHEMA: [&str; 3] = [
    "CREATE TABLE IF NOT EXISTS collections (name TEXT PRIMARY KEY)",
    "CREATE TABLE IF NOT EXISTS documents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        collection TEXT NOT NULL,
        body TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_documents_collection ON documents (collection, id)",
];

enum Backend {
    Memory(Mutex<BTreeMap<String, Vec<Document>>>),
    Sqlite(SqlitePool),
}

/// Document repository over SQLite or memory
pub struct Repository {
    backend: Backend,
}

impl Repository {
    /// Create a new in-memory repository
    pub fn in_memory() -> Self {
        info!("Creating in-memory repository");
        Self {
            backend: Backend::Memory(Mutex::new(BTreeMap::new())),
        }
    }

    /// Connect to SQLite, falling back to memory when no URL is given or
    /// the database cannot be opened
    pub async fn connect(url: Option<&str>) -> Self {
        let Some(url) = url.map(str::trim).filter(|u| !u.is_empty()) else {
            info!("No database configured");
            return Self::in_memory();
        };
        match Self::with_sqlite(url).await {
            Ok(repo) => repo,
            Err(e) => {
                warn!("Database unavailable ({}), falling back to memory", e);
                Self::in_memory()
            }
        }
    }

    /// Open a SQLite database and create the schema
    pub async fn with_sqlite(url: &str) -> Result<Self, StorageError> {
        // Each connection to an in-memory SQLite database gets its own database
        let max_connections = if url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        for statement in SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        info!("Connected to SQLite at {}", url);
        Ok(Self {
            backend: Backend::Sqlite(pool),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Memory(_) => "memory",
            Backend::Sqlite(_) => "sqlite",
        }
    }

    fn memory_lock(
        store: &Mutex<BTreeMap<String, Vec<Document>>>,
    ) -> Result<std::sync::MutexGuard<'_, BTreeMap<String, Vec<Document>>>, StorageError> {
        store
            .lock()
            .map_err(|e| StorageError::DatabaseError(format!("Lock error: {}", e)))
    }

    /// Create the collection if it does not exist
    pub async fn ensure_collection(&self, collection: &str) -> Result<(), StorageError> {
        match &self.backend {
            Backend::Memory(store) => {
                Self::memory_lock(store)?.entry(collection.to_string()).or_default();
            }
            Backend::Sqlite(pool) => {
                sqlx::query("INSERT OR IGNORE INTO collections (name) VALUES (?)")
                    .bind(collection)
                    .execute(pool)
                    .await?;
            }
        }
        Ok(())
    }

    /// Insert a document
    pub async fn insert(&self, collection: &str, doc: Document) -> Result<(), StorageError> {
        if !doc.is_object() {
            return Err(StorageError::InvalidDocument(
                "document must be a JSON object".into(),
            ));
        }
        match &self.backend {
            Backend::Memory(store) => {
                Self::memory_lock(store)?
                    .entry(collection.to_string())
                    .or_default()
                    .push(doc);
            }
            Backend::Sqlite(pool) => {
                let body = serde_json::to_string(&doc)?;
                let mut tx = pool.begin().await?;
                sqlx::query("INSERT OR IGNORE INTO collections (name) VALUES (?)")
                    .bind(collection)
                    .execute(&mut *tx)
                    .await?;
                sqlx::query("INSERT INTO documents (collection, body) VALUES (?, ?)")
                    .bind(collection)
                    .bind(body)
                    .execute(&mut *tx)
                    .await?;
                tx.commit().await?;
            }
        }
        debug!("Inserted document into {}", collection);
        Ok(())
    }

    async fn sqlite_rows(
        pool: &SqlitePool,
        collection: &str,
        filter: &Filter,
    ) -> Result<Vec<(i64, Document)>, StorageError> {
        let rows: Vec<(i64, String)> =
            sqlx::query_as("SELECT id, body FROM documents WHERE collection = ? ORDER BY id")
                .bind(collection)
                .fetch_all(pool)
                .await?;
        let mut matched = Vec::new();
        for (id, body) in rows {
            let doc: Document = serde_json::from_str(&body)?;
            if filter.matches(&doc) {
                matched.push((id, doc));
            }
        }
        Ok(matched)
    }

    /// Documents matching the filter, in insertion order
    pub async fn find(&self, collection: &str, filter: &Filter) -> Result<Vec<Document>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(Self::memory_lock(store)?
                .get(collection)
                .map(|docs| docs.iter().filter(|d| filter.matches(d)).cloned().collect())
                .unwrap_or_default()),
            Backend::Sqlite(pool) => Ok(Self::sqlite_rows(pool, collection, filter)
                .await?
                .into_iter()
                .map(|(_, doc)| doc)
                .collect()),
        }
    }

    /// Delete matching documents; returns how many were removed
    pub async fn delete_many(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError> {
        let deleted = match &self.backend {
            Backend::Memory(store) => {
                let mut store = Self::memory_lock(store)?;
                match store.get_mut(collection) {
                    Some(docs) => {
                        let before = docs.len();
                        docs.retain(|d| !filter.matches(d));
                        (before - docs.len()) as u64
                    }
                    None => 0,
                }
            }
            Backend::Sqlite(pool) => {
                let ids: Vec<i64> = Self::sqlite_rows(pool, collection, filter)
                    .await?
                    .into_iter()
                    .map(|(id, _)| id)
                    .collect();
                let mut tx = pool.begin().await?;
                for id in &ids {
                    sqlx::query("DELETE FROM documents WHERE id = ?")
                        .bind(id)
                        .execute(&mut *tx)
                        .await?;
                }
                tx.commit().await?;
                ids.len() as u64
            }
        };
        debug!("Deleted {} documents from {}", deleted, collection);
        Ok(deleted)
    }

    /// Count matching documents
    pub async fn count(&self, collection: &str, filter: &Filter) -> Result<u64, StorageError> {
        match &self.backend {
            Backend::Sqlite(pool) if filter.is_empty() => {
                let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM documents WHERE collection = ?")
                    .bind(collection)
                    .fetch_one(pool)
                    .await?;
                Ok(n.max(0) as u64)
            }
            _ => Ok(self.find(collection, filter).await?.len() as u64),
        }
    }

    /// Names of every known collection
    pub async fn list_collections(&self) -> Result<BTreeSet<String>, StorageError> {
        match &self.backend {
            Backend::Memory(store) => Ok(Self::memory_lock(store)?.keys().cloned().collect()),
            Backend::Sqlite(pool) => {
                let rows: Vec<(String,)> = sqlx::query_as("SELECT name FROM collections")
                    .fetch_all(pool)
                    .await?;
                Ok(rows.into_iter().map(|(name,)| name).collect())
            }
        }
    }
}

impl Default for Repository {
    fn default() -> Self {
        Self::in_memory()
    }
}
