//! SQLite-backed persistence for [`PersistedSession`] rows (§4.7).
//!
//! Grounded in the same `SqliteStore`/`rusqlite`/`thiserror` shape the
//! daemon binary uses for its own task/session persistence: a thin wrapper
//! around a `Connection`, an idempotent `migrate()` run on open, and a
//! narrow trait describing the operations the orchestrator actually needs.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("sqlite error: {source}")]
    Sql {
        #[from]
        source: rusqlite::Error,
    },
    #[error("timestamp parse error for value '{value}': {source}")]
    TimestampParse {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}

/// One row per `(project_id, source, target)`. `conversation_json` is an
/// opaque blob the orchestrator round-trips but never parses; only the
/// owning `LlmClient` implementation understands its shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedSession {
    pub project_id: String,
    pub source: String,
    pub target: String,
    pub model_key: String,
    pub provider_id: String,
    pub conversation_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Contract a session store must satisfy. `upsert` both creates (on first
/// successful `generate_docs`) and updates (on every `refine_docs`) a row;
/// `updated_at` is managed by the implementation, not the caller.
pub trait SessionStore: Send + Sync {
    fn list(&self, project_id: &str) -> Result<Vec<PersistedSession>, PersistenceError>;
    fn get(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<PersistedSession>, PersistenceError>;
    #[allow(clippy::too_many_arguments)]
    fn upsert(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
        model_key: &str,
        provider_id: &str,
        conversation_json: &str,
    ) -> Result<(), PersistenceError>;
    fn delete(&self, project_id: &str, source: &str, target: &str) -> Result<(), PersistenceError>;
}

/// `rusqlite`-backed implementation, bundled (no system libsqlite3
/// dependency) the way the daemon binary's own store is configured.
#[derive(Debug)]
pub struct SqliteSessionStore {
    conn: Connection,
}

impl SqliteSessionStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn migrate(&self) -> Result<(), PersistenceError> {
        self.conn.execute_batch(
            r#"
CREATE TABLE IF NOT EXISTS sessions (
    project_id TEXT NOT NULL,
    source TEXT NOT NULL,
    target TEXT NOT NULL,
    model_key TEXT NOT NULL,
    provider_id TEXT NOT NULL,
    conversation_json TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    PRIMARY KEY (project_id, source, target)
);

CREATE INDEX IF NOT EXISTS idx_sessions_project ON sessions(project_id);
"#,
        )?;
        Ok(())
    }

    fn parse_timestamp(value: &str) -> Result<DateTime<Utc>, PersistenceError> {
        DateTime::parse_from_rfc3339(value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|source| PersistenceError::TimestampParse {
                value: value.to_string(),
                source,
            })
    }

    fn row_to_session(row: &rusqlite::Row<'_>) -> rusqlite::Result<(String, String, String, String, String, String, String, String)> {
        Ok((
            row.get(0)?,
            row.get(1)?,
            row.get(2)?,
            row.get(3)?,
            row.get(4)?,
            row.get(5)?,
            row.get(6)?,
            row.get(7)?,
        ))
    }

    fn to_persisted(
        fields: (String, String, String, String, String, String, String, String),
    ) -> Result<PersistedSession, PersistenceError> {
        let (project_id, source, target, model_key, provider_id, conversation_json, created_at, updated_at) = fields;
        Ok(PersistedSession {
            project_id,
            source,
            target,
            model_key,
            provider_id,
            conversation_json,
            created_at: Self::parse_timestamp(&created_at)?,
            updated_at: Self::parse_timestamp(&updated_at)?,
        })
    }
}

impl SessionStore for SqliteSessionStore {
    fn list(&self, project_id: &str) -> Result<Vec<PersistedSession>, PersistenceError> {
        let mut stmt = self.conn.prepare(
            "SELECT project_id, source, target, model_key, provider_id, conversation_json, created_at, updated_at
             FROM sessions WHERE project_id = ?1 ORDER BY updated_at DESC",
        )?;
        let rows = stmt.query_map(params![project_id], Self::row_to_session)?;
        let mut sessions = Vec::new();
        for row in rows {
            sessions.push(Self::to_persisted(row?)?);
        }
        Ok(sessions)
    }

    fn get(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
    ) -> Result<Option<PersistedSession>, PersistenceError> {
        let row = self
            .conn
            .query_row(
                "SELECT project_id, source, target, model_key, provider_id, conversation_json, created_at, updated_at
                 FROM sessions WHERE project_id = ?1 AND source = ?2 AND target = ?3",
                params![project_id, source, target],
                Self::row_to_session,
            )
            .optional()?;
        row.map(Self::to_persisted).transpose()
    }

    fn upsert(
        &self,
        project_id: &str,
        source: &str,
        target: &str,
        model_key: &str,
        provider_id: &str,
        conversation_json: &str,
    ) -> Result<(), PersistenceError> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO sessions (project_id, source, target, model_key, provider_id, conversation_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(project_id, source, target) DO UPDATE SET
                model_key = excluded.model_key,
                provider_id = excluded.provider_id,
                conversation_json = excluded.conversation_json,
                updated_at = excluded.updated_at",
            params![project_id, source, target, model_key, provider_id, conversation_json, now],
        )?;
        Ok(())
    }

    fn delete(&self, project_id: &str, source: &str, target: &str) -> Result<(), PersistenceError> {
        self.conn.execute(
            "DELETE FROM sessions WHERE project_id = ?1 AND source = ?2 AND target = ?3",
            params![project_id, source, target],
        )?;
        Ok(())
    }
}
