use anyhow::{Context, Result};
use promptgate_core::{BackendError, InterceptionKey, OverrideBackend, OverrideSet, Surface};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::sync::Mutex;

const LOCAL_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS override_sets (
    conversation_id   TEXT NOT NULL,
    surface           TEXT NOT NULL,
    scope             TEXT NOT NULL,
    name              TEXT NOT NULL,
    source_request_id TEXT NOT NULL,
    captured_at       TEXT NOT NULL,
    edit_count        INTEGER NOT NULL DEFAULT 0,
    body              TEXT NOT NULL,
    PRIMARY KEY (conversation_id, surface)
);
";

/// Summary row for a persisted override set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideRow {
    pub key: InterceptionKey,
    pub scope: String,
    pub name: String,
    pub source_request_id: String,
    pub captured_at: String,
    pub edit_count: i64,
}

/// Local SQLite database holding workspace-scoped override sets.
/// Thread-safe: wraps the connection in a Mutex so it can be shared via `Arc<LocalDb>`.
pub struct LocalDb {
    conn: Mutex<Connection>,
}

impl LocalDb {
    /// Open (or create) the local database at the default path.
    /// `~/.local/share/promptgate/local.db`
    pub fn open() -> Result<Self> {
        let path = default_db_path()?;
        Self::open_path(&path)
    }

    /// Open (or create) the local database at a specific path.
    pub fn open_path(path: &PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir for {}", path.display()))?;
        }
        let conn =
            Connection::open(path).with_context(|| format!("open db {}", path.display()))?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(LOCAL_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().expect("local db mutex poisoned")
    }

    // ── Override sets ──────────────────────────────────────────────────

    /// Insert or replace the set stored for the set's key.
    pub fn save_override(&self, set: &OverrideSet) -> Result<()> {
        let body = serde_json::to_string(set).context("encode override set")?;
        self.conn().execute(
            "INSERT INTO override_sets \
             (conversation_id, surface, scope, name, source_request_id, \
              captured_at, edit_count, body) \
             VALUES (?1,?2,?3,?4,?5,?6,?7,?8) \
             ON CONFLICT(conversation_id, surface) DO UPDATE SET \
              scope=excluded.scope, name=excluded.name, \
              source_request_id=excluded.source_request_id, \
              captured_at=excluded.captured_at, edit_count=excluded.edit_count, \
              body=excluded.body",
            params![
                &set.key.conversation_id,
                set.key.surface.as_str(),
                set.scope.as_str(),
                &set.name,
                &set.source_request_id,
                set.captured_at.to_rfc3339(),
                set.edits.len() as i64,
                body,
            ],
        )?;
        Ok(())
    }

    pub fn load_override(&self, key: &InterceptionKey) -> Result<Option<OverrideSet>> {
        let body: Option<String> = self
            .conn()
            .query_row(
                "SELECT body FROM override_sets WHERE conversation_id = ?1 AND surface = ?2",
                params![&key.conversation_id, key.surface.as_str()],
                |row| row.get(0),
            )
            .optional()?;
        body.map(|body| {
            serde_json::from_str(&body).with_context(|| format!("decode override set for {key}"))
        })
        .transpose()
    }

    /// Remove the set for `key`. Returns true when a row was deleted.
    pub fn remove_override(&self, key: &InterceptionKey) -> Result<bool> {
        let deleted = self.conn().execute(
            "DELETE FROM override_sets WHERE conversation_id = ?1 AND surface = ?2",
            params![&key.conversation_id, key.surface.as_str()],
        )?;
        Ok(deleted > 0)
    }

    pub fn list_overrides(&self) -> Result<Vec<OverrideRow>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT conversation_id, surface, scope, name, source_request_id, \
             captured_at, edit_count \
             FROM override_sets ORDER BY captured_at DESC",
        )?;
        let rows = stmt.query_map([], row_to_override)?;
        let mut result = Vec::new();
        for row in rows {
            result.push(row?);
        }
        Ok(result)
    }

    pub fn clear_overrides(&self) -> Result<usize> {
        let deleted = self.conn().execute("DELETE FROM override_sets", [])?;
        Ok(deleted)
    }
}

impl OverrideBackend for LocalDb {
    fn load(&self, key: &InterceptionKey) -> Result<Option<OverrideSet>, BackendError> {
        self.load_override(key).map_err(backend_error)
    }

    fn save(&self, set: &OverrideSet) -> Result<(), BackendError> {
        self.save_override(set).map_err(backend_error)
    }

    fn remove(&self, key: &InterceptionKey) -> Result<(), BackendError> {
        self.remove_override(key).map(|_| ()).map_err(backend_error)
    }
}

fn backend_error(e: anyhow::Error) -> BackendError {
    BackendError(format!("{e:#}"))
}

fn row_to_override(row: &rusqlite::Row) -> rusqlite::Result<OverrideRow> {
    Ok(OverrideRow {
        key: InterceptionKey::new(
            row.get::<_, String>(0)?,
            Surface::from(row.get::<_, String>(1)?),
        ),
        scope: row.get(2)?,
        name: row.get(3)?,
        source_request_id: row.get(4)?,
        captured_at: row.get(5)?,
        edit_count: row.get(6)?,
    })
}

pub fn default_db_path() -> Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .context("Could not determine home directory")?;
    Ok(PathBuf::from(home)
        .join(".local")
        .join("share")
        .join("promptgate")
        .join("local.db"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use promptgate_core::{testing, EditableChatRequest, OverrideScope};

    fn test_db() -> LocalDb {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.keep().join("test.db");
        LocalDb::open_path(&path).unwrap()
    }

    fn captured(key: &InterceptionKey, request_id: &str) -> OverrideSet {
        let mut request =
            EditableChatRequest::build(key, &testing::conversation(), testing::seed(request_id));
        request
            .update_section_content("section-0", "Answer in French.")
            .unwrap();
        request.delete_section("section-4").unwrap();
        OverrideSet::capture(key, OverrideScope::Workspace, &request.id, &request.sections)
    }

    #[test]
    fn test_open_and_schema() {
        let _db = test_db();
    }

    #[test]
    fn test_save_and_load_override() {
        let db = test_db();
        let key = testing::key();
        assert_eq!(db.load_override(&key).unwrap(), None);

        let set = captured(&key, "req-1");
        db.save_override(&set).unwrap();
        assert_eq!(db.load_override(&key).unwrap(), Some(set));
    }

    #[test]
    fn test_save_replaces_previous_set() {
        let db = test_db();
        let key = testing::key();
        db.save_override(&captured(&key, "req-1")).unwrap();
        db.save_override(&captured(&key, "req-2")).unwrap();

        let rows = db.list_overrides().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].source_request_id, "req-2");
        assert_eq!(rows[0].edit_count, 2);
        assert_eq!(rows[0].scope, "workspace");
    }

    #[test]
    fn test_keys_are_stored_separately() {
        let db = test_db();
        let panel = testing::key();
        let inline = InterceptionKey::new("conv-1", Surface::Inline);
        db.save_override(&captured(&panel, "a")).unwrap();
        db.save_override(&captured(&inline, "b")).unwrap();

        assert_eq!(db.list_overrides().unwrap().len(), 2);
        assert!(db.remove_override(&panel).unwrap());
        assert!(!db.remove_override(&panel).unwrap());
        assert_eq!(db.load_override(&panel).unwrap(), None);
        assert_eq!(
            db.load_override(&inline).unwrap().unwrap().source_request_id,
            "b"
        );
    }

    #[test]
    fn test_backend_trait_round_trip() {
        let db = test_db();
        let key = testing::key();
        let backend: &dyn OverrideBackend = &db;
        backend.save(&captured(&key, "req-1")).unwrap();
        assert!(backend.load(&key).unwrap().is_some());
        backend.remove(&key).unwrap();
        assert!(backend.load(&key).unwrap().is_none());
    }

    #[test]
    fn test_corrupt_body_fails_load_but_still_lists() {
        let db = test_db();
        let key = testing::key();
        db.save_override(&captured(&key, "req-1")).unwrap();
        db.conn()
            .execute("UPDATE override_sets SET body = 'not json'", [])
            .unwrap();

        assert!(db.load_override(&key).is_err());
        assert!(OverrideBackend::load(&db, &key).is_err());
        assert_eq!(db.list_overrides().unwrap().len(), 1);
        assert_eq!(db.clear_overrides().unwrap(), 1);
    }
}
