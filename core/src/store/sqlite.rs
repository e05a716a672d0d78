use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{info, warn};

use crate::errors::StoreError;
use crate::source::{Item, SourceId};
use crate::store::{
    History, HistoryStore, LastHistory, Resource, StoreTransaction, StoredSnapshot,
};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS histories (
    id                    INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id             TEXT NOT NULL,
    normalized_updated_at TEXT NOT NULL,
    source_url            TEXT NOT NULL,
    created_at            TEXT NOT NULL DEFAULT (datetime('now'))
);
CREATE INDEX IF NOT EXISTS idx_histories_source ON histories (source_id, id);

CREATE TABLE IF NOT EXISTS resources (
    id          INTEGER PRIMARY KEY AUTOINCREMENT,
    history_id  INTEGER NOT NULL REFERENCES histories (id),
    name        TEXT NOT NULL,
    url         TEXT NOT NULL,
    artwork_url TEXT NOT NULL,
    artist_name TEXT NOT NULL,
    artist_url  TEXT NOT NULL,
    copyright   TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_resources_history ON resources (history_id, id);
";

const HISTORY_COLUMNS: &str = "id, source_id, normalized_updated_at, source_url";
const RESOURCE_COLUMNS: &str =
    "id, history_id, name, url, artwork_url, artist_name, artist_url, copyright";

/// SQLite-backed history store. One connection, serialized behind a mutex;
/// the batch writes one source at a time so there is nothing to pool.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(|e| StoreError::Connection {
            reason: format!("{}: {}", path.display(), e),
        })?;
        let store = Self::init(conn)?;
        info!("Opened history store at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory().map_err(|e| StoreError::Connection {
            reason: e.to_string(),
        })?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Connection {
            reason: "connection mutex poisoned".to_string(),
        })
    }

    fn row_to_history(row: &Row) -> rusqlite::Result<History> {
        let source_id: String = row.get(1)?;
        Ok(History {
            id: row.get(0)?,
            source_id: SourceId::new(source_id),
            normalized_updated_at: row.get(2)?,
            source_url: row.get(3)?,
        })
    }

    fn row_to_resource(row: &Row) -> rusqlite::Result<Resource> {
        Ok(Resource {
            id: row.get(0)?,
            history_id: row.get(1)?,
            name: row.get(2)?,
            url: row.get(3)?,
            artwork_url: row.get(4)?,
            artist_name: row.get(5)?,
            artist_url: row.get(6)?,
            copyright: row.get(7)?,
        })
    }

    fn query_last_history(
        conn: &Connection,
        source_id: &SourceId,
    ) -> Result<Option<History>, StoreError> {
        let history = conn
            .query_row(
                &format!(
                    "SELECT {HISTORY_COLUMNS} FROM histories
                     WHERE source_id = ?1 ORDER BY id DESC LIMIT 1"
                ),
                params![source_id.as_str()],
                Self::row_to_history,
            )
            .optional()?;
        Ok(history)
    }

    /// The newest history of a source with up to `limit` of its resources in
    /// creation order. `None` returns every resource.
    pub fn latest_snapshot(
        &self,
        source_id: &SourceId,
        limit: Option<usize>,
    ) -> Result<Option<StoredSnapshot>, StoreError> {
        let conn = self.lock()?;
        let Some(history) = Self::query_last_history(&conn, source_id)? else {
            return Ok(None);
        };

        // SQLite treats a negative LIMIT as unbounded.
        let limit = limit.map_or(-1, |n| i64::try_from(n).unwrap_or(i64::MAX));
        let mut stmt = conn.prepare(&format!(
            "SELECT {RESOURCE_COLUMNS} FROM resources
             WHERE history_id = ?1 ORDER BY id LIMIT ?2"
        ))?;
        let resources = stmt
            .query_map(params![history.id, limit], Self::row_to_resource)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Some(StoredSnapshot { history, resources }))
    }

    /// Every committed history of a source, oldest first.
    pub fn histories(&self, source_id: &SourceId) -> Result<Vec<History>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {HISTORY_COLUMNS} FROM histories WHERE source_id = ?1 ORDER BY id"
        ))?;
        let histories = stmt
            .query_map(params![source_id.as_str()], Self::row_to_history)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(histories)
    }

    #[cfg(test)]
    pub(crate) fn with_connection<R>(&self, f: impl FnOnce(&Connection) -> R) -> R {
        let conn = self.conn.lock().unwrap();
        f(&conn)
    }
}

impl HistoryStore for SqliteHistoryStore {
    type Tx<'a>
        = SqliteTransaction<'a>
    where
        Self: 'a;

    fn find_last_history(&self, source_id: &SourceId) -> Result<LastHistory, StoreError> {
        let conn = self.lock()?;
        Ok(match Self::query_last_history(&conn, source_id)? {
            Some(history) => LastHistory::Found(history),
            None => LastHistory::NotFound,
        })
    }

    fn begin(&self) -> Result<SqliteTransaction<'_>, StoreError> {
        let conn = self.lock()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTransaction {
            conn,
            finished: false,
        })
    }
}

/// Holds the connection for the lifetime of one write transaction.
pub struct SqliteTransaction<'a> {
    conn: MutexGuard<'a, Connection>,
    finished: bool,
}

impl SqliteTransaction<'_> {
    /// Runs `COMMIT` or `ROLLBACK`. On failure `finished` stays false so Drop
    /// still rolls back.
    fn end(&mut self, statement: &str) -> rusqlite::Result<()> {
        self.conn.execute_batch(statement)?;
        self.finished = true;
        Ok(())
    }
}

impl StoreTransaction for SqliteTransaction<'_> {
    fn create_history(
        &mut self,
        source_id: &SourceId,
        normalized_updated_at: &str,
        source_url: &str,
    ) -> Result<History, StoreError> {
        self.conn.execute(
            "INSERT INTO histories (source_id, normalized_updated_at, source_url)
             VALUES (?1, ?2, ?3)",
            params![source_id.as_str(), normalized_updated_at, source_url],
        )?;
        Ok(History {
            id: self.conn.last_insert_rowid(),
            source_id: source_id.clone(),
            normalized_updated_at: normalized_updated_at.to_string(),
            source_url: source_url.to_string(),
        })
    }

    fn create_resource(&mut self, history_id: i64, item: &Item) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO resources
                (history_id, name, url, artwork_url, artist_name, artist_url, copyright)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                history_id,
                item.name,
                item.url,
                item.artwork_url,
                item.artist_name,
                item.artist_url,
                item.copyright
            ],
        )?;
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.end("COMMIT")?;
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.end("ROLLBACK").map_err(|e| StoreError::Transaction {
            reason: format!("rollback failed: {e}"),
        })
    }
}

impl Drop for SqliteTransaction<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!("Failed to roll back abandoned transaction: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn item(name: &str) -> Item {
        Item {
            artist_name: format!("{name} artist"),
            artist_url: format!("https://music.example.com/artist/{name}"),
            artwork_url: format!("https://img.example.com/{name}.jpg"),
            copyright: String::new(),
            name: name.to_string(),
            url: format!("https://music.example.com/album/{name}"),
        }
    }

    fn write_history(store: &SqliteHistoryStore, source: &str, updated: &str, names: &[&str]) -> History {
        let mut tx = store.begin().unwrap();
        let history = tx
            .create_history(&SourceId::from(source), updated, "https://feeds.example.com")
            .unwrap();
        for name in names {
            tx.create_resource(history.id, &item(name)).unwrap();
        }
        tx.commit().unwrap();
        history
    }

    #[test]
    fn test_find_last_history_not_found() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let last = store.find_last_history(&SourceId::from("albums")).unwrap();
        assert_eq!(last, LastHistory::NotFound);
    }

    #[test]
    fn test_find_last_history_returns_newest() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        write_history(&store, "albums", "2023-01-01 00:00:00", &["a"]);
        let newest = write_history(&store, "albums", "2023-01-02 00:00:00", &["b"]);
        write_history(&store, "songs", "2023-01-03 00:00:00", &["c"]);

        let last = store.find_last_history(&SourceId::from("albums")).unwrap();
        assert_eq!(last, LastHistory::Found(newest));
    }

    #[test]
    fn test_latest_snapshot_preserves_order_and_limit() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        write_history(&store, "albums", "2023-01-01 00:00:00", &["z", "y", "x"]);

        let snapshot = store
            .latest_snapshot(&SourceId::from("albums"), None)
            .unwrap()
            .unwrap();
        let names: Vec<&str> = snapshot.resources.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["z", "y", "x"]);
        assert!(snapshot.resources.iter().all(|r| r.history_id == snapshot.history.id));

        let limited = store
            .latest_snapshot(&SourceId::from("albums"), Some(2))
            .unwrap()
            .unwrap();
        assert_eq!(limited.resources.len(), 2);
        assert_eq!(limited.resources[0].name, "z");
    }

    #[test]
    fn test_latest_snapshot_for_unknown_source() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        assert!(store
            .latest_snapshot(&SourceId::from("videos"), Some(10))
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_rollback_discards_history_and_resources() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let source = SourceId::from("albums");

        let mut tx = store.begin().unwrap();
        let history = tx.create_history(&source, "2023-01-01 00:00:00", "").unwrap();
        tx.create_resource(history.id, &item("a")).unwrap();
        tx.rollback().unwrap();

        assert!(store.histories(&source).unwrap().is_empty());
        let resources: i64 = store.with_connection(|conn| {
            conn.query_row("SELECT COUNT(*) FROM resources", [], |row| row.get(0))
                .unwrap()
        });
        assert_eq!(resources, 0);
    }

    #[test]
    fn test_dropped_transaction_rolls_back() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let source = SourceId::from("albums");

        {
            let mut tx = store.begin().unwrap();
            tx.create_history(&source, "2023-01-01 00:00:00", "").unwrap();
        }

        assert!(store.histories(&source).unwrap().is_empty());
        // The connection is usable again after the implicit rollback.
        write_history(&store, "albums", "2023-01-02 00:00:00", &[]);
        assert_eq!(store.histories(&source).unwrap().len(), 1);
    }

    #[test]
    fn test_failed_end_leaves_rollback_to_drop() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let source = SourceId::from("albums");

        let mut tx = store.begin().unwrap();
        tx.conn.execute_batch("COMMIT").unwrap();
        assert!(tx.end("ROLLBACK").is_err());
        assert!(!tx.finished);

        // Still inside a transaction when dropped; Drop must end it.
        tx.conn.execute_batch("BEGIN").unwrap();
        tx.create_history(&source, "2023-01-01 00:00:00", "").unwrap();
        drop(tx);

        assert!(store.histories(&source).unwrap().is_empty());
        write_history(&store, "albums", "2023-01-02 00:00:00", &[]);
        assert_eq!(store.histories(&source).unwrap().len(), 1);
    }

    #[test]
    fn test_resource_requires_existing_history() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        let mut tx = store.begin().unwrap();
        let result = tx.create_resource(4242, &item("orphan"));
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
        tx.rollback().unwrap();
    }

    #[test]
    fn test_empty_strings_are_stored_verbatim() {
        let store = SqliteHistoryStore::open_in_memory().unwrap();
        write_history(&store, "albums", "2023-01-01 00:00:00", &["a"]);

        let snapshot = store
            .latest_snapshot(&SourceId::from("albums"), None)
            .unwrap()
            .unwrap();
        assert_eq!(snapshot.resources[0].copyright, "");
    }

    #[test]
    fn test_reopening_file_keeps_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("charts.db");

        {
            let store = SqliteHistoryStore::open(&path).unwrap();
            write_history(&store, "albums", "2023-01-01 00:00:00", &["a", "b"]);
        }

        let store = SqliteHistoryStore::open(&path).unwrap();
        let last = store.find_last_history(&SourceId::from("albums")).unwrap();
        assert_eq!(
            last.history().map(|h| h.normalized_updated_at.as_str()),
            Some("2023-01-01 00:00:00")
        );
    }

    #[test]
    fn test_open_in_missing_directory_is_a_connection_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing").join("charts.db");

        let result = SqliteHistoryStore::open(&path);
        assert!(matches!(result, Err(StoreError::Connection { .. })));
    }
}
