//! Vector store using SQLite
//!
//! Stores embeddings as little-endian f32 BLOBs and computes similarity in
//! Rust. A full scan is fine for corpora of a few tens of thousands of
//! documents.
//!
//! File-backed stores run in WAL mode. Each concurrent reader gets its own
//! read-only connection, so queries neither wait on each other nor on an
//! indexing run holding the write connection.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Params, Row};
use tracing::debug;

use super::{check_query, check_upsert, VectorStore};
use crate::core::document::Document;
use crate::error::{Result, SearchError};
use crate::search::embedding::cosine_similarity;
use crate::search::types::{rank, IndexStats, IndexedRecord, SearchFilter, SearchResult};

const META_DIMENSION: &str = "dimension";
const META_PROVIDER_TAG: &str = "provider_tag";
const META_LAST_FULL_INDEX: &str = "last_full_index";

const MAX_IDLE_READERS: usize = 8;

const RECORD_COLUMNS: &str =
    "id, title, body, folder, tags, provider_tag, content_hash, embedding";

pub struct SqliteStore {
    writer: Mutex<Connection>,
    readers: Option<ReaderPool>,
}

/// Read-only connections handed out one per concurrent reader.
struct ReaderPool {
    path: PathBuf,
    idle: Mutex<Vec<Connection>>,
}

impl ReaderPool {
    fn open(path: &Path) -> Result<Self> {
        let pool = Self {
            path: path.to_path_buf(),
            idle: Mutex::new(Vec::new()),
        };
        let first = pool.connect()?;
        pool.idle.lock().push(first);
        Ok(pool)
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Ok(conn)
    }

    /// The pool lock is only held to take or return a connection, never
    /// while a query runs.
    fn with<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let pooled = self.idle.lock().pop();
        let conn = match pooled {
            Some(conn) => conn,
            None => self.connect()?,
        };
        let result = f(&conn);

        let mut idle = self.idle.lock();
        if idle.len() < MAX_IDLE_READERS {
            idle.push(conn);
        }
        result
    }
}

impl SqliteStore {
    /// Open or create a database at `db_path`.
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(db_path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        let mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        init_schema(&conn)?;

        let readers = ReaderPool::open(db_path)?;

        debug!(path = %db_path.display(), journal_mode = %mode, "opened vector store");
        Ok(Self {
            writer: Mutex::new(conn),
            readers: Some(readers),
        })
    }

    /// Open in-memory database. Reads and writes share one connection.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        init_schema(&conn)?;
        Ok(Self {
            writer: Mutex::new(conn),
            readers: None,
        })
    }

    fn read<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        match &self.readers {
            Some(readers) => readers.with(f),
            None => f(&self.writer.lock()),
        }
    }

    fn records(&self, sql: &str, params: impl Params) -> Result<Vec<IndexedRecord>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let rows = stmt.query_map(params, read_record)?;
            rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            body TEXT NOT NULL,
            folder TEXT,
            tags TEXT NOT NULL,  -- JSON array
            provider_tag TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            indexed_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_records_folder ON records(folder);
        "#,
    )?;
    Ok(())
}

fn get_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    conn.query_row(
        "SELECT value FROM index_meta WHERE key = ?1",
        params![key],
        |row| row.get(0),
    )
    .optional()
    .map(Option::flatten)
    .map_err(Into::into)
}

fn set_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2) ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn parse_meta<T: std::str::FromStr>(key: &str, value: Option<String>) -> Result<Option<T>> {
    value
        .map(|v| {
            v.parse::<T>()
                .map_err(|_| SearchError::Config(format!("corrupt index metadata {}='{}'", key, v)))
        })
        .transpose()
}

fn read_dimension(conn: &Connection) -> Result<Option<usize>> {
    parse_meta(META_DIMENSION, get_meta(conn, META_DIMENSION)?)
}

fn read_record(row: &Row<'_>) -> rusqlite::Result<IndexedRecord> {
    let tags_json: String = row.get(4)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?;
    let blob: Vec<u8> = row.get(7)?;
    let embedding = blob_to_embedding(&blob).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            7,
            Type::Blob,
            format!("embedding blob of {} bytes is not a whole number of f32", blob.len()).into(),
        )
    })?;

    Ok(IndexedRecord {
        document: Document {
            id: row.get(0)?,
            title: row.get(1)?,
            body: row.get(2)?,
            folder: row.get(3)?,
            tags,
        },
        provider_tag: row.get(5)?,
        content_hash: row.get(6)?,
        embedding,
    })
}

impl VectorStore for SqliteStore {
    fn create_schema(&self, dimension: usize) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        match read_dimension(&tx)? {
            Some(existing) if existing != dimension => {
                return Err(SearchError::DimensionConflict {
                    existing,
                    requested: dimension,
                })
            }
            Some(_) => {}
            None => set_meta(&tx, META_DIMENSION, &dimension.to_string())?,
        }
        tx.commit()?;
        Ok(())
    }

    fn dimension(&self) -> Result<Option<usize>> {
        self.read(read_dimension)
    }

    fn provider_tag(&self) -> Result<Option<String>> {
        self.read(|conn| get_meta(conn, META_PROVIDER_TAG))
    }

    fn upsert(&self, record: &IndexedRecord) -> Result<()> {
        let tags_json = serde_json::to_string(&record.document.tags)?;
        let embedding_blob = embedding_to_blob(&record.embedding);
        let now = chrono::Utc::now().timestamp();

        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        let index_tag = get_meta(&tx, META_PROVIDER_TAG)?;
        check_upsert(read_dimension(&tx)?, index_tag.as_deref(), record)?;
        if index_tag.is_none() {
            set_meta(&tx, META_PROVIDER_TAG, &record.provider_tag)?;
        }

        let doc = &record.document;
        tx.execute(
            r#"
            INSERT INTO records (id, title, body, folder, tags, provider_tag, content_hash, embedding, indexed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            ON CONFLICT(id) DO UPDATE SET
                title = excluded.title,
                body = excluded.body,
                folder = excluded.folder,
                tags = excluded.tags,
                provider_tag = excluded.provider_tag,
                content_hash = excluded.content_hash,
                embedding = excluded.embedding,
                indexed_at = excluded.indexed_at
            "#,
            params![
                doc.id,
                doc.title,
                doc.body,
                doc.folder,
                tags_json,
                record.provider_tag,
                record.content_hash,
                embedding_blob,
                now,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn delete(&self, id: &str) -> Result<bool> {
        let removed = self
            .writer
            .lock()
            .execute("DELETE FROM records WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    fn query_similar(
        &self,
        vector: &[f32],
        limit: usize,
        filter: Option<&SearchFilter>,
    ) -> Result<Vec<SearchResult>> {
        check_query(self.dimension()?, vector)?;
        if limit == 0 {
            return Ok(Vec::new());
        }

        let folder = filter.and_then(|f| f.folder.as_deref());
        let sql = format!(
            "SELECT {} FROM records WHERE (?1 IS NULL OR folder = ?1)",
            RECORD_COLUMNS
        );
        let results = self
            .records(&sql, params![folder])?
            .into_iter()
            .filter(|r| filter.map_or(true, |f| f.matches(&r.document)))
            .map(|r| {
                let similarity = cosine_similarity(vector, &r.embedding);
                SearchResult::vector(r.document, similarity)
            })
            .collect();

        Ok(rank(results, limit))
    }

    fn list_all(&self) -> Result<Vec<Document>> {
        let sql = format!("SELECT {} FROM records ORDER BY id", RECORD_COLUMNS);
        Ok(self
            .records(&sql, [])?
            .into_iter()
            .map(|r| r.document)
            .collect())
    }

    fn get_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.get_record(id)?.map(|r| r.document))
    }

    fn get_record(&self, id: &str) -> Result<Option<IndexedRecord>> {
        let sql = format!("SELECT {} FROM records WHERE id = ?1", RECORD_COLUMNS);
        Ok(self.records(&sql, params![id])?.into_iter().next())
    }

    fn list_folders(&self) -> Result<Vec<String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT folder FROM records WHERE folder IS NOT NULL AND folder != '' ORDER BY folder",
            )?;
            let rows = stmt.query_map([], |row| row.get(0))?;
            rows.collect::<rusqlite::Result<Vec<String>>>().map_err(Into::into)
        })
    }

    fn fingerprints(&self) -> Result<HashMap<String, String>> {
        self.read(|conn| {
            let mut stmt = conn.prepare("SELECT id, content_hash FROM records")?;
            let rows = stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?;
            rows.collect::<rusqlite::Result<HashMap<_, _>>>().map_err(Into::into)
        })
    }

    fn mark_indexed(&self, timestamp: i64) -> Result<()> {
        set_meta(&self.writer.lock(), META_LAST_FULL_INDEX, &timestamp.to_string())
    }

    fn stats(&self) -> Result<IndexStats> {
        self.read(|conn| {
            let record_count: i64 =
                conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
            let folder_count: i64 = conn.query_row(
                "SELECT COUNT(DISTINCT folder) FROM records WHERE folder IS NOT NULL AND folder != ''",
                [],
                |row| row.get(0),
            )?;

            Ok(IndexStats {
                record_count: record_count as usize,
                dimension: read_dimension(conn)?,
                provider_tag: get_meta(conn, META_PROVIDER_TAG)?,
                folder_count: folder_count as usize,
                last_indexed: parse_meta(
                    META_LAST_FULL_INDEX,
                    get_meta(conn, META_LAST_FULL_INDEX)?,
                )?,
            })
        })
    }

    fn clear(&self) -> Result<()> {
        let mut conn = self.writer.lock();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM records", [])?;
        tx.execute("DELETE FROM index_meta", [])?;
        tx.commit()?;
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.readers.is_some() {
            self.writer
                .lock()
                .query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        Ok(())
    }
}

/// Convert f32 embedding to BLOB
fn embedding_to_blob(embedding: &[f32]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(embedding.len() * 4);
    for &val in embedding {
        blob.extend_from_slice(&val.to_le_bytes());
    }
    blob
}

/// Convert BLOB to f32 embedding. `None` if the length is not a multiple of 4.
fn blob_to_embedding(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::contract;

    #[test]
    fn test_blob_conversion() {
        let embedding = vec![1.0, 2.0, 3.0, -0.5];
        let blob = embedding_to_blob(&embedding);
        assert_eq!(blob_to_embedding(&blob), Some(embedding));
        assert_eq!(blob_to_embedding(&[0, 1, 2]), None);
    }

    #[test]
    fn test_store_contract_in_memory() {
        contract::run_all(|| SqliteStore::open_in_memory().unwrap());
    }

    #[test]
    fn test_store_contract_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let counter = std::sync::atomic::AtomicUsize::new(0);
        contract::run_all(|| {
            let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            SqliteStore::open(&dir.path().join(format!("index-{}.db", n))).unwrap()
        });
    }

    #[test]
    fn test_reopen_keeps_records_and_meta() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("nested").join("index.db");

        {
            let store = SqliteStore::open(&path)?;
            store.create_schema(2)?;
            let doc = Document::new("guides/rust", "Rust", "Ownership and borrowing")
                .with_folder("guides")
                .with_tags(["lang"]);
            store.upsert(&IndexedRecord::new(doc, vec![0.25, -0.5], "local:hash-ngram-v2:2"))?;
            store.close()?;
        }

        let store = SqliteStore::open(&path)?;
        assert_eq!(store.dimension()?, Some(2));
        assert_eq!(store.provider_tag()?.as_deref(), Some("local:hash-ngram-v2:2"));
        let record = store.get_record("guides/rust")?.expect("record persisted");
        assert_eq!(record.embedding, vec![0.25, -0.5]);
        assert_eq!(record.document.tags, vec!["lang".to_string()]);
        assert_eq!(record.content_hash, record.document.content_hash());
        assert!(matches!(
            store.create_schema(3),
            Err(SearchError::DimensionConflict { existing: 2, requested: 3 })
        ));
        Ok(())
    }

    #[test]
    fn test_readers_run_side_by_side_during_write() -> Result<()> {
        use std::sync::Barrier;

        let dir = tempfile::tempdir()?;
        let store = SqliteStore::open(&dir.path().join("index.db"))?;
        store.create_schema(2)?;
        store.upsert(&IndexedRecord::new(
            Document::new("a", "Alpha", "first"),
            vec![1.0, 0.0],
            "local:hash-ngram-v2:2",
        ))?;

        // Uncommitted write holding the writer connection.
        let writer = store.writer.lock();
        writer.execute_batch("BEGIN IMMEDIATE; DELETE FROM records;")?;

        // Both readers must be inside a read at the same time to pass the barrier.
        let barrier = &Barrier::new(2);
        let shared = &store;
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    s.spawn(move || {
                        shared.read(|conn| {
                            barrier.wait();
                            let count: i64 =
                                conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
                            Ok(count)
                        })
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap().unwrap(), 1);
            }
        });
        let results = store.query_similar(&[1.0, 0.0], 5, None)?;
        assert_eq!(results.len(), 1);

        writer.execute_batch("ROLLBACK;")?;
        drop(writer);
        assert_eq!(store.stats()?.record_count, 1);
        Ok(())
    }
}
