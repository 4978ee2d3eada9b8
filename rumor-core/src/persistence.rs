//! SQLite-backed [`RumorRepository`].
//!
//! Each [`Rumor`] is serialised to JSON and stored in a single table. A few
//! columns are lifted out of the blob so listing can filter and order in SQL:
//!
//! ```sql
//! CREATE TABLE IF NOT EXISTS rumors (
//!     id          TEXT PRIMARY KEY,
//!     status      TEXT NOT NULL,
//!     severity    TEXT NOT NULL,
//!     severity_rank INTEGER NOT NULL,
//!     truth_value REAL NOT NULL,
//!     category_tags TEXT NOT NULL,
//!     search_text TEXT NOT NULL,
//!     created_at  TEXT NOT NULL,
//!     updated_at  TEXT NOT NULL,
//!     version     INTEGER NOT NULL,
//!     data        BLOB NOT NULL,
//!     checksum    TEXT
//! );
//! ```
//!
//! - WAL mode for concurrent reads.
//! - JSON inside a BLOB keeps the schema stable as the aggregate grows.
//! - Optional CRC-32 checksum detects corrupted rows.
//! - Backup through SQLite's online-backup API.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags, params};
use tracing::{debug, info, warn};

use crate::config::PersistenceConfig;
use crate::error::{Result, RumorError};
use crate::repository::{ListQuery, RumorPage, RumorRepository, RumorStatistics};
use crate::rumor::Rumor;
use crate::types::{RumorId, Severity};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS rumors (
        id          TEXT PRIMARY KEY,
        status      TEXT NOT NULL,
        severity    TEXT NOT NULL,
        severity_rank INTEGER NOT NULL,
        truth_value REAL NOT NULL,
        category_tags TEXT NOT NULL,
        search_text TEXT NOT NULL,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL,
        version     INTEGER NOT NULL,
        data        BLOB NOT NULL,
        checksum    TEXT
    );
    CREATE INDEX IF NOT EXISTS idx_rumors_created ON rumors (created_at DESC, id);
    CREATE INDEX IF NOT EXISTS idx_rumors_status ON rumors (status);";

/// Shared `WHERE` clause of the listing queries.
///
/// `category_tags` holds every tag wrapped in commas (`,gossip,military,`);
/// `?5` is a JSON array of wanted tags.
const LIST_FILTER: &str = "(?1 IS NULL OR status = ?1)
      AND (?2 IS NULL OR instr(search_text, ?2) > 0)
      AND (?3 IS NULL OR severity_rank >= ?3)
      AND (?4 IS NULL OR truth_value >= ?4)
      AND (?5 IS NULL OR EXISTS (
            SELECT 1 FROM json_each(?5) WHERE instr(category_tags, ',' || value || ',') > 0))";

// ---------------------------------------------------------------------------
// CRC-32 checksum helper
// ---------------------------------------------------------------------------

/// CRC-32 (ISO 3309) of `data` as lowercase hex.
fn crc32_hex(data: &[u8]) -> String {
    format!("{:08x}", crc32_compute(data))
}

fn crc32_compute(data: &[u8]) -> u32 {
    const POLY: u32 = 0xEDB8_8320;
    let mut crc: u32 = 0xFFFF_FFFF;
    for &byte in data {
        crc ^= u32::from(byte);
        for _ in 0..8 {
            crc = if crc & 1 == 1 { (crc >> 1) ^ POLY } else { crc >> 1 };
        }
    }
    !crc
}

/// Fixed-width UTC timestamp, so text order equals time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn severity_rank(severity: Severity) -> i64 {
    i64::from(severity as u8)
}

fn category_tags(rumor: &Rumor) -> String {
    let mut tags = String::from(",");
    for category in &rumor.categories {
        tags.push_str(category.as_str());
        tags.push(',');
    }
    tags
}

fn version_param(version: u64) -> Result<i64> {
    i64::try_from(version).map_err(|_| RumorError::Serialization(format!("version {version} overflows")))
}

// ---------------------------------------------------------------------------
// SqliteRepository
// ---------------------------------------------------------------------------

/// Rumor storage in an SQLite database.
///
/// ```no_run
/// # use rumor_core::persistence::SqliteRepository;
/// # use rumor_core::config::PersistenceConfig;
/// let repo = SqliteRepository::open("rumors.db", &PersistenceConfig::default())?;
/// assert!(repo.integrity_check()?);
/// # Ok::<(), rumor_core::error::RumorError>(())
/// ```
pub struct SqliteRepository {
    conn: Mutex<Connection>,
    config: PersistenceConfig,
    db_path: PathBuf,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository")
            .field("db_path", &self.db_path)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open (or create) a database at `path`.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] on SQLite failures.
    pub fn open<P: AsRef<Path>>(path: P, config: &PersistenceConfig) -> Result<Self> {
        let db_path = path.as_ref().to_path_buf();
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(&db_path, flags)?;

        if config.wal_mode {
            conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        }
        conn.execute_batch("PRAGMA synchronous = NORMAL;")?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        conn.execute_batch(SCHEMA)?;

        info!(path = %db_path.display(), wal = config.wal_mode, "Rumor store opened");

        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path,
        })
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] on SQLite failures.
    pub fn open_in_memory(config: &PersistenceConfig) -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            config: config.clone(),
            db_path: PathBuf::from(":memory:"),
        })
    }

    fn encode(&self, rumor: &Rumor) -> Result<(Vec<u8>, Option<String>)> {
        let json = serde_json::to_vec(rumor).map_err(|e| RumorError::Serialization(e.to_string()))?;
        let checksum = self.config.checksum_enabled.then(|| crc32_hex(&json));
        Ok((json, checksum))
    }

    fn decode(&self, id: &str, data: &[u8], stored_checksum: Option<&str>) -> Result<Rumor> {
        if self.config.checksum_enabled {
            if let Some(expected) = stored_checksum {
                let actual = crc32_hex(data);
                if expected != actual {
                    warn!(rumor = %id, expected = %expected, actual = %actual, "Checksum mismatch, row may be corrupt");
                }
            }
        }
        serde_json::from_slice(data).map_err(|e| RumorError::Serialization(format!("rumor {id}: {e}")))
    }

    fn stored_version(conn: &Connection, id: RumorId) -> Result<Option<u64>> {
        let version: Option<i64> = conn
            .query_row(
                "SELECT version FROM rumors WHERE id = ?1",
                params![id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(version.map(|v| u64::try_from(v).unwrap_or_default()))
    }

    // ------------------------------------------------------------------
    // Maintenance
    // ------------------------------------------------------------------

    /// Number of stored rumors.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] on SQLite failures.
    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM rumors", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Copy the database to `dest_path` with SQLite's online-backup API.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] on SQLite failures.
    pub fn backup<P: AsRef<Path>>(&self, dest_path: P) -> Result<()> {
        let start = Instant::now();
        let conn = self.conn.lock();
        let mut dest = Connection::open(dest_path.as_ref())?;
        let backup = rusqlite::backup::Backup::new(&conn, &mut dest)?;
        backup.run_to_completion(256, Duration::from_millis(50), None)?;
        info!(
            dest = %dest_path.as_ref().display(),
            elapsed_ms = start.elapsed().as_millis(),
            "Rumor store backup completed"
        );
        Ok(())
    }

    /// Run `PRAGMA integrity_check`.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] if the check itself fails.
    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn
            .lock()
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    /// Reclaim unused space.
    ///
    /// # Errors
    /// Returns [`RumorError::Database`] on SQLite failures.
    pub fn vacuum(&self) -> Result<()> {
        self.conn.lock().execute_batch("VACUUM;")?;
        Ok(())
    }

    /// Path of the database file, or `:memory:`.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

impl RumorRepository for SqliteRepository {
    fn get_by_id(&self, id: RumorId) -> Result<Option<Rumor>> {
        let start = Instant::now();
        let id_str = id.to_string();
        let row: Option<(Vec<u8>, Option<String>)> = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT data, checksum FROM rumors WHERE id = ?1")?;
            stmt.query_row(params![id_str], |row| Ok((row.get(0)?, row.get(1)?)))
                .optional()?
        };
        let Some((data, checksum)) = row else {
            return Ok(None);
        };
        let rumor = self.decode(&id_str, &data, checksum.as_deref())?;
        debug!(rumor = %id, bytes = data.len(), elapsed_us = start.elapsed().as_micros(), "Loaded rumor");
        Ok(Some(rumor))
    }

    fn create(&self, rumor: &Rumor) -> Result<()> {
        let (json, checksum) = self.encode(rumor)?;
        let conn = self.conn.lock();
        let inserted = conn.execute(
            "INSERT INTO rumors
                (id, status, severity, severity_rank, truth_value, category_tags,
                 search_text, created_at, updated_at, version, data, checksum)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
             ON CONFLICT(id) DO NOTHING",
            params![
                rumor.id.to_string(),
                rumor.status().as_str(),
                rumor.severity().as_str(),
                severity_rank(rumor.severity()),
                rumor.truth_value(),
                category_tags(rumor),
                rumor.original_text.to_lowercase(),
                timestamp(rumor.created_at),
                timestamp(rumor.updated_at),
                version_param(rumor.version)?,
                json,
                checksum,
            ],
        )?;
        if inserted == 0 {
            let found = Self::stored_version(&conn, rumor.id)?.unwrap_or_default();
            return Err(RumorError::VersionConflict {
                rumor: rumor.id,
                expected: rumor.version,
                found,
            });
        }
        debug!(rumor = %rumor.id, bytes = json.len(), "Stored new rumor");
        Ok(())
    }

    fn update(&self, rumor: &mut Rumor) -> Result<()> {
        let start = Instant::now();
        let mut next = rumor.clone();
        next.version += 1;
        let (json, checksum) = self.encode(&next)?;

        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE rumors SET
                status = ?2, updated_at = ?3, version = ?4, data = ?5, checksum = ?6
             WHERE id = ?1 AND version = ?7",
            params![
                rumor.id.to_string(),
                next.status().as_str(),
                timestamp(next.updated_at),
                version_param(next.version)?,
                json,
                checksum,
                version_param(rumor.version)?,
            ],
        )?;
        if updated == 0 {
            return Err(match Self::stored_version(&conn, rumor.id)? {
                None => RumorError::RumorNotFound(rumor.id),
                Some(found) => RumorError::VersionConflict {
                    rumor: rumor.id,
                    expected: rumor.version,
                    found,
                },
            });
        }
        rumor.version = next.version;
        debug!(
            rumor = %rumor.id,
            version = rumor.version,
            bytes = json.len(),
            elapsed_us = start.elapsed().as_micros(),
            "Updated rumor"
        );
        Ok(())
    }

    fn delete(&self, id: RumorId) -> Result<bool> {
        let deleted = self
            .conn
            .lock()
            .execute("DELETE FROM rumors WHERE id = ?1", params![id.to_string()])?;
        Ok(deleted > 0)
    }

    fn list(&self, query: &ListQuery) -> Result<RumorPage> {
        let status = query.status.map(|s| s.as_str());
        let needle = query.needle();
        let min_rank = query.min_severity.map(severity_rank);
        let min_truth = query.min_truth.map(|t| t.0);
        let categories = if query.categories.is_empty() {
            None
        } else {
            let tags: Vec<&str> = query.categories.iter().map(|c| c.as_str()).collect();
            Some(serde_json::to_string(&tags).map_err(|e| RumorError::Serialization(e.to_string()))?)
        };
        let limit = i64::try_from(query.page_size).unwrap_or(i64::MAX);
        let offset = i64::try_from(query.offset()).unwrap_or(i64::MAX);

        let (total, rows) = {
            let conn = self.conn.lock();
            let total: i64 = conn.query_row(
                &format!("SELECT COUNT(*) FROM rumors WHERE {LIST_FILTER}"),
                params![status, needle, min_rank, min_truth, categories],
                |row| row.get(0),
            )?;
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT id, data, checksum FROM rumors
                 WHERE {LIST_FILTER}
                 ORDER BY created_at DESC, id ASC
                 LIMIT ?6 OFFSET ?7"
            ))?;
            let rows = stmt
                .query_map(params![status, needle, min_rank, min_truth, categories, limit, offset], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Vec<u8>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            (total, rows)
        };

        let items = rows
            .iter()
            .map(|(id, data, checksum)| self.decode(id, data, checksum.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(RumorPage {
            items,
            total: usize::try_from(total).unwrap_or_default(),
            page: query.page,
            page_size: query.page_size,
        })
    }

    fn statistics(&self) -> Result<RumorStatistics> {
        let rows = {
            let conn = self.conn.lock();
            let mut stmt = conn.prepare_cached("SELECT id, data, checksum FROM rumors")?;
            stmt.query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, Option<String>>(2)?,
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?
        };
        let rumors = rows
            .iter()
            .map(|(id, data, checksum)| self.decode(id, data, checksum.as_deref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(RumorStatistics::from_rumors(&rumors))
    }
}

/// Adds `.optional()` to `rusqlite::Result`, turning
/// `QueryReturnedNoRows` into `Ok(None)`.
trait OptionalExt<T> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> std::result::Result<Option<T>, rusqlite::Error> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
