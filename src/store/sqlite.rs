//! SQLite-backed store for rosters, comparison records and standings.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use super::{AssetResolver, ComparisonStore, Leaderboard, RosterSource, StoreError};
use crate::model::{AssetHandle, ComparisonKey, ParticipantId, Roster, Standing};

#[derive(Clone)]
pub struct SqliteStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS participants ( \
               id TEXT PRIMARY KEY, \
               asset_url TEXT NOT NULL, \
               wins INTEGER NOT NULL DEFAULT 0, \
               created_at INTEGER NOT NULL, \
               updated_at INTEGER NOT NULL \
             ); \
             CREATE TABLE IF NOT EXISTS comparison_records ( \
               owner TEXT NOT NULL, \
               record_key TEXT NOT NULL, \
               created_at INTEGER NOT NULL, \
               PRIMARY KEY (owner, record_key) \
             );",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("COMPAREE_STORE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".comparee.sqlite")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lock_exclusive(&self) -> Result<StoreLock, StoreError> {
        StoreLock::new(&self.path)
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    async fn blocking<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError> + Send + 'static,
        R: Send + 'static,
    {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.with_conn(f))
            .await
            .map_err(|e| StoreError::Join(e.to_string()))?
    }

    /// Adds a participant, or updates the asset URL of an existing one.
    pub async fn register_participant(
        &self,
        id: &ParticipantId,
        asset_url: &str,
    ) -> Result<(), StoreError> {
        let id = id.as_str().to_string();
        let asset_url = asset_url.to_string();
        self.blocking(move |conn| {
            let now = now_epoch();
            conn.execute(
                "INSERT INTO participants (id, asset_url, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?3) \
                 ON CONFLICT(id) DO UPDATE SET \
                    asset_url = excluded.asset_url, \
                    updated_at = excluded.updated_at",
                params![id, asset_url, now],
            )?;
            Ok(())
        })
        .await
    }

    /// Account deletion: drops the roster row and every record the participant owns.
    pub async fn delete_participant(
        &self,
        id: &ParticipantId,
    ) -> Result<DeleteStats, StoreError> {
        let id = id.as_str().to_string();
        self.blocking(move |conn| {
            let tx = conn.unchecked_transaction()?;
            let records_deleted =
                tx.execute("DELETE FROM comparison_records WHERE owner = ?1", params![id])?;
            let participant_deleted =
                tx.execute("DELETE FROM participants WHERE id = ?1", params![id])? > 0;
            tx.commit()?;
            Ok(DeleteStats {
                participant_deleted,
                records_deleted,
            })
        })
        .await
    }

    pub async fn export_jsonl(&self, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let path = path.as_ref().to_path_buf();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT owner, record_key, created_at \
                 FROM comparison_records ORDER BY owner, created_at, record_key",
            )?;
            let mut rows = stmt.query([])?;
            let mut file = std::fs::File::create(path)?;
            let mut written = 0;
            while let Some(row) = rows.next()? {
                let record = RecordExportRow {
                    owner: row.get(0)?,
                    key: row.get(1)?,
                    created_at: row.get(2)?,
                };
                let line = serde_json::to_string(&record)
                    .map_err(|e| StoreError::Serde(e.to_string()))?;
                use std::io::Write;
                writeln!(file, "{line}")?;
                written += 1;
            }
            Ok(written)
        })
        .await
    }
}

#[async_trait]
impl RosterSource for SqliteStore {
    async fn fetch_roster(&self) -> Result<Roster, StoreError> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM participants ORDER BY rowid")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .map(|id| id.map(ParticipantId::from))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Roster::new(ids))
        })
        .await
    }
}

#[async_trait]
impl ComparisonStore for SqliteStore {
    async fn contains(
        &self,
        owner: &ParticipantId,
        key: &ComparisonKey,
    ) -> Result<bool, StoreError> {
        let owner = owner.as_str().to_string();
        let key = key.as_str().to_string();
        self.blocking(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM comparison_records WHERE owner = ?1 AND record_key = ?2",
                    params![owner, key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn append(&self, owner: &ParticipantId, key: &ComparisonKey) -> Result<(), StoreError> {
        let owner = owner.as_str().to_string();
        let key = key.as_str().to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT OR IGNORE INTO comparison_records (owner, record_key, created_at) \
                 VALUES (?1, ?2, ?3)",
                params![owner, key, now_epoch()],
            )?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl AssetResolver for SqliteStore {
    async fn resolve_asset(&self, participant: &ParticipantId) -> Result<AssetHandle, StoreError> {
        let participant = participant.clone();
        self.blocking(move |conn| {
            let url: Option<String> = conn
                .query_row(
                    "SELECT asset_url FROM participants WHERE id = ?1",
                    params![participant.as_str()],
                    |row| row.get(0),
                )
                .optional()?;
            match url {
                Some(url) => Ok(AssetHandle { participant, url }),
                None => Err(StoreError::UnknownParticipant(participant)),
            }
        })
        .await
    }
}

#[async_trait]
impl Leaderboard for SqliteStore {
    async fn award(&self, winner: &ParticipantId) -> Result<(), StoreError> {
        let winner = winner.clone();
        self.blocking(move |conn| {
            let updated = conn.execute(
                "UPDATE participants SET wins = wins + 1, updated_at = ?1 WHERE id = ?2",
                params![now_epoch(), winner.as_str()],
            )?;
            if updated == 0 {
                return Err(StoreError::UnknownParticipant(winner));
            }
            Ok(())
        })
        .await
    }

    async fn standings(&self, limit: Option<usize>) -> Result<Vec<Standing>, StoreError> {
        let limit = sql_limit(limit);
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, wins FROM participants WHERE wins > 0 \
                 ORDER BY wins DESC, id ASC LIMIT ?1",
            )?;
            let rows = stmt
                .query_map(params![limit], |row| {
                    Ok(Standing {
                        participant: ParticipantId::from(row.get::<_, String>(0)?),
                        wins: row.get::<_, i64>(1)?.max(0) as u64,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
        .await
    }
}

#[derive(Debug)]
pub struct StoreLock {
    _file: std::fs::File,
}

impl StoreLock {
    fn new(db_path: &Path) -> Result<Self, StoreError> {
        let mut lock_path = db_path.to_path_buf();
        lock_path.set_extension("lock");
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

#[derive(Debug, Serialize)]
pub struct RecordExportRow {
    pub owner: String,
    pub key: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeleteStats {
    pub participant_deleted: bool,
    pub records_deleted: usize,
}

/// SQLite treats a negative LIMIT as unbounded; oversized limits clamp instead of wrapping.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map_or(-1, |l| i64::try_from(l).unwrap_or(i64::MAX))
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_limit_clamps_instead_of_going_negative() {
        assert_eq!(sql_limit(None), -1);
        assert_eq!(sql_limit(Some(3)), 3);
        assert_eq!(sql_limit(Some(usize::MAX)), i64::MAX);
    }
}
