//! SQLite-backed store for survey definitions and submitted responses.
//!
//! Surveys are keyed by project key and goal. Records are append-only;
//! the only destructive operation is dropping a whole survey.

use async_trait::async_trait;
use fs2::FileExt;
use rusqlite::{params, Connection};
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::hierarchy::Hierarchy;
use crate::record::{RawRecord, RespondentRecord};

pub const DEFAULT_PROJECT_KEY: &str = "public";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveyKey {
    pub project_key: String,
    pub goal: String,
    pub survey_hash: String,
}

impl SurveyKey {
    pub fn new(project_key: &str, goal: &str) -> Self {
        let project_key = match project_key.trim() {
            "" => DEFAULT_PROJECT_KEY,
            key => key,
        };
        let goal = goal.trim();
        Self {
            project_key: project_key.to_string(),
            goal: goal.to_string(),
            survey_hash: hash_fields(&[project_key, goal]),
        }
    }

    /// Short id suitable for survey links.
    pub fn short_id(&self) -> &str {
        &self.survey_hash[..12]
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SurveySummary {
    pub goal: String,
    pub survey_hash: String,
    pub responses: usize,
    pub has_definition: bool,
}

#[async_trait]
pub trait ResponseStore: Send + Sync {
    async fn save_hierarchy(&self, key: &SurveyKey, hierarchy: &Hierarchy) -> Result<(), StoreError>;
    async fn load_hierarchy(&self, key: &SurveyKey) -> Result<Option<Hierarchy>, StoreError>;
    async fn append(&self, key: &SurveyKey, record: &RespondentRecord) -> Result<(), StoreError>;
    async fn load(&self, key: &SurveyKey) -> Result<Vec<RawRecord>, StoreError>;
    async fn list_surveys(&self, project_key: &str) -> Result<Vec<SurveySummary>, StoreError>;
    /// Returns the number of deleted responses.
    async fn delete_survey(&self, key: &SurveyKey) -> Result<usize, StoreError>;
}

#[derive(Clone)]
pub struct SqliteResponseStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteResponseStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;
             CREATE TABLE IF NOT EXISTS surveys (
               survey_hash TEXT PRIMARY KEY,
               project_key TEXT NOT NULL,
               goal TEXT NOT NULL,
               hierarchy_json TEXT NOT NULL,
               created_at INTEGER NOT NULL,
               updated_at INTEGER NOT NULL
             );
             CREATE TABLE IF NOT EXISTS responses (
               id INTEGER PRIMARY KEY AUTOINCREMENT,
               response_id TEXT NOT NULL UNIQUE,
               survey_hash TEXT NOT NULL,
               project_key TEXT NOT NULL,
               goal TEXT NOT NULL,
               respondent TEXT NOT NULL,
               submitted_at TEXT NOT NULL,
               raw_data TEXT NOT NULL,
               created_at INTEGER NOT NULL
             );
             CREATE INDEX IF NOT EXISTS responses_by_survey ON responses (survey_hash, id);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("AHP_STORE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(".ahp_responses.sqlite")
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
}

fn load_rows(conn: &Connection, survey_hash: &str) -> Result<Vec<RawRecord>, StoreError> {
    let mut stmt = conn.prepare(
        "SELECT response_id, respondent, submitted_at, raw_data
         FROM responses WHERE survey_hash = ?1 ORDER BY id ASC",
    )?;
    let mut rows = stmt.query(params![survey_hash])?;
    let mut out = Vec::new();
    while let Some(row) = rows.next()? {
        let response_id: String = row.get(0)?;
        out.push(RawRecord {
            response_id: uuid::Uuid::parse_str(&response_id).ok(),
            respondent: row.get(1)?,
            submitted_at: row.get(2)?,
            raw_data: row.get(3)?,
        });
    }
    Ok(out)
}

#[async_trait]
impl ResponseStore for SqliteResponseStore {
    async fn save_hierarchy(&self, key: &SurveyKey, hierarchy: &Hierarchy) -> Result<(), StoreError> {
        let key = key.clone();
        let json = serde_json::to_string(hierarchy).map_err(|e| StoreError::Serde(e.to_string()))?;
        self.blocking(move |conn| {
            let now = now_epoch();
            conn.execute(
                "INSERT INTO surveys (survey_hash, project_key, goal, hierarchy_json, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(survey_hash) DO UPDATE SET
                    hierarchy_json = excluded.hierarchy_json,
                    updated_at = excluded.updated_at",
                params![key.survey_hash, key.project_key, key.goal, json, now, now],
            )?;
            Ok(())
        })
        .await
    }

    async fn load_hierarchy(&self, key: &SurveyKey) -> Result<Option<Hierarchy>, StoreError> {
        let survey_hash = key.survey_hash.clone();
        let json: Option<String> = self
            .blocking(move |conn| {
                let mut stmt =
                    conn.prepare("SELECT hierarchy_json FROM surveys WHERE survey_hash = ?1")?;
                let mut rows = stmt.query(params![survey_hash])?;
                match rows.next()? {
                    Some(row) => Ok(Some(row.get(0)?)),
                    None => Ok(None),
                }
            })
            .await?;
        json.map(|raw| serde_json::from_str(&raw).map_err(|e| StoreError::Serde(e.to_string())))
            .transpose()
    }

    async fn append(&self, key: &SurveyKey, record: &RespondentRecord) -> Result<(), StoreError> {
        let key = key.clone();
        let raw = record.to_raw().map_err(|e| StoreError::Serde(e.to_string()))?;
        let response_id = record.response_id.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "INSERT INTO responses (
                    response_id, survey_hash, project_key, goal, respondent, submitted_at, raw_data, created_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    response_id,
                    key.survey_hash,
                    key.project_key,
                    key.goal,
                    raw.respondent,
                    raw.submitted_at,
                    raw.raw_data,
                    now_epoch(),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn load(&self, key: &SurveyKey) -> Result<Vec<RawRecord>, StoreError> {
        let survey_hash = key.survey_hash.clone();
        self.blocking(move |conn| load_rows(conn, &survey_hash)).await
    }

    async fn list_surveys(&self, project_key: &str) -> Result<Vec<SurveySummary>, StoreError> {
        let project_key = project_key.to_string();
        self.blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT goal, survey_hash, SUM(responses), MAX(has_definition) FROM (
                    SELECT goal, survey_hash, 1 AS responses, 0 AS has_definition
                      FROM responses WHERE project_key = ?1
                    UNION ALL
                    SELECT goal, survey_hash, 0 AS responses, 1 AS has_definition
                      FROM surveys WHERE project_key = ?1
                 ) GROUP BY survey_hash ORDER BY goal ASC",
            )?;
            let mut rows = stmt.query(params![project_key])?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                out.push(SurveySummary {
                    goal: row.get(0)?,
                    survey_hash: row.get(1)?,
                    responses: row.get::<_, i64>(2)?.max(0) as usize,
                    has_definition: row.get::<_, i64>(3)? != 0,
                });
            }
            Ok(out)
        })
        .await
    }

    async fn delete_survey(&self, key: &SurveyKey) -> Result<usize, StoreError> {
        let survey_hash = key.survey_hash.clone();
        self.blocking(move |conn| {
            let removed = conn.execute(
                "DELETE FROM responses WHERE survey_hash = ?1",
                params![survey_hash],
            )?;
            conn.execute("DELETE FROM surveys WHERE survey_hash = ?1", params![survey_hash])?;
            Ok(removed)
        })
        .await
    }
}

impl SqliteResponseStore {
    /// Write every response of a survey as one JSON object per line.
    pub async fn export_jsonl(&self, key: &SurveyKey, path: impl AsRef<Path>) -> Result<usize, StoreError> {
        let survey_hash = key.survey_hash.clone();
        let path = path.as_ref().to_path_buf();
        self.blocking(move |conn| {
            let rows = load_rows(conn, &survey_hash)?;
            let mut file = std::fs::File::create(path)?;
            for row in &rows {
                let line = serde_json::to_string(row).map_err(|e| StoreError::Serde(e.to_string()))?;
                writeln!(file, "{line}")?;
            }
            Ok(rows.len())
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

fn hash_fields(fields: &[&str]) -> String {
    let mut hasher = blake3::Hasher::new();
    for (idx, field) in fields.iter().enumerate() {
        if idx > 0 {
            hasher.update(b"|");
        }
        hasher.update(field.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
