//! Durable job records, the one entity that must survive across
//! bounded-time invocations.
//!
//! The `JobStore` trait is the seam to the persistence backend; the
//! SQLite implementation here is the reference store used by tests and
//! single-node deployments. One scheduler drives a given job, so no
//! locking discipline beyond atomic field updates is required; a
//! job-claim/lease mechanism for racing invocations is out of scope.

use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::config::SubmissionConfig;
use crate::error::StoreError;
use crate::types::{AnnotationResult, Job, JobStatus, UnitPayload, WorkUnit};

/// Everything persisted at submission time so later invocations can resume
/// with identical parameters.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub file_name: String,
    pub config: SubmissionConfig,
    /// Original header row (labels mode); `None` for quote jobs.
    pub header: Option<Vec<String>>,
    pub units: Vec<WorkUnit>,
}

/// Persistence seam for jobs, their queued units, and per-unit results.
pub trait JobStore: Send + Sync {
    /// Create a pending job and persist its unit sequence atomically.
    fn create_job(&self, new_job: &NewJob) -> Result<Job, StoreError>;

    fn get_job(&self, job_id: &str) -> Result<Job, StoreError>;

    /// The submission parameters and header persisted with the job.
    fn get_submission(
        &self,
        job_id: &str,
    ) -> Result<(SubmissionConfig, Option<Vec<String>>), StoreError>;

    /// Load up to `limit` units starting at `offset` in index order.
    fn load_units(&self, job_id: &str, offset: u32, limit: u32)
        -> Result<Vec<WorkUnit>, StoreError>;

    /// Append results from one invocation.
    fn store_results(&self, job_id: &str, results: &[AnnotationResult]) -> Result<(), StoreError>;

    /// All results stored so far, in index order.
    fn load_results(&self, job_id: &str) -> Result<Vec<AnnotationResult>, StoreError>;

    /// Advance `processed_units`. Monotonic: never writes a smaller value.
    fn update_progress(&self, job_id: &str, processed_units: u32) -> Result<(), StoreError>;

    /// Transition pending → processing. A no-op when already processing.
    fn set_processing(&self, job_id: &str) -> Result<(), StoreError>;

    /// Terminal transition with the assembled artifact.
    fn mark_completed(&self, job_id: &str, payload: &str) -> Result<(), StoreError>;

    /// Terminal transition with the failure message.
    fn mark_failed(&self, job_id: &str, message: &str) -> Result<(), StoreError>;
}

// ═══════════════════════════════════════════
// SQLite reference implementation
// ═══════════════════════════════════════════

const SCHEMA_V1: &str = "
CREATE TABLE jobs (
    id              TEXT PRIMARY KEY,
    file_name       TEXT NOT NULL,
    total_units     INTEGER NOT NULL,
    processed_units INTEGER NOT NULL DEFAULT 0,
    status          TEXT NOT NULL DEFAULT 'pending',
    config          TEXT NOT NULL,
    header          TEXT,
    result_payload  TEXT,
    error_message   TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE work_units (
    job_id      TEXT NOT NULL REFERENCES jobs(id),
    unit_index  INTEGER NOT NULL,
    source_name TEXT NOT NULL,
    payload     TEXT NOT NULL,
    PRIMARY KEY (job_id, unit_index)
);

CREATE TABLE unit_results (
    job_id      TEXT NOT NULL REFERENCES jobs(id),
    unit_index  INTEGER NOT NULL,
    source_name TEXT NOT NULL,
    payload     TEXT NOT NULL,
    output      TEXT NOT NULL,
    PRIMARY KEY (job_id, unit_index)
);

CREATE TABLE schema_version (version INTEGER NOT NULL);
INSERT INTO schema_version (version) VALUES (1);
";

/// SQLite-backed job store. The connection lives behind a mutex so the
/// store is shareable with the async runner.
pub struct SqliteJobStore {
    conn: Mutex<Connection>,
}

impl SqliteJobStore {
    /// Open (or create) a store at the given path and run migrations.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory store (for testing).
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        configure_pragmas(&conn)?;
        run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Connection> {
        // A poisoned mutex means another store call panicked mid-write;
        // the connection itself is still usable.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn configure_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    let current_version = get_current_version(conn);
    let migrations: Vec<(i64, &str)> = vec![(1, SCHEMA_V1)];

    for (version, sql) in migrations {
        if version > current_version {
            tracing::info!("Running job-store migration v{version}");
            conn.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed {
                    version,
                    reason: e.to_string(),
                })?;
        }
    }
    Ok(())
}

fn get_current_version(conn: &Connection) -> i64 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, i64>(0)
    })
    .unwrap_or(0)
}

fn now_iso() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

impl JobStore for SqliteJobStore {
    fn create_job(&self, new_job: &NewJob) -> Result<Job, StoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;

        let id = Uuid::new_v4().to_string();
        let now = now_iso();
        let config_json = serde_json::to_string(&new_job.config)
            .map_err(|e| StoreError::Json(e.to_string()))?;
        let header_json = new_job
            .header
            .as_ref()
            .map(|h| serde_json::to_string(h))
            .transpose()
            .map_err(|e| StoreError::Json(e.to_string()))?;

        tx.execute(
            "INSERT INTO jobs
             (id, file_name, total_units, processed_units, status, config, header,
              created_at, updated_at)
             VALUES (?1, ?2, ?3, 0, 'pending', ?4, ?5, ?6, ?6)",
            params![
                id,
                new_job.file_name,
                new_job.units.len() as u32,
                config_json,
                header_json,
                now,
            ],
        )?;

        for unit in &new_job.units {
            let payload_json = serde_json::to_string(&unit.payload)
                .map_err(|e| StoreError::Json(e.to_string()))?;
            tx.execute(
                "INSERT INTO work_units (job_id, unit_index, source_name, payload)
                 VALUES (?1, ?2, ?3, ?4)",
                params![id, unit.index as i64, unit.source_name, payload_json],
            )?;
        }

        tx.commit()?;

        Ok(Job {
            id,
            file_name: new_job.file_name.clone(),
            total_units: new_job.units.len() as u32,
            processed_units: 0,
            status: JobStatus::Pending,
            result_payload: None,
            error_message: None,
            created_at: now.clone(),
            updated_at: now,
        })
    }

    fn get_job(&self, job_id: &str) -> Result<Job, StoreError> {
        let conn = self.lock();
        let row = conn
            .query_row(
                "SELECT id, file_name, total_units, processed_units, status,
                        result_payload, error_message, created_at, updated_at
                 FROM jobs WHERE id = ?1",
                params![job_id],
                |row| {
                    Ok(JobRow {
                        id: row.get(0)?,
                        file_name: row.get(1)?,
                        total_units: row.get(2)?,
                        processed_units: row.get(3)?,
                        status: row.get(4)?,
                        result_payload: row.get(5)?,
                        error_message: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::JobNotFound(job_id.to_string()),
                _ => StoreError::Sqlite(e),
            })?;

        job_from_row(row)
    }

    fn get_submission(
        &self,
        job_id: &str,
    ) -> Result<(SubmissionConfig, Option<Vec<String>>), StoreError> {
        let conn = self.lock();
        let (config_json, header_json): (String, Option<String>) = conn
            .query_row(
                "SELECT config, header FROM jobs WHERE id = ?1",
                params![job_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => StoreError::JobNotFound(job_id.to_string()),
                _ => StoreError::Sqlite(e),
            })?;

        let config: SubmissionConfig = serde_json::from_str(&config_json)
            .map_err(|e| StoreError::Json(format!("bad stored config: {e}")))?;
        let header = header_json
            .map(|h| serde_json::from_str(&h))
            .transpose()
            .map_err(|e| StoreError::Json(format!("bad stored header: {e}")))?;

        Ok((config, header))
    }

    fn load_units(
        &self,
        job_id: &str,
        offset: u32,
        limit: u32,
    ) -> Result<Vec<WorkUnit>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT unit_index, source_name, payload
             FROM work_units
             WHERE job_id = ?1 AND unit_index >= ?2
             ORDER BY unit_index ASC
             LIMIT ?3",
        )?;

        let rows = stmt.query_map(params![job_id, offset as i64, limit as i64], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut units = Vec::new();
        for row in rows {
            let (index, source_name, payload_json) = row?;
            let payload: UnitPayload = serde_json::from_str(&payload_json)
                .map_err(|e| StoreError::Json(format!("bad stored unit payload: {e}")))?;
            units.push(WorkUnit {
                index: index as usize,
                payload,
                source_name,
            });
        }
        Ok(units)
    }

    fn store_results(&self, job_id: &str, results: &[AnnotationResult]) -> Result<(), StoreError> {
        let conn = self.lock();
        let tx = conn.unchecked_transaction()?;

        for result in results {
            let payload_json = serde_json::to_string(&result.payload)
                .map_err(|e| StoreError::Json(e.to_string()))?;
            let output_json = serde_json::to_string(&result.output)
                .map_err(|e| StoreError::Json(e.to_string()))?;
            tx.execute(
                "INSERT OR REPLACE INTO unit_results
                 (job_id, unit_index, source_name, payload, output)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    job_id,
                    result.unit_index as i64,
                    result.source_name,
                    payload_json,
                    output_json
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }

    fn load_results(&self, job_id: &str) -> Result<Vec<AnnotationResult>, StoreError> {
        let conn = self.lock();
        let mut stmt = conn.prepare(
            "SELECT unit_index, source_name, payload, output
             FROM unit_results
             WHERE job_id = ?1
             ORDER BY unit_index ASC",
        )?;

        let rows = stmt.query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (index, source_name, payload_json, output_json) = row?;
            let payload = serde_json::from_str(&payload_json)
                .map_err(|e| StoreError::Json(format!("bad stored result payload: {e}")))?;
            let output = serde_json::from_str(&output_json)
                .map_err(|e| StoreError::Json(format!("bad stored result output: {e}")))?;
            results.push(AnnotationResult {
                unit_index: index as usize,
                payload,
                output,
                source_name,
            });
        }
        Ok(results)
    }

    fn update_progress(&self, job_id: &str, processed_units: u32) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs
             SET processed_units = MAX(processed_units, ?1), updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('completed', 'failed')",
            params![processed_units, now_iso(), job_id],
        )?;
        terminal_guard(&conn, job_id, updated)
    }

    fn set_processing(&self, job_id: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'processing', updated_at = ?1
             WHERE id = ?2 AND status IN ('pending', 'processing')",
            params![now_iso(), job_id],
        )?;
        terminal_guard(&conn, job_id, updated)
    }

    fn mark_completed(&self, job_id: &str, payload: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs
             SET status = 'completed', result_payload = ?1,
                 processed_units = total_units, updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('completed', 'failed')",
            params![payload, now_iso(), job_id],
        )?;
        terminal_guard(&conn, job_id, updated)
    }

    fn mark_failed(&self, job_id: &str, message: &str) -> Result<(), StoreError> {
        let conn = self.lock();
        let updated = conn.execute(
            "UPDATE jobs SET status = 'failed', error_message = ?1, updated_at = ?2
             WHERE id = ?3 AND status NOT IN ('completed', 'failed')",
            params![message, now_iso(), job_id],
        )?;
        terminal_guard(&conn, job_id, updated)
    }
}

/// Distinguish "no such job" from "job is terminal" when an update touched
/// zero rows.
fn terminal_guard(conn: &Connection, job_id: &str, updated: usize) -> Result<(), StoreError> {
    if updated > 0 {
        return Ok(());
    }
    let exists: bool = conn
        .query_row(
            "SELECT 1 FROM jobs WHERE id = ?1",
            params![job_id],
            |_| Ok(true),
        )
        .unwrap_or(false);
    if exists {
        Err(StoreError::TerminalState(job_id.to_string()))
    } else {
        Err(StoreError::JobNotFound(job_id.to_string()))
    }
}

struct JobRow {
    id: String,
    file_name: String,
    total_units: u32,
    processed_units: u32,
    status: String,
    result_payload: Option<String>,
    error_message: Option<String>,
    created_at: String,
    updated_at: String,
}

fn job_from_row(row: JobRow) -> Result<Job, StoreError> {
    let status = JobStatus::from_str(&row.status)
        .ok_or_else(|| StoreError::Json(format!("unknown job status: {}", row.status)))?;
    Ok(Job {
        id: row.id,
        file_name: row.file_name,
        total_units: row.total_units,
        processed_units: row.processed_units,
        status,
        result_payload: row.result_payload,
        error_message: row.error_message,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UnitOutput;

    fn make_store() -> SqliteJobStore {
        SqliteJobStore::open_in_memory().expect("in-memory store")
    }

    fn make_new_job(units: usize) -> NewJob {
        NewJob {
            file_name: "feedback.csv".to_string(),
            config: SubmissionConfig::for_labels(
                "Classify.",
                "gpt-4o-mini",
                vec!["Positive".to_string(), "Neutral".to_string()],
                "key",
            ),
            header: Some(vec!["Name".to_string(), "Comment".to_string()]),
            units: (0..units)
                .map(|i| WorkUnit {
                    index: i,
                    payload: UnitPayload::Row {
                        fields: vec![format!("row {i}")],
                    },
                    source_name: "feedback.csv".to_string(),
                })
                .collect(),
        }
    }

    fn make_result(index: usize, label: &str) -> AnnotationResult {
        AnnotationResult {
            unit_index: index,
            payload: UnitPayload::Row {
                fields: vec![format!("row {index}")],
            },
            output: UnitOutput::Label {
                label: label.to_string(),
            },
            source_name: "feedback.csv".to_string(),
        }
    }

    #[test]
    fn create_job_starts_pending_with_all_units() {
        let store = make_store();
        let job = store.create_job(&make_new_job(7)).unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_units, 7);
        assert_eq!(job.processed_units, 0);

        let fetched = store.get_job(&job.id).unwrap();
        assert_eq!(fetched.total_units, 7);
        assert_eq!(fetched.status, JobStatus::Pending);
    }

    #[test]
    fn get_job_unknown_id_is_not_found() {
        let store = make_store();
        assert!(matches!(
            store.get_job("nope"),
            Err(StoreError::JobNotFound(_))
        ));
    }

    #[test]
    fn submission_round_trips_without_credential() {
        let store = make_store();
        let job = store.create_job(&make_new_job(2)).unwrap();

        let (config, header) = store.get_submission(&job.id).unwrap();
        assert_eq!(config.labels, vec!["Positive", "Neutral"]);
        assert_eq!(config.model, "gpt-4o-mini");
        // Credential is skipped at serialization time.
        assert_eq!(config.credential, "");
        assert_eq!(header.unwrap(), vec!["Name", "Comment"]);
    }

    #[test]
    fn load_units_respects_offset_and_limit() {
        let store = make_store();
        let job = store.create_job(&make_new_job(10)).unwrap();

        let units = store.load_units(&job.id, 4, 3).unwrap();
        assert_eq!(units.len(), 3);
        assert_eq!(units[0].index, 4);
        assert_eq!(units[2].index, 6);

        let tail = store.load_units(&job.id, 8, 100).unwrap();
        assert_eq!(tail.len(), 2);
    }

    #[test]
    fn results_round_trip_in_index_order() {
        let store = make_store();
        let job = store.create_job(&make_new_job(3)).unwrap();

        // Stored out of order, loaded in order.
        store
            .store_results(&job.id, &[make_result(2, "Neutral"), make_result(0, "Positive")])
            .unwrap();
        store.store_results(&job.id, &[make_result(1, "Neutral")]).unwrap();

        let results = store.load_results(&job.id).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].unit_index, 0);
        assert_eq!(results[1].unit_index, 1);
        assert_eq!(results[2].unit_index, 2);
        assert_eq!(results[0].source_name, "feedback.csv");
    }

    #[test]
    fn progress_is_monotonic() {
        let store = make_store();
        let job = store.create_job(&make_new_job(100)).unwrap();

        store.update_progress(&job.id, 40).unwrap();
        store.update_progress(&job.id, 20).unwrap(); // must not regress
        assert_eq!(store.get_job(&job.id).unwrap().processed_units, 40);

        store.update_progress(&job.id, 90).unwrap();
        assert_eq!(store.get_job(&job.id).unwrap().processed_units, 90);
    }

    #[test]
    fn status_machine_happy_path() {
        let store = make_store();
        let job = store.create_job(&make_new_job(2)).unwrap();

        store.set_processing(&job.id).unwrap();
        assert_eq!(store.get_job(&job.id).unwrap().status, JobStatus::Processing);

        // Processing may be revisited across invocations.
        store.set_processing(&job.id).unwrap();

        store.mark_completed(&job.id, "Name,Comment,Label\n").unwrap();
        let done = store.get_job(&job.id).unwrap();
        assert_eq!(done.status, JobStatus::Completed);
        assert_eq!(done.processed_units, done.total_units);
        assert_eq!(done.result_payload.as_deref(), Some("Name,Comment,Label\n"));
    }

    #[test]
    fn completed_is_terminal() {
        let store = make_store();
        let job = store.create_job(&make_new_job(1)).unwrap();
        store.mark_completed(&job.id, "csv").unwrap();

        assert!(matches!(
            store.mark_failed(&job.id, "late failure"),
            Err(StoreError::TerminalState(_))
        ));
        assert!(matches!(
            store.update_progress(&job.id, 1),
            Err(StoreError::TerminalState(_))
        ));
        assert!(matches!(
            store.set_processing(&job.id),
            Err(StoreError::TerminalState(_))
        ));
    }

    #[test]
    fn failed_records_message_and_is_terminal() {
        let store = make_store();
        let job = store.create_job(&make_new_job(1)).unwrap();

        store.mark_failed(&job.id, "store write failed").unwrap();
        let failed = store.get_job(&job.id).unwrap();
        assert_eq!(failed.status, JobStatus::Failed);
        assert_eq!(failed.error_message.as_deref(), Some("store write failed"));

        assert!(matches!(
            store.mark_completed(&job.id, "csv"),
            Err(StoreError::TerminalState(_))
        ));
    }

    #[test]
    fn store_survives_reopen_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");

        let job_id = {
            let store = SqliteJobStore::open(&path).unwrap();
            let job = store.create_job(&make_new_job(5)).unwrap();
            store.set_processing(&job.id).unwrap();
            store.update_progress(&job.id, 3).unwrap();
            job.id
        };

        let store = SqliteJobStore::open(&path).unwrap();
        let job = store.get_job(&job_id).unwrap();
        assert_eq!(job.status, JobStatus::Processing);
        assert_eq!(job.processed_units, 3);
        assert_eq!(store.load_units(&job_id, 3, 100).unwrap().len(), 2);
    }

    #[test]
    fn migrations_are_idempotent() {
        let store = make_store();
        let conn = store.lock();
        run_migrations(&conn).unwrap();
        let version = get_current_version(&conn);
        assert_eq!(version, 1);
    }
}
