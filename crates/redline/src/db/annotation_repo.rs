//! Annotation job repository.
//!
//! A job row is the placeholder-based lifecycle of one generation attempt:
//! created as `generating`, terminated exactly once to `completed` or
//! `failed`. Terminal rows are immutable; regeneration creates a new row.

use rusqlite::{params, ErrorCode, Row};

use super::{Database, DatabaseError};

/// Generation lifecycle of an annotation job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationStatus {
    Generating,
    Completed,
    Failed,
}

impl GenerationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenerationStatus::Generating => "generating",
            GenerationStatus::Completed => "completed",
            GenerationStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "generating" => Some(GenerationStatus::Generating),
            "completed" => Some(GenerationStatus::Completed),
            "failed" => Some(GenerationStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, GenerationStatus::Generating)
    }
}

/// A raw annotation job row from the database.
#[derive(Debug, Clone)]
pub struct AnnotationJobRow {
    pub id: String,
    pub submission_id: String,
    pub generation_status: String,
    pub annotated_content: Option<String>,
    pub model_used: Option<String>,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub generation_time_ms: Option<u64>,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl AnnotationJobRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            submission_id: row.get("submission_id")?,
            generation_status: row.get("generation_status")?,
            annotated_content: row.get("annotated_content")?,
            model_used: row.get("model_used")?,
            input_tokens: row.get("input_tokens")?,
            output_tokens: row.get("output_tokens")?,
            generation_time_ms: row.get("generation_time_ms")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn status(&self) -> Option<GenerationStatus> {
        GenerationStatus::parse(&self.generation_status)
    }
}

/// Outcome of a conditional placeholder insert.
#[derive(Debug, PartialEq, Eq)]
pub enum PlaceholderInsert {
    /// This caller created the placeholder and owns the dispatch.
    Created,
    /// Another caller's `generating` row already exists; fall back to it.
    Raced,
}

/// Atomically creates the `generating` placeholder for a submission.
///
/// The partial unique index on `(submission_id) WHERE generation_status =
/// 'generating'` makes the check-then-create sequence race-free: of two
/// concurrent inserts exactly one succeeds, the other observes `Raced`.
pub fn insert_placeholder(
    db: &Database,
    id: &str,
    submission_id: &str,
    now: &str,
) -> Result<PlaceholderInsert, DatabaseError> {
    let result = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO annotation_jobs (id, submission_id, generation_status, created_at, updated_at)
             VALUES (?1, ?2, 'generating', ?3, ?3)",
            params![id, submission_id, now],
        )?;
        Ok(())
    });

    match result {
        Ok(()) => Ok(PlaceholderInsert::Created),
        Err(DatabaseError::Sqlite(e))
            if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) =>
        {
            Ok(PlaceholderInsert::Raced)
        }
        Err(e) => Err(e),
    }
}

/// Finds a job by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<AnnotationJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM annotation_jobs WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], AnnotationJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Finds the most recent job for a submission.
pub fn find_latest(
    db: &Database,
    submission_id: &str,
) -> Result<Option<AnnotationJobRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM annotation_jobs WHERE submission_id = ?1
             ORDER BY created_at DESC, rowid DESC LIMIT 1",
        )?;
        let mut rows = stmt.query_map(params![submission_id], AnnotationJobRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Transitions a `generating` job to `completed` with its content and
/// metadata. Returns false if the job was not in `generating` (terminal
/// states are immutable — the update is silently refused).
#[allow(clippy::too_many_arguments)]
pub fn complete(
    db: &Database,
    id: &str,
    annotated_content: &str,
    model_used: &str,
    input_tokens: u64,
    output_tokens: u64,
    generation_time_ms: u64,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE annotation_jobs
             SET generation_status = 'completed', annotated_content = ?2, model_used = ?3,
                 input_tokens = ?4, output_tokens = ?5, generation_time_ms = ?6, error = NULL,
                 updated_at = ?7
             WHERE id = ?1 AND generation_status = 'generating'",
            params![
                id,
                annotated_content,
                model_used,
                input_tokens,
                output_tokens,
                generation_time_ms,
                now,
            ],
        )?;
        Ok(changed == 1)
    })
}

/// Transitions a `generating` job to `failed` with a reason. Returns false
/// if the job was not in `generating`.
pub fn mark_failed(
    db: &Database,
    id: &str,
    error: &str,
    now: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE annotation_jobs
             SET generation_status = 'failed', error = ?2, updated_at = ?3
             WHERE id = ?1 AND generation_status = 'generating'",
            params![id, error, now],
        )?;
        Ok(changed == 1)
    })
}

/// Reclassifies jobs stuck in `generating` since before `cutoff` as failed.
/// Returns the number of reclaimed rows.
pub fn reclaim_stale(db: &Database, cutoff: &str, now: &str) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE annotation_jobs
             SET generation_status = 'failed',
                 error = 'reclaimed: worker did not complete within the stale timeout',
                 updated_at = ?2
             WHERE generation_status = 'generating' AND updated_at < ?1",
            params![cutoff, now],
        )?;
        Ok(changed as u64)
    })
}
