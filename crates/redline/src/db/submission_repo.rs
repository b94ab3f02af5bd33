//! Submission repository — the externally visible analysis status lives here.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// Analysis lifecycle of a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    Analyzing,
    Succeeded,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Analyzing => "analyzing",
            AnalysisStatus::Succeeded => "succeeded",
            AnalysisStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "analyzing" => Some(AnalysisStatus::Analyzing),
            "succeeded" => Some(AnalysisStatus::Succeeded),
            "failed" => Some(AnalysisStatus::Failed),
            _ => None,
        }
    }
}

/// A raw submission row from the database.
#[derive(Debug, Clone)]
pub struct SubmissionRow {
    pub id: String,
    pub document_id: String,
    pub overlay_id: String,
    pub source_bucket: String,
    pub source_key: String,
    pub owner_id: String,
    pub analysis_status: String,
    pub error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl SubmissionRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            document_id: row.get("document_id")?,
            overlay_id: row.get("overlay_id")?,
            source_bucket: row.get("source_bucket")?,
            source_key: row.get("source_key")?,
            owner_id: row.get("owner_id")?,
            analysis_status: row.get("analysis_status")?,
            error: row.get("error")?,
            created_at: row.get("created_at")?,
            updated_at: row.get("updated_at")?,
        })
    }

    pub fn status(&self) -> Option<AnalysisStatus> {
        AnalysisStatus::parse(&self.analysis_status)
    }
}

/// Inserts a new submission row.
pub fn insert(db: &Database, submission: &SubmissionRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO submissions (id, document_id, overlay_id, source_bucket, source_key,
             owner_id, analysis_status, error, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                submission.id,
                submission.document_id,
                submission.overlay_id,
                submission.source_bucket,
                submission.source_key,
                submission.owner_id,
                submission.analysis_status,
                submission.error,
                submission.created_at,
                submission.updated_at,
            ],
        )?;
        Ok(())
    })
}

/// Finds a submission by its ID.
pub fn find_by_id(db: &Database, id: &str) -> Result<Option<SubmissionRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM submissions WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], SubmissionRow::from_row)?;
        match rows.next() {
            Some(Ok(row)) => Ok(Some(row)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Updates the analysis status (and optional error) of a submission.
pub fn set_status(
    db: &Database,
    id: &str,
    status: AnalysisStatus,
    error: Option<&str>,
    updated_at: &str,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE submissions SET analysis_status = ?2, error = ?3, updated_at = ?4 WHERE id = ?1",
            params![id, status.as_str(), error, updated_at],
        )?;
        Ok(())
    })
}

/// Counts submissions with the given status.
pub fn count_by_status(db: &Database, status: AnalysisStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM submissions WHERE analysis_status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    pub(crate) fn sample_submission(id: &str) -> SubmissionRow {
        SubmissionRow {
            id: id.to_string(),
            document_id: format!("doc-{}", id),
            overlay_id: "overlay-1".to_string(),
            source_bucket: "uploads".to_string(),
            source_key: format!("{}.txt", id),
            owner_id: "alice".to_string(),
            analysis_status: "analyzing".to_string(),
            error: None,
            created_at: "2026-01-01T00:00:00+00:00".to_string(),
            updated_at: "2026-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_insert_and_find() {
        let db = test_db();
        insert(&db, &sample_submission("s1")).unwrap();

        let found = find_by_id(&db, "s1").unwrap().unwrap();
        assert_eq!(found.document_id, "doc-s1");
        assert_eq!(found.status(), Some(AnalysisStatus::Analyzing));
    }

    #[test]
    fn test_find_nonexistent() {
        let db = test_db();
        assert!(find_by_id(&db, "missing").unwrap().is_none());
    }

    #[test]
    fn test_set_status() {
        let db = test_db();
        insert(&db, &sample_submission("s2")).unwrap();

        set_status(
            &db,
            "s2",
            AnalysisStatus::Failed,
            Some("grammar-check exhausted retries"),
            "2026-01-01T01:00:00+00:00",
        )
        .unwrap();

        let found = find_by_id(&db, "s2").unwrap().unwrap();
        assert_eq!(found.status(), Some(AnalysisStatus::Failed));
        assert_eq!(
            found.error.as_deref(),
            Some("grammar-check exhausted retries")
        );
        assert_eq!(found.updated_at, "2026-01-01T01:00:00+00:00");
    }

    #[test]
    fn test_count_by_status() {
        let db = test_db();
        insert(&db, &sample_submission("c1")).unwrap();
        insert(&db, &sample_submission("c2")).unwrap();
        set_status(&db, "c2", AnalysisStatus::Succeeded, None, "2026-01-02").unwrap();

        assert_eq!(count_by_status(&db, AnalysisStatus::Analyzing).unwrap(), 1);
        assert_eq!(count_by_status(&db, AnalysisStatus::Succeeded).unwrap(), 1);
        assert_eq!(count_by_status(&db, AnalysisStatus::Failed).unwrap(), 0);
    }

    #[test]
    fn test_status_parse_roundtrip() {
        for status in [
            AnalysisStatus::Analyzing,
            AnalysisStatus::Succeeded,
            AnalysisStatus::Failed,
        ] {
            assert_eq!(AnalysisStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AnalysisStatus::parse("unknown"), None);
    }
}
