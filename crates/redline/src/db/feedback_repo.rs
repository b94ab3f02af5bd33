//! Feedback repository — structured analysis findings per submission.
//!
//! Rows are written when the analysis pipeline completes and read by the
//! annotation manager to assemble the worker's input.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// Feedback kinds. Weaknesses and recommendations are annotation-eligible;
/// strengths are background context only.
pub const KIND_WEAKNESS: &str = "weakness";
pub const KIND_RECOMMENDATION: &str = "recommendation";
pub const KIND_STRENGTH: &str = "strength";

/// A raw feedback row from the database.
#[derive(Debug, Clone)]
pub struct FeedbackRow {
    pub id: String,
    pub submission_id: String,
    pub kind: String,
    pub priority: Option<String>,
    pub body: String,
    pub created_at: String,
}

impl FeedbackRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            submission_id: row.get("submission_id")?,
            kind: row.get("kind")?,
            priority: row.get("priority")?,
            body: row.get("body")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// Inserts a feedback row.
pub fn insert(db: &Database, feedback: &FeedbackRow) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO feedback (id, submission_id, kind, priority, body, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                feedback.id,
                feedback.submission_id,
                feedback.kind,
                feedback.priority,
                feedback.body,
                feedback.created_at,
            ],
        )?;
        Ok(())
    })
}

/// Returns all feedback for a submission in insertion order.
pub fn for_submission(db: &Database, submission_id: &str) -> Result<Vec<FeedbackRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT * FROM feedback WHERE submission_id = ?1 ORDER BY created_at, rowid")?;
        let rows: Vec<FeedbackRow> = stmt
            .query_map(params![submission_id], FeedbackRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
