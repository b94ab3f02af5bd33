//! Durable failure/retry queue for pipeline runs.
//!
//! Failed runs enqueue their trigger payload here. A consumer leases the
//! oldest pending message; each lease counts as a delivery. Messages whose
//! delivery count exceeds the bound are parked as dead letters for manual
//! inspection instead of being redelivered forever.

use rusqlite::{params, Row};

use super::{Database, DatabaseError};

/// A raw queue row from the database.
#[derive(Debug, Clone)]
pub struct QueuedFailure {
    pub id: i64,
    pub submission_id: String,
    pub payload: String,
    pub reason: String,
    pub delivery_count: u32,
    pub dead_lettered: bool,
    pub enqueued_at: String,
    pub updated_at: String,
}

impl QueuedFailure {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        Ok(Self {
            id: row.get("id")?,
            submission_id: row.get("submission_id")?,
            payload: row.get("payload")?,
            reason: row.get("reason")?,
            delivery_count: row.get("delivery_count")?,
            dead_lettered: row.get::<_, i64>("dead_lettered")? != 0,
            enqueued_at: row.get("enqueued_at")?,
            updated_at: row.get("updated_at")?,
        })
    }
}

/// Enqueues a failure message. Returns the row id.
pub fn enqueue(
    db: &Database,
    submission_id: &str,
    payload: &str,
    reason: &str,
    now: &str,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO failure_queue (submission_id, payload, reason, enqueued_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
            params![submission_id, payload, reason, now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Leases the oldest pending message, counting the lease as a delivery.
///
/// Messages that have already been delivered `max_deliveries` times are
/// parked as dead letters and skipped. Returns `None` when the queue has
/// no deliverable message.
pub fn lease_next(
    db: &Database,
    max_deliveries: u32,
    now: &str,
) -> Result<Option<QueuedFailure>, DatabaseError> {
    db.with_conn(|conn| {
        loop {
            let mut stmt = conn.prepare(
                "SELECT * FROM failure_queue WHERE dead_lettered = 0 ORDER BY id LIMIT 1",
            )?;
            let next = {
                let mut rows = stmt.query_map([], QueuedFailure::from_row)?;
                match rows.next() {
                    Some(Ok(row)) => Some(row),
                    Some(Err(e)) => return Err(DatabaseError::Sqlite(e)),
                    None => None,
                }
            };

            let Some(mut message) = next else {
                return Ok(None);
            };

            if message.delivery_count >= max_deliveries {
                log::warn!(
                    "Parking failure message {} for submission {} after {} deliveries",
                    message.id,
                    message.submission_id,
                    message.delivery_count
                );
                conn.execute(
                    "UPDATE failure_queue SET dead_lettered = 1, updated_at = ?2 WHERE id = ?1",
                    params![message.id, now],
                )?;
                continue;
            }

            conn.execute(
                "UPDATE failure_queue SET delivery_count = delivery_count + 1, updated_at = ?2
                 WHERE id = ?1",
                params![message.id, now],
            )?;
            message.delivery_count += 1;
            return Ok(Some(message));
        }
    })
}

/// Acknowledges (removes) a successfully handled message.
pub fn ack(db: &Database, id: i64) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute("DELETE FROM failure_queue WHERE id = ?1", params![id])?;
        Ok(())
    })
}

/// Returns all dead-lettered messages, oldest first.
pub fn dead_letters(db: &Database) -> Result<Vec<QueuedFailure>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM failure_queue WHERE dead_lettered = 1 ORDER BY id")?;
        let rows: Vec<QueuedFailure> = stmt
            .query_map([], QueuedFailure::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Counts deliverable (non-dead-lettered) messages.
pub fn pending_count(db: &Database) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM failure_queue WHERE dead_lettered = 0",
            [],
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

    #[test]
    fn test_enqueue_and_lease() {
        let db = test_db();
        let id = enqueue(&db, "s1", "{\"documentId\":\"d1\"}", "stage failed", "2026-01-01").unwrap();

        let leased = lease_next(&db, 3, "2026-01-01").unwrap().unwrap();
        assert_eq!(leased.id, id);
        assert_eq!(leased.submission_id, "s1");
        assert_eq!(leased.delivery_count, 1);
        assert!(!leased.dead_lettered);
    }

    #[test]
    fn test_lease_empty_queue() {
        let db = test_db();
        assert!(lease_next(&db, 3, "2026-01-01").unwrap().is_none());
    }

    #[test]
    fn test_ack_removes_message() {
        let db = test_db();
        let id = enqueue(&db, "s1", "{}", "boom", "2026-01-01").unwrap();
        ack(&db, id).unwrap();

        assert_eq!(pending_count(&db).unwrap(), 0);
        assert!(lease_next(&db, 3, "2026-01-01").unwrap().is_none());
    }

    #[test]
    fn test_exhausted_redelivery_parks_to_dlq() {
        let db = test_db();
        enqueue(&db, "s1", "{}", "boom", "2026-01-01").unwrap();

        // Three allowed deliveries.
        for expected in 1..=3 {
            let leased = lease_next(&db, 3, "2026-01-01").unwrap().unwrap();
            assert_eq!(leased.delivery_count, expected);
        }

        // Fourth lease parks the message instead of returning it.
        assert!(lease_next(&db, 3, "2026-01-01").unwrap().is_none());

        let parked = dead_letters(&db).unwrap();
        assert_eq!(parked.len(), 1);
        assert_eq!(parked[0].delivery_count, 3);
        assert!(parked[0].dead_lettered);
        assert_eq!(pending_count(&db).unwrap(), 0);
    }

    #[test]
    fn test_parked_message_does_not_block_queue() {
        let db = test_db();
        enqueue(&db, "s1", "{}", "first", "2026-01-01").unwrap();
        enqueue(&db, "s2", "{}", "second", "2026-01-01").unwrap();

        // Exhaust the first message.
        for _ in 0..3 {
            lease_next(&db, 3, "2026-01-01").unwrap();
        }

        // The next lease skips the parked message and serves the second.
        let leased = lease_next(&db, 3, "2026-01-01").unwrap().unwrap();
        assert_eq!(leased.submission_id, "s2");
    }

    #[test]
    fn test_oldest_first_ordering() {
        let db = test_db();
        enqueue(&db, "s1", "{}", "first", "2026-01-01").unwrap();
        enqueue(&db, "s2", "{}", "second", "2026-01-01").unwrap();

        let leased = lease_next(&db, 3, "2026-01-01").unwrap().unwrap();
        assert_eq!(leased.submission_id, "s1");
    }
}
