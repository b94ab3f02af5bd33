use thiserror::Error;

use crate::db::DatabaseError;

#[derive(Error, Debug)]
pub enum AnnotationError {
    #[error("Submission not found: {0}")]
    NotFound(String),

    #[error("Submission {0} has not completed analysis")]
    NotReady(String),

    #[error("Caller may not view submission {0}")]
    Forbidden(String),

    #[error("Failed to dispatch annotation worker: {0}")]
    Dispatch(String),

    #[error("Stored annotation for submission {0} is not valid JSON")]
    CorruptCache(String),

    #[error("Annotation did not reach a terminal state within {0} polls")]
    PollExhausted(u32),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl AnnotationError {
    /// HTTP status an edge handler should map this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            AnnotationError::NotFound(_) => 404,
            AnnotationError::NotReady(_) => 400,
            AnnotationError::Forbidden(_) => 403,
            AnnotationError::Dispatch(_)
            | AnnotationError::CorruptCache(_)
            | AnnotationError::PollExhausted(_)
            | AnnotationError::Database(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(AnnotationError::NotFound("s1".to_string()).http_status(), 404);
        assert_eq!(AnnotationError::NotReady("s1".to_string()).http_status(), 400);
        assert_eq!(AnnotationError::Forbidden("s1".to_string()).http_status(), 403);
        assert_eq!(
            AnnotationError::Dispatch("spawn failed".to_string()).http_status(),
            500
        );
    }
}
