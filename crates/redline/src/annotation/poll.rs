//! The client-side polling contract.
//!
//! A caller submits through the manager and, while the response is
//! `generating`, re-issues the same request on a fixed interval until it
//! observes a terminal state. `completed` responses are cacheable forever;
//! the server never regenerates a completed job.

use std::time::Duration;

use tracing::debug;

use crate::access::Principal;

use super::error::AnnotationError;
use super::manager::{AnnotationResponse, AnnotationService};

/// Reference polling interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Polls until the annotation completes.
///
/// Re-issues the request every `interval`; per the contract there is no
/// guaranteed upper bound on total wait, so `max_polls` bounds the loop for
/// library callers (a failed generation is transparently superseded by the
/// re-issued request, which may fail again indefinitely).
///
/// The first `completed` observed after at least one `generating` poll is
/// reported with `cached: false` — it was generated for this caller.
pub async fn poll_until_terminal(
    service: &AnnotationService,
    submission_id: &str,
    principal: &Principal,
    interval: Duration,
    max_polls: u32,
) -> Result<AnnotationResponse, AnnotationError> {
    let mut waited = false;

    for poll in 0..max_polls {
        let response = service.request(submission_id, principal).await?;
        match response {
            AnnotationResponse::Generating { .. } => {
                debug!(submission_id, poll, "annotation still generating");
                waited = true;
                tokio::time::sleep(interval).await;
            }
            AnnotationResponse::Completed {
                annotated_json,
                model_used,
                input_tokens,
                output_tokens,
                generation_time_ms,
                cached,
            } => {
                return Ok(AnnotationResponse::Completed {
                    annotated_json,
                    model_used,
                    input_tokens,
                    output_tokens,
                    generation_time_ms,
                    // Generated during this loop rather than served from a
                    // pre-existing cache entry.
                    cached: cached && !waited,
                });
            }
        }
    }

    Err(AnnotationError::PollExhausted(max_polls))
}
