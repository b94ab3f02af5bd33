//! Authorization seam for submission visibility.
//!
//! The real identity provider lives outside this crate; callers hand in a
//! `Principal` and the service asks the policy whether that principal may
//! view a submission.

use crate::db::submission_repo::SubmissionRow;

/// The authenticated caller, as resolved by the embedding host.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: String,
}

impl Principal {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
        }
    }
}

pub trait AccessPolicy: Send + Sync {
    fn can_view_submission(&self, principal: &Principal, submission: &SubmissionRow) -> bool;
}

/// Grants everything. For embedded/single-user deployments and tests.
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_view_submission(&self, _principal: &Principal, _submission: &SubmissionRow) -> bool {
        true
    }
}

/// Only the submission's owner may view it.
pub struct OwnerOnly;

impl AccessPolicy for OwnerOnly {
    fn can_view_submission(&self, principal: &Principal, submission: &SubmissionRow) -> bool {
        principal.user_id == submission.owner_id
    }
}
