//! `Build` - what CI reported about a repo/app at a given build number.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `buildStatus ∈ {success,failure,error,killed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Success,
    Failure,
    Error,
    Killed,
}

impl BuildStatus {
    pub fn is_terminal(self) -> bool {
        true // every build status CI can report is terminal in this model
    }

    pub fn is_success(self) -> bool {
        matches!(self, BuildStatus::Success)
    }
}

/// `buildEvent ∈ {push, tag, pull_request, promote, rollback}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildEvent {
    Push,
    Tag,
    PullRequest,
    Promote,
    Rollback,
}

/// `Build { id, repoId, appId, buildNumber, buildStatus, buildEvent,
/// commitSHA, commitRef, commitBranch, imageTag, imageURL, buildCreated,
/// buildStarted, buildFinished }`.
///
/// Immutable once written except for status transitions from non-terminal
/// to terminal on re-notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Build {
    pub id: Uuid,
    pub repo_id: Uuid,
    pub app_id: Uuid,
    pub build_number: i64,
    pub build_status: BuildStatus,
    pub build_event: BuildEvent,
    pub commit_sha: String,
    pub commit_ref: String,
    pub commit_branch: String,
    pub commit_author: String,
    pub image_tag: String,
    pub image_url: Option<String>,
    pub build_created: DateTime<Utc>,
    pub build_started: DateTime<Utc>,
    pub build_finished: DateTime<Utc>,
}

impl Build {
    pub fn duration(&self) -> chrono::Duration {
        let raw = self.build_finished - self.build_started;
        if raw < chrono::Duration::zero() {
            chrono::Duration::zero()
        } else {
            raw
        }
    }
}
