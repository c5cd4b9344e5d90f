//! `Batch` - a named, ordered unit of release containing per-application
//! target versions, and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// `BatchStatus`, ordered numerically so that `<`/`>=` comparisons
/// ("status < Completed") read naturally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Draft = 0,
    Sealed = 10,
    PreWaiting = 20,
    PreDeploying = 21,
    PreDeployed = 22,
    PreFailed = 24,
    PreAccepted = 25,
    ProdWaiting = 30,
    ProdDeploying = 31,
    ProdDeployed = 32,
    ProdFailed = 34,
    ProdAccepted = 35,
    Completed = 40,
    Cancelled = 90,
}

impl BatchStatus {
    /// "live" means status < Completed and != Cancelled.
    pub fn is_live(self) -> bool {
        self < BatchStatus::Completed && self != BatchStatus::Cancelled
    }

    pub fn as_code(self) -> i32 {
        self as i32
    }
}

/// Approval gate, orthogonal to lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
    Skipped,
}

/// Monotone lifecycle timestamps.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchTimestamps {
    pub sealed_at: Option<DateTime<Utc>>,
    pub pre_started_at: Option<DateTime<Utc>>,
    pub pre_finished_at: Option<DateTime<Utc>>,
    pub prod_started_at: Option<DateTime<Utc>>,
    pub prod_finished_at: Option<DateTime<Utc>>,
    pub final_accepted_at: Option<DateTime<Utc>>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
}

/// `Batch { id, batchNumber, projectId, initiator, releaseNotes?, status,
/// approvalStatus, timestamps, approvedBy?, rejectReason?, cancelledBy?,
/// cancelReason? }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    pub id: Uuid,
    pub batch_number: String,
    pub project_id: Uuid,
    pub initiator: String,
    pub release_notes: Option<String>,
    pub status: BatchStatus,
    pub approval_status: ApprovalStatus,
    pub timestamps: BatchTimestamps,
    pub approved_by: Option<String>,
    pub reject_reason: Option<String>,
    pub cancelled_by: Option<String>,
    pub cancel_reason: Option<String>,
}

impl Batch {
    pub fn new(batch_number: impl Into<String>, project_id: Uuid, initiator: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            batch_number: batch_number.into(),
            project_id,
            initiator: initiator.into(),
            release_notes: None,
            status: BatchStatus::Draft,
            approval_status: ApprovalStatus::Pending,
            timestamps: BatchTimestamps::default(),
            approved_by: None,
            reject_reason: None,
            cancelled_by: None,
            cancel_reason: None,
        }
    }
}
