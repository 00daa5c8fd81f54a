use serde::{Deserialize, Serialize};
use serde_json::Value;

use talentbridge_core::JobId;
use talentbridge_infra::status::DEFAULT_PAGE_SIZE;
use talentbridge_notifications::{NormalizedState, Priority};

// -------------------------
// Request DTOs
// -------------------------

/// Producer request. `payload` is validated server-side so that a missing
/// `senderId` yields the same error as the library call.
#[derive(Debug, Deserialize)]
pub struct EnqueueRequest {
    pub payload: Value,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct UpsertPreferenceRequest {
    #[serde(rename = "type")]
    pub kind: String,
    pub email: bool,
    pub in_app: bool,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub state: Option<NormalizedState>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_PAGE_SIZE
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct EnqueueResponse {
    #[serde(rename = "jobId")]
    pub job_id: JobId,
}
