use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ItemId;

/// Outcome of one attempted work item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemResult {
    pub id: ItemId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Wall time from admission to completion, credential wait included.
    #[serde(with = "crate::domain::duration_ms", rename = "durationMs")]
    pub duration: Duration,
    /// Time spent waiting for a credential (zero without a pool).
    #[serde(with = "crate::domain::duration_ms", rename = "credentialWaitMs")]
    pub credential_wait: Duration,
}

impl WorkItemResult {
    pub fn succeeded(id: ItemId, duration: Duration, credential_wait: Duration) -> Self {
        Self {
            id,
            success: true,
            error: None,
            duration,
            credential_wait,
        }
    }

    pub fn failed(
        id: ItemId,
        error: impl Into<String>,
        duration: Duration,
        credential_wait: Duration,
    ) -> Self {
        Self {
            id,
            success: false,
            error: Some(error.into()),
            duration,
            credential_wait,
        }
    }
}
