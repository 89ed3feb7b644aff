use serde::{Deserialize, Serialize};

/// Point-in-time view of a credential pool.
///
/// Credentials whose backoff window has already elapsed count as `available`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PoolStats {
    pub total: usize,
    pub available: usize,
    pub reserved: usize,
    pub rate_limited: usize,
}
