use serde::{Deserialize, Serialize};

use crate::ItemId;

/// Where an item was when shutdown stopped it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CheckpointState {
    /// Never admitted to a worker slot.
    Pending,
    /// Admitted, but shutdown arrived while it waited for a credential.
    AwaitingCredential,
}

/// Marker for an item that did not run because shutdown was requested.
///
/// The coordinator only produces these; resuming from them is up to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: ItemId,
    pub state: CheckpointState,
}

impl Checkpoint {
    pub fn new(id: ItemId, state: CheckpointState) -> Self {
        Self { id, state }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serde_shape() {
        let cp = Checkpoint::new(ItemId::new("item-3").unwrap(), CheckpointState::AwaitingCredential);
        let json = serde_json::to_string(&cp).unwrap();
        assert_eq!(json, r#"{"id":"item-3","state":"awaitingCredential"}"#);
    }

    #[test]
    fn rejects_unsafe_id_on_load() {
        let res: Result<Checkpoint, _> =
            serde_json::from_str(r#"{"id":"/etc/passwd","state":"pending"}"#);
        assert!(res.is_err());
    }
}
