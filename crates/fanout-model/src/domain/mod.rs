mod item_id;
pub use item_id::{IdError, ItemId, validate_id};

mod progress;
pub use progress::ProgressStats;

mod item_result;
pub use item_result::WorkItemResult;

mod checkpoint;
pub use checkpoint::{Checkpoint, CheckpointState};

mod pool_stats;
pub use pool_stats::PoolStats;

mod run;
pub use run::{RunPhase, RunReport};

pub(crate) mod duration_ms;
