pub mod error;
pub use error::{CoordinatorError, PoolError};

pub mod pool;
pub use pool::{Credential, CredentialPool};

pub mod output;
pub use output::{ItemOutput, OutputMultiplexer};

pub mod coordinator;
pub use coordinator::{Shutdown, WorkContext, WorkCoordinator};

pub mod config;
pub use config::{ConfigError, CoordinatorConfig, RateLimitSimulation, credential_keys_from_env};

pub mod metrics;
pub use metrics::{MetricsBackend, MetricsHandle, NoopMetrics, Outcome};

pub mod checkpoint;
pub use checkpoint::{CheckpointError, CheckpointStore};

mod simulate;

pub use fanout_model::{
    Checkpoint, CheckpointState, IdError, ItemId, PoolStats, ProgressStats, RunPhase, RunReport,
    WorkItemResult, validate_id,
};
