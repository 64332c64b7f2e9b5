// ABOUTME: Rollout orchestration: lock, deploy record, policy checks and the state machine.
// ABOUTME: Exports the engine and the persisted types it coordinates.

mod engine;
mod error;
mod lock;
mod policy;
mod record;
mod state;

pub use engine::{
    AbortOutcome, ActionOptions, DiffOutcome, EngineSettings, FinishOutcome, RolloutEngine,
    StartOutcome, StatusReport, SyncOutcome, TagOutcome,
};
pub use error::{DeployError, DeployErrorKind, LockHolderInfo};
pub use lock::{Acquired, Holder, LockManager, LockRecord, RolloutPhase};
pub use policy::{check_block_file, check_umask, parse_umask, probe_umask};
pub use record::{
    DeployFileStore, DeployRecord, KEY_ACTION, KEY_COMMIT, KEY_DEPLOY_DATE, KEY_DEPLOYED_BY,
    KEY_DEPLOYED_FROM, KEY_ENVIRONMENT, KEY_REVERTED_TO, KEY_TAG, ParseError, RecordError,
};
pub use state::RolloutState;
