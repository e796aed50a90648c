//! Tandem Training
//!
//! Training-side primitives that sit on top of the control plane:
//! - Snapshot naming and checkpoint path resolution (`SessionId`)
//! - Delta-chain weight sync into a deployment (`WeightSyncer`)
//! - A trainer compute client that survives preemption (`ReconnectableClient`)

pub mod checkpoint;
pub mod error;
pub mod reconnect;
pub mod syncer;

pub use checkpoint::{CROSS_JOB_SCHEME, SessionId, is_qualified_path, resolve_checkpoint_path};
pub use error::{SyncError, SyncResult};
pub use reconnect::{ReconnectPolicy, ReconnectableClient};
pub use syncer::{DeltaChainState, SyncerConfig, WeightSyncer};
