use tandem_abstraction::ComputeError;
use tandem_control::ControlError;
use thiserror::Error;

pub type SyncResult<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("checkpoint save failed for {snapshot}: {source}")]
    Save {
        snapshot: String,
        #[source]
        source: ComputeError,
    },

    #[error("hotload failed for {snapshot}: {source}")]
    Hotload {
        snapshot: String,
        #[source]
        source: ControlError,
    },

    #[error("invalid syncer state: {0}")]
    InvalidState(String),

    #[error(transparent)]
    Control(#[from] ControlError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}
