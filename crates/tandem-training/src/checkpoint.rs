use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Prefix of checkpoint references that point into another trainer job.
pub const CROSS_JOB_SCHEME: &str = "cross_job://";

const SESSION_ID_LEN: usize = 8;

/// Per-connection suffix that keeps snapshot names unique across sessions.
///
/// Generated once when a trainer connection is established. A reconnect to
/// the same job keeps it; connecting to a different job gets a fresh one
/// unless the caller carries it over.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(SESSION_ID_LEN);
        Self(id)
    }

    #[must_use]
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wire snapshot name for a logical checkpoint name (`step-4` -> `step-4-1a2b3c4d`).
    #[must_use]
    pub fn snapshot_name(&self, logical_name: &str) -> String {
        format!("{logical_name}-{}", self.0)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Whether `path` already names a storage location (`scheme://...` or `/abs`).
#[must_use]
pub fn is_qualified_path(path: &str) -> bool {
    path.contains("://") || path.starts_with('/')
}

/// Resolves a checkpoint reference for `load_state_with_optimizer`.
///
/// Qualified paths and plain names pass through unchanged. A plain name with
/// a source job becomes `cross_job://{job}/{name}`, which the trainer resolves
/// against that job's checkpoint store.
#[must_use]
pub fn resolve_checkpoint_path(name: &str, source_job_id: Option<&str>) -> String {
    if is_qualified_path(name) {
        return name.to_string();
    }
    match source_job_id.map(str::trim).filter(|job| !job.is_empty()) {
        Some(job) => format!("{CROSS_JOB_SCHEME}{job}/{name}"),
        None => name.to_string(),
    }
}
