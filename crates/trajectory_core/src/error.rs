use std::io;

use ssp_trajectory_model::ModelParseError;

use crate::reproject::ReprojectError;
use crate::store::StoreError;

/// Failures that end a run. Per-record problems are reported as notices and
/// never surface here, except a malformed time under the abort policy.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("malformed schedule time on line {line}: {source}")]
    MalformedTime {
        line: u64,
        #[source]
        source: ModelParseError,
    },
    #[error(transparent)]
    ReprojectionFailure(#[from] ReprojectError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed json on line {line}: {source}")]
    Json {
        line: u64,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}
