use spyglass_config::ConfigError;
use spyglass_protocol::ProtocolError;
use thiserror::Error;

use crate::breakpoints::StorageError;

/// Errors surfaced at the debugger's I/O boundaries.
///
/// Breakpoint operations themselves never fail: problems degrade to a
/// breakpoint that is not materialized or not present, and are logged. A
/// failed source map load likewise only leaves its script unmapped.
#[derive(Debug, Error)]
pub enum DebugError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type DebugResult<T> = Result<T, DebugError>;
