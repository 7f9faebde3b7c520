//! Core shared types for spyglass.
//!
//! Two identity spaces meet in the debugger: the UI addresses code by logical
//! file and line, while the backend addresses it by script id and line/column.
//! Every id gets its own newtype so the two spaces cannot be mixed up.

mod ids;
mod location;
pub mod text;

pub use ids::{BackendId, Epoch, LogicalFileId, RequestId, ScriptId};
pub use location::{LogicalFile, Position, RawLocation, UiLocation};
