//! Breakpoint lifecycle and source location mapping for a browser-style
//! debugger front-end.
//!
//! The user thinks in terms of "a breakpoint at line N of file F"; the backend
//! thinks in terms of ephemeral script ids that are reassigned on every
//! reload. This crate keeps the two in sync:
//!
//! - [`RawSource`] groups backend script fragments sharing one URL into one
//!   logical file.
//! - [`mapping`] translates between backend and UI coordinates (identity,
//!   pretty-print, source maps).
//! - [`DebuggerModel`] owns the volatile backend state and correlates replies
//!   by request id and epoch.
//! - [`BreakpointManager`] owns the durable breakpoint set.
//! - [`DebugSession`] wires the three together and [`SessionDriver`] runs it
//!   on tokio.

mod bindings;
pub mod breakpoints;
mod driver;
mod error;
pub mod mapping;
pub mod model;
mod raw_source;
mod session;

pub use bindings::{FileSwap, SourceBindings, SourceMapFetch};
pub use breakpoints::{
    Breakpoint, BreakpointBackend, BreakpointEvent, BreakpointKey, BreakpointManager,
    BreakpointStorage, ConfiguredStorage, JsonFileStorage, Materialization, MemoryStorage,
    SerializedBreakpoint, StorageError,
};
pub use driver::SessionDriver;
pub use error::{DebugError, DebugResult};
pub use model::{DebuggerModel, DebuggerState, ModelEvent, Script, SetBreakpointResult};
pub use raw_source::{RawSource, RawSourceId, ScriptFragment, SourceMessage};
pub use session::{DebugSession, SessionOptions};
