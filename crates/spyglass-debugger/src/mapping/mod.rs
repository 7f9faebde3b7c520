//! Translation between backend (raw) and UI locations.
//!
//! Every mapping is lossy in at least one direction: callers treat `None` as
//! "no mapping available" and never as an error.

mod pretty_print;
mod source_map;

use spyglass_core::{Position, RawLocation, UiLocation};

pub use pretty_print::{FormattedContent, FormattedMapping, FormatterMapping, ScriptFormatter};
pub use source_map::SourceMapMapping;

/// The two translation operations every per-script mapping provides.
pub trait ScriptSourceMapping {
    fn raw_to_ui(&self, location: &RawLocation) -> Option<UiLocation>;
    fn ui_to_raw(&self, location: &UiLocation) -> Option<RawLocation>;
}

/// Coordinate transform between a raw source's document space and what is
/// displayed for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MappingStrategy {
    /// Displayed coordinates are the document coordinates.
    #[default]
    Identity,
    /// The source is displayed pretty-printed.
    PrettyPrint(FormattedMapping),
}

impl MappingStrategy {
    pub fn raw_to_ui(&self, position: Position) -> Option<Position> {
        match self {
            Self::Identity => Some(position),
            Self::PrettyPrint(mapping) => mapping.original_to_formatted(position),
        }
    }

    pub fn ui_to_raw(&self, position: Position) -> Option<Position> {
        match self {
            Self::Identity => Some(position),
            Self::PrettyPrint(mapping) => mapping.formatted_to_original(position),
        }
    }

    pub fn is_formatted(&self) -> bool {
        matches!(self, Self::PrettyPrint(_))
    }
}
