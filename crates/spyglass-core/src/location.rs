use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{LogicalFileId, ScriptId};

/// A zero-based (line, column) pair. Ordered lexicographically.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    #[inline]
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A location as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLocation {
    pub script_id: ScriptId,
    #[serde(rename = "lineNumber")]
    pub line: u32,
    #[serde(rename = "columnNumber", default)]
    pub column: u32,
}

impl RawLocation {
    pub fn new(script_id: impl Into<ScriptId>, line: u32, column: u32) -> Self {
        Self {
            script_id: script_id.into(),
            line,
            column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

impl fmt::Display for RawLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.script_id, self.line, self.column)
    }
}

/// A location inside a logical source file, as shown to the user.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UiLocation {
    pub file: LogicalFileId,
    pub line: u32,
    pub column: u32,
}

impl UiLocation {
    pub fn new(file: impl Into<LogicalFileId>, line: u32, column: u32) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

impl fmt::Display for UiLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}

/// A logical source file known to the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LogicalFile {
    pub id: LogicalFileId,
    pub url: Option<String>,
}

impl LogicalFile {
    pub fn new(id: impl Into<LogicalFileId>, url: Option<String>) -> Self {
        Self { id: id.into(), url }
    }

    /// Files backed by a URL outlive a backend reset; anonymous code does not.
    pub fn is_persistent(&self) -> bool {
        self.url.as_deref().is_some_and(|url| !url.is_empty())
    }
}
