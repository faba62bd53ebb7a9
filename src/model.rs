use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// -----------------------------------------------------------------------------
// Coordinates
// -----------------------------------------------------------------------------

/// A location in either the original source or the generated bundle.
///
/// `line` is 1-based, `column` is 0-based. Both coordinate spaces share this
/// convention and nothing else.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub const fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// Shift by a signed offset. `None` if the result would leave the
    /// 1-based line / 0-based column space.
    pub fn shifted(self, offset: PositionOffset) -> Option<Position> {
        let line = i64::from(self.line) + i64::from(offset.line);
        let column = i64::from(self.column) + i64::from(offset.column);
        if line < 1 || column < 0 {
            return None;
        }
        Some(Position {
            line: u32::try_from(line).ok()?,
            column: u32::try_from(column).ok()?,
        })
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Fixed row/column shift a mixin may request on top of the resolved
/// generated position.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionOffset {
    #[serde(default)]
    pub line: i32,
    #[serde(default)]
    pub column: i32,
}

// -----------------------------------------------------------------------------
// Injections
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum InjectionPoint {
    /// Immediately before the first statement of the body.
    #[default]
    Head,
    /// Immediately before the end of the body. Not implemented.
    Tail,
}

impl InjectionPoint {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "HEAD" => Some(InjectionPoint::Head),
            "TAIL" => Some(InjectionPoint::Tail),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InjectionPoint::Head => "HEAD",
            InjectionPoint::Tail => "TAIL",
        }
    }
}

impl fmt::Display for InjectionPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One planned splice of a normalized mixin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Injection {
    pub at: InjectionPoint,
    pub priority: i64,
    /// Callable to locate in the original source.
    pub source_method: String,
    /// Callable whose body is extracted from the mixin's own code.
    pub code_method: String,
    pub offset: PositionOffset,
}

/// A splice that has been committed to the bundle.
///
/// `position` is always the raw generated position, never the adjusted one.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AppliedInjection {
    pub position: Position,
    pub code: String,
}

impl AppliedInjection {
    pub fn new(position: Position, code: impl Into<String>) -> Self {
        Self {
            position,
            code: code.into(),
        }
    }
}

// -----------------------------------------------------------------------------
// Mixins
// -----------------------------------------------------------------------------

/// Validated mixin, immutable once resolved. Identified by `path`.
#[derive(Clone, Debug)]
pub struct NormalizedMixin {
    pub path: PathBuf,
    pub name: String,
    pub priority: i64,
    pub targets: Vec<PathBuf>,
    pub code: String,
    /// Name used to pick a parser for `code` (`.ts`, `.js`, ...).
    pub code_name: String,
    /// Sorted by ascending priority, declaration order on ties.
    pub injections: Vec<Injection>,
    pub metadata: serde_yaml::Mapping,
}
