use std::path::PathBuf;

use thiserror::Error;

use crate::model::Position;

/// Every failure the patch engine can report.
///
/// All variants are recoverable per mixin or per injection when the run is
/// configured with `fail_on_error: false`.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("no source ending with `{file}` in source map {map}")]
    SourceNotFound { map: String, file: String },

    #[error("source `{file}` in source map {map} has no embedded content")]
    NoEmbeddedContent { map: String, file: String },

    #[error("no generated position for {file}:{position} in source map {map}")]
    GeneratedPositionNotFound {
        map: String,
        file: String,
        position: Position,
    },

    #[error("position {position} is outside the bundle ({lines} lines)")]
    OutOfBounds { position: Position, lines: usize },

    #[error("method `{method}` not found in {file}")]
    MethodNotFound { method: String, file: String },

    #[error("fragment `{method}` not found in mixin code of {mixin}")]
    FragmentNotFound { method: String, mixin: String },

    #[error("invalid mixin {path}: field `{field}` {reason}")]
    InvalidMixinSchema {
        path: PathBuf,
        field: String,
        reason: String,
    },

    #[error("mixin {path} has no target")]
    MissingTarget { path: PathBuf },

    #[error("code file `{code_file}` of mixin {path} not found")]
    CodeFileNotFound { path: PathBuf, code_file: PathBuf },

    #[error("{0} injection is not implemented")]
    NotImplemented(&'static str),

    #[error("failed to parse {name}: {message}")]
    SourceParseFailed { name: String, message: String },

    #[error("failed to render statements: {0}")]
    Codegen(String),

    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid source map {map}: {source}")]
    SourceMap {
        map: String,
        #[source]
        source: sourcemap::Error,
    },

    #[error("undecodable inline source map in {bundle}: {source}")]
    InlineMap {
        bundle: PathBuf,
        #[source]
        source: base64::DecodeError,
    },

    #[error("inline source map in {bundle} is not base64-encoded")]
    InlineMapEncoding { bundle: PathBuf },

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl PatchError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PatchError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PatchError>;
