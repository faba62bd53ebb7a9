use std::collections::HashMap;
use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::STANDARD, Engine as _};
use sourcemap::SourceMap;
use tracing::debug;

use crate::error::{PatchError, Result};
use crate::model::Position;

const MAP_URL_MARKER: &str = "sourceMappingURL=";

// -----------------------------------------------------------------------------
// Map discovery
// -----------------------------------------------------------------------------

/// Where the source map of a bundle lives.
#[derive(Debug, PartialEq, Eq)]
pub enum MapSource {
    File(PathBuf),
    /// Decoded JSON of a `data:` URL embedded in the bundle.
    Inline(Vec<u8>),
}

/// Find the source map for `bundle_text` when the caller did not name one.
///
/// Reads the last `sourceMappingURL` comment. A base64 `data:` URL is decoded
/// in place; any other URL is taken relative to the bundle's directory.
/// Without a comment the map is `<bundle>.map`.
pub fn discover_map(bundle_path: &Path, bundle_text: &str) -> Result<MapSource> {
    let url = bundle_text.rfind(MAP_URL_MARKER).and_then(|idx| {
        let rest = &bundle_text[idx + MAP_URL_MARKER.len()..];
        rest.split_whitespace().next()
    });
    match url {
        Some(url) if url.starts_with("data:") => {
            let payload = base64_payload(url).ok_or_else(|| PatchError::InlineMapEncoding {
                bundle: bundle_path.to_path_buf(),
            })?;
            let bytes = STANDARD
                .decode(payload)
                .map_err(|source| PatchError::InlineMap {
                    bundle: bundle_path.to_path_buf(),
                    source,
                })?;
            Ok(MapSource::Inline(bytes))
        }
        Some(url) => {
            let dir = bundle_path.parent().unwrap_or_else(|| Path::new(""));
            Ok(MapSource::File(dir.join(url)))
        }
        None => {
            let mut name = bundle_path.as_os_str().to_owned();
            name.push(".map");
            Ok(MapSource::File(PathBuf::from(name)))
        }
    }
}

/// Payload of a `data:[<mediatype>][;param]*;base64,<payload>` URL. `None`
/// when the URL is not base64-encoded.
fn base64_payload(url: &str) -> Option<&str> {
    let (header, payload) = url.strip_prefix("data:")?.split_once(',')?;
    header
        .split(';')
        .skip(1)
        .any(|param| param.trim().eq_ignore_ascii_case("base64"))
        .then_some(payload)
}

// -----------------------------------------------------------------------------
// Index
// -----------------------------------------------------------------------------

/// Parsed source maps for the lifetime of one patch run.
///
/// A map is parsed once per key and never evicted.
#[derive(Default)]
pub struct SourceMapIndex {
    maps: HashMap<PathBuf, SourceMap>,
}

impl SourceMapIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cached(&self, key: &Path) -> bool {
        self.maps.contains_key(key)
    }

    /// Register an already-read map (e.g. an inline one) under `key`.
    pub fn insert(&mut self, key: impl Into<PathBuf>, bytes: &[u8]) -> Result<()> {
        let key = key.into();
        let map = parse_map(&key, bytes)?;
        self.maps.insert(key, map);
        Ok(())
    }

    /// Return the parsed map for `path`, reading it on first use.
    pub async fn load(&mut self, path: &Path) -> Result<&SourceMap> {
        if !self.maps.contains_key(path) {
            let bytes = tokio::fs::read(path)
                .await
                .map_err(|e| PatchError::io(path, e))?;
            let map = parse_map(path, &bytes)?;
            debug!(map = %path.display(), sources = map.get_source_count(), "source map parsed");
            self.maps.insert(path.to_path_buf(), map);
        }
        Ok(&self.maps[path])
    }

    /// Embedded content of the original source whose path ends with
    /// `original_file`.
    pub async fn source_text(&mut self, map_path: &Path, original_file: &str) -> Result<String> {
        let map = self.load(map_path).await?;
        embedded_source(map, &map_path.display().to_string(), original_file)
    }

    /// Generated position for an original `line` (1-based) and `column`.
    pub async fn resolve(
        &mut self,
        map_path: &Path,
        original_file: &str,
        line: u32,
        column: u32,
    ) -> Result<Position> {
        let map = self.load(map_path).await?;
        generated_position(
            map,
            &map_path.display().to_string(),
            original_file,
            Position::new(line, column),
        )
    }
}

fn parse_map(path: &Path, bytes: &[u8]) -> Result<SourceMap> {
    SourceMap::from_slice(bytes).map_err(|source| PatchError::SourceMap {
        map: path.display().to_string(),
        source,
    })
}

fn normalize(path: &str) -> String {
    let s = path.replace('\\', "/");
    match s.strip_prefix("./") {
        Some(rest) => rest.to_string(),
        None => s,
    }
}

/// Index of the first source entry whose path ends with `file`.
fn find_source(map: &SourceMap, file: &str) -> Option<u32> {
    let wanted = normalize(file);
    if wanted.is_empty() {
        return None;
    }
    (0..map.get_source_count()).find(|&idx| {
        map.get_source(idx)
            .map(|src| normalize(src).ends_with(&wanted))
            .unwrap_or(false)
    })
}

pub fn embedded_source(map: &SourceMap, map_name: &str, file: &str) -> Result<String> {
    let idx = find_source(map, file).ok_or_else(|| PatchError::SourceNotFound {
        map: map_name.to_string(),
        file: file.to_string(),
    })?;
    map.get_source_contents(idx)
        .map(str::to_string)
        .ok_or_else(|| PatchError::NoEmbeddedContent {
            map: map_name.to_string(),
            file: file.to_string(),
        })
}

/// Greatest-lower-bound lookup of an original position.
///
/// Picks the closest mapping at or before `original` within the same source.
/// Several generated positions for one original position resolve to the
/// earliest of them.
pub fn generated_position(
    map: &SourceMap,
    map_name: &str,
    file: &str,
    original: Position,
) -> Result<Position> {
    let not_found = || PatchError::GeneratedPositionNotFound {
        map: map_name.to_string(),
        file: file.to_string(),
        position: original,
    };
    let idx = find_source(map, file).ok_or_else(not_found)?;
    if original.line == 0 {
        return Err(not_found());
    }
    let needle = (original.line - 1, original.column);

    let mut best: Option<((u32, u32), (u32, u32))> = None;
    for token in map.tokens() {
        if token.get_src_id() != idx {
            continue;
        }
        let src = (token.get_src_line(), token.get_src_col());
        if src > needle {
            continue;
        }
        let dst = (token.get_dst_line(), token.get_dst_col());
        best = match best {
            Some((best_src, best_dst)) if best_src > src || (best_src == src && best_dst <= dst) => {
                Some((best_src, best_dst))
            }
            _ => Some((src, dst)),
        };
    }

    let (_, (dst_line, dst_col)) = best.ok_or_else(not_found)?;
    Ok(Position::new(dst_line + 1, dst_col))
}
