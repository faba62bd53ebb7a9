use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{debug, instrument};

use crate::config::{is_json, MixinDefaults};
use crate::error::{PatchError, Result};
use crate::locator::callable_names;
use crate::model::{Injection, InjectionPoint, NormalizedMixin, PositionOffset};
use crate::parse::ParsedSource;
use crate::targets;

/// Selector matching every callable named in the mixin's own code.
pub const ANY_METHOD: &str = "any";

// -----------------------------------------------------------------------------
// Raw definitions
// -----------------------------------------------------------------------------

#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    fn into_vec(self) -> Vec<String> {
        match self {
            OneOrMany::One(s) => vec![s],
            OneOrMany::Many(v) => v,
        }
    }
}

/// One entry of a mixin's `injections` list, as written.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct InjectionDefinition {
    pub method: Option<String>,
    pub at: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub code_method: Option<String>,
    #[serde(default)]
    pub offset: PositionOffset,
}

/// A mixin file as written, before validation.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MixinDefinition {
    pub name: Option<String>,
    pub target: Option<OneOrMany>,
    pub method: Option<String>,
    pub at: Option<String>,
    #[serde(default)]
    pub priority: i64,
    pub code: Option<String>,
    pub code_file: Option<PathBuf>,
    pub code_method: Option<String>,
    #[serde(default)]
    pub offset: PositionOffset,
    pub injections: Option<Vec<InjectionDefinition>>,
    #[serde(default)]
    pub metadata: serde_yaml::Mapping,
}

impl MixinDefinition {
    pub fn parse(path: &Path, text: &str) -> Result<Self> {
        let parsed = if is_json(path) {
            serde_json::from_str(text).map_err(|e| e.to_string())
        } else {
            serde_yaml::from_str(text).map_err(|e| e.to_string())
        };
        parsed.map_err(|reason| PatchError::InvalidMixinSchema {
            path: path.to_path_buf(),
            field: serde_field(&reason),
            reason,
        })
    }
}

/// Field named by a serde error: the backticked name of `missing field` /
/// `unknown field`, or the leading path serde_yaml prefixes errors with.
fn serde_field(message: &str) -> String {
    for prefix in ["missing field `", "unknown field `", "duplicate field `"] {
        if let Some((field, _)) = message
            .strip_prefix(prefix)
            .and_then(|rest| rest.split_once('`'))
        {
            return field.to_string();
        }
    }
    match message.split_once(": ") {
        Some((head, _)) if !head.is_empty() && !head.contains(' ') => head.to_string(),
        _ => "<document>".to_string(),
    }
}

// -----------------------------------------------------------------------------
// Resolution
// -----------------------------------------------------------------------------

fn invalid(path: &Path, field: &str) -> PatchError {
    PatchError::InvalidMixinSchema {
        path: path.to_path_buf(),
        field: field.to_string(),
        reason: "is missing or invalid".to_string(),
    }
}

fn non_empty(value: Option<&String>) -> Option<&str> {
    value.map(|s| s.trim()).filter(|s| !s.is_empty())
}

fn injection_point(path: &Path, raw: Option<&str>, fallback: InjectionPoint) -> Result<InjectionPoint> {
    match raw {
        None => Ok(fallback),
        Some(raw) => InjectionPoint::parse(raw).ok_or_else(|| invalid(path, "at")),
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

/// Inline code first, then `code_file` next to the mixin, then under the
/// project root. Returns the code and the name its syntax is chosen from.
async fn resolve_code(
    path: &Path,
    def: &MixinDefinition,
    project_root: &Path,
) -> Result<(String, String)> {
    if let Some(code) = def.code.as_ref().filter(|c| !c.trim().is_empty()) {
        return Ok((code.clone(), format!("{}#code.js", path.display())));
    }
    let Some(code_file) = def.code_file.as_ref() else {
        return Err(invalid(path, "code"));
    };
    let mixin_dir = path.parent().unwrap_or_else(|| Path::new(""));
    for candidate in [mixin_dir.join(code_file), project_root.join(code_file)] {
        if is_file(&candidate).await {
            let code = tokio::fs::read_to_string(&candidate)
                .await
                .map_err(|e| PatchError::io(&candidate, e))?;
            return Ok((code, candidate.display().to_string()));
        }
    }
    Err(PatchError::CodeFileNotFound {
        path: path.to_path_buf(),
        code_file: code_file.clone(),
    })
}

/// Expand one written injection, turning `any` into one entry per callable
/// named in the mixin code.
fn expand_injection(
    path: &Path,
    method: &str,
    code_method: Option<&str>,
    base: Injection,
    code_names: &mut Option<Vec<String>>,
    code: &(String, String),
) -> Result<Vec<Injection>> {
    if method != ANY_METHOD {
        return Ok(vec![Injection {
            source_method: method.to_string(),
            code_method: code_method.unwrap_or(method).to_string(),
            ..base
        }]);
    }
    if code_names.is_none() {
        let parsed = ParsedSource::parse(&code.1, code.0.clone()).map_err(|_| invalid(path, "method"))?;
        *code_names = Some(callable_names(parsed.module()));
    }
    let names = code_names.as_deref().unwrap_or_default();
    if names.is_empty() {
        return Err(invalid(path, "method"));
    }
    Ok(names
        .iter()
        .map(|name| Injection {
            source_method: name.clone(),
            code_method: name.clone(),
            ..base.clone()
        })
        .collect())
}

/// Validate and normalize the mixin written in `text`.
pub async fn normalize(
    path: &Path,
    text: &str,
    defaults: &MixinDefaults,
    project_root: &Path,
) -> Result<NormalizedMixin> {
    let def = MixinDefinition::parse(path, text)?;

    let patterns = def.target.clone().map(OneOrMany::into_vec).unwrap_or_default();
    if patterns.iter().all(|p| p.trim().is_empty()) {
        return Err(PatchError::MissingTarget {
            path: path.to_path_buf(),
        });
    }
    let top_at = injection_point(path, def.at.as_deref(), defaults.at)?;

    let written: Vec<InjectionDefinition> = match &def.injections {
        Some(list) if !list.is_empty() => list.clone(),
        Some(_) => return Err(invalid(path, "injections")),
        None => vec![InjectionDefinition {
            method: def.method.clone(),
            at: None,
            priority: 0,
            code_method: def.code_method.clone(),
            offset: def.offset,
        }],
    };

    let code = resolve_code(path, &def, project_root).await?;
    let mut code_names = None;
    let mut injections = vec![];
    for entry in &written {
        let method = non_empty(entry.method.as_ref())
            .or_else(|| non_empty(def.method.as_ref()))
            .ok_or_else(|| invalid(path, "method"))?;
        let base = Injection {
            at: injection_point(path, entry.at.as_deref(), top_at)?,
            priority: entry.priority,
            source_method: String::new(),
            code_method: String::new(),
            offset: entry.offset,
        };
        let code_method = non_empty(entry.code_method.as_ref());
        injections.extend(expand_injection(
            path,
            method,
            code_method,
            base,
            &mut code_names,
            &code,
        )?);
    }
    injections.sort_by_key(|i| i.priority);

    let targets = targets::expand(&patterns, project_root);
    if targets.is_empty() {
        return Err(PatchError::MissingTarget {
            path: path.to_path_buf(),
        });
    }

    let name = def.name.clone().unwrap_or_else(|| {
        path.file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    });
    Ok(NormalizedMixin {
        path: path.to_path_buf(),
        name,
        priority: def.priority,
        targets,
        code: code.0,
        code_name: code.1,
        injections,
        metadata: def.metadata,
    })
}

/// Read and normalize the mixin file at `path`.
#[instrument(level = "debug", skip_all, fields(mixin = %path.display()))]
pub async fn load(path: &Path, defaults: &MixinDefaults, project_root: &Path) -> Result<NormalizedMixin> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PatchError::io(path, e))?;
    let mixin = normalize(path, &text, defaults, project_root).await?;
    debug!(
        name = %mixin.name,
        targets = mixin.targets.len(),
        injections = mixin.injections.len(),
        "mixin resolved"
    );
    Ok(mixin)
}

/// Ascending mixin priority, load order on ties.
pub fn order(mixins: &mut [NormalizedMixin]) {
    mixins.sort_by_key(|m| m.priority);
}

/// Load every mixin and return them in application order.
///
/// `admit` sees each load result in input order and either keeps the mixin,
/// drops it (`Ok(None)`), or aborts the whole resolution with an error.
pub async fn resolve<F>(
    paths: &[PathBuf],
    defaults: &MixinDefaults,
    project_root: &Path,
    mut admit: F,
) -> Result<Vec<NormalizedMixin>>
where
    F: FnMut(&Path, Result<NormalizedMixin>) -> Result<Option<NormalizedMixin>>,
{
    let mut mixins = Vec::with_capacity(paths.len());
    for path in paths {
        let loaded = load(path, defaults, project_root).await;
        if let Some(mixin) = admit(path, loaded)? {
            mixins.push(mixin);
        }
    }
    order(&mut mixins);
    Ok(mixins)
}
