use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::config::PatchConfig;
use crate::error::{PatchError, Result};
use crate::extract::{extract, FragmentOrigin};
use crate::locator::body_start;
use crate::mixin;
use crate::model::{AppliedInjection, Injection, InjectionPoint, NormalizedMixin};
use crate::parse::ParsedSource;
use crate::patcher;
use crate::source_map::{discover_map, MapSource, SourceMapIndex};

// -----------------------------------------------------------------------------
// Reporting
// -----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum Stage {
    LoadBundle,
    ResolveMixins,
    LoadSources,
    ApplyInjections,
    Persist,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub succeeded: usize,
    pub failed: usize,
}

/// An item dropped under the continue-on-error policy.
#[derive(Clone, Debug, Serialize)]
pub struct SkippedItem {
    pub stage: Stage,
    pub item: String,
    pub error: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub stages: Vec<StageReport>,
    pub skipped: Vec<SkippedItem>,
    /// Applied splices in application order, with raw positions.
    pub history: Vec<AppliedInjection>,
    pub output: PathBuf,
}

impl RunReport {
    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn failed(&self) -> usize {
        self.stages.iter().map(|s| s.failed).sum()
    }
}

struct StageTally<'a> {
    report: StageReport,
    fail_on_error: bool,
    skipped: &'a mut Vec<SkippedItem>,
}

impl<'a> StageTally<'a> {
    fn new(stage: Stage, fail_on_error: bool, skipped: &'a mut Vec<SkippedItem>) -> Self {
        Self {
            report: StageReport {
                stage,
                succeeded: 0,
                failed: 0,
            },
            fail_on_error,
            skipped,
        }
    }

    /// Count `result`. Under fail-fast the error is returned; otherwise it is
    /// logged, recorded and turned into `None`.
    fn record<T>(&mut self, item: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => {
                self.report.succeeded += 1;
                Ok(Some(value))
            }
            Err(err) if self.fail_on_error => Err(err),
            Err(err) => {
                self.report.failed += 1;
                warn!(stage = ?self.report.stage, item, error = %err, "skipped");
                self.skipped.push(SkippedItem {
                    stage: self.report.stage,
                    item: item.to_string(),
                    error: err.to_string(),
                });
                Ok(None)
            }
        }
    }

    fn finish(self, stages: &mut Vec<StageReport>) {
        info!(
            stage = ?self.report.stage,
            succeeded = self.report.succeeded,
            failed = self.report.failed,
            "stage finished"
        );
        stages.push(self.report);
    }
}

// -----------------------------------------------------------------------------
// Pipeline pieces
// -----------------------------------------------------------------------------

/// An original source ready for injection.
struct PreparedTarget<'m> {
    mixin: &'m NormalizedMixin,
    mixin_code: Option<&'m ParsedSource>,
    /// Path matched against the source map's source entries.
    file: String,
    parsed: ParsedSource,
}

/// Name a target is looked up by in the source map: its path under the
/// project root, else its file name.
fn source_name(target: &Path, project_root: &Path) -> String {
    let rel = target.strip_prefix(project_root).ok().map(|rel| {
        rel.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect::<Vec<_>>()
            .join("/")
    });
    rel.filter(|r| !r.is_empty()).unwrap_or_else(|| {
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

async fn load_bundle(config: &PatchConfig, index: &mut SourceMapIndex) -> Result<(String, PathBuf)> {
    let bundle = tokio::fs::read_to_string(&config.bundle)
        .await
        .map_err(|e| PatchError::io(&config.bundle, e))?;
    let map_key = match &config.source_map {
        Some(path) => path.clone(),
        None => match discover_map(&config.bundle, &bundle)? {
            MapSource::File(path) => path,
            MapSource::Inline(bytes) => {
                let key = PathBuf::from(format!("{}#inline", config.bundle.display()));
                index.insert(key.clone(), &bytes)?;
                key
            }
        },
    };
    debug!(map = %map_key.display(), "using source map");
    Ok((bundle, map_key))
}

async fn prepare_target<'m>(
    index: &mut SourceMapIndex,
    map_key: &Path,
    mixin: &'m NormalizedMixin,
    mixin_code: Option<&'m ParsedSource>,
    file: String,
) -> Result<PreparedTarget<'m>> {
    let text = index.source_text(map_key, &file).await?;
    let parsed = ParsedSource::parse(&file, text)?;
    Ok(PreparedTarget {
        mixin,
        mixin_code,
        file,
        parsed,
    })
}

/// Apply one injection on top of `bundle` and `history`. Returns the new
/// bundle and the splice to append to the history.
#[instrument(level = "debug", skip_all, fields(file = %target.file, method = %injection.source_method))]
async fn apply_injection(
    index: &mut SourceMapIndex,
    map_key: &Path,
    bundle: &str,
    history: &[AppliedInjection],
    target: &PreparedTarget<'_>,
    injection: &Injection,
) -> Result<(String, AppliedInjection)> {
    if injection.at == InjectionPoint::Tail {
        return Err(PatchError::NotImplemented(InjectionPoint::Tail.as_str()));
    }
    let original = body_start(&target.parsed, &injection.source_method).ok_or_else(|| {
        PatchError::MethodNotFound {
            method: injection.source_method.clone(),
            file: target.file.clone(),
        }
    })?;
    let generated = index
        .resolve(map_key, &target.file, original.line, original.column)
        .await?;
    let raw = generated
        .shifted(injection.offset)
        .ok_or_else(|| PatchError::OutOfBounds {
            position: generated,
            lines: bundle.split('\n').count(),
        })?;

    let fragment = extract(
        target.mixin_code,
        Some(target.mixin.code.as_str()),
        &injection.code_method,
        &target.mixin.name,
    )?;
    if fragment.origin == FragmentOrigin::Textual {
        warn!(method = %injection.code_method, mixin = %target.mixin.name, "using text-matched fragment");
    }
    let patched = patcher::inject(bundle, raw, history, &fragment.code)?;
    debug!(%original, %generated, %raw, "fragment injected");
    Ok((patched, AppliedInjection::new(raw, fragment.code)))
}

/// Write `text` next to its destination, then rename it into place.
async fn persist(output_folder: &Path, bundle_path: &Path, text: &str) -> Result<PathBuf> {
    let file_name = bundle_path.file_name().ok_or_else(|| {
        PatchError::io(
            bundle_path,
            std::io::Error::new(std::io::ErrorKind::InvalidInput, "bundle path has no file name"),
        )
    })?;
    tokio::fs::create_dir_all(output_folder)
        .await
        .map_err(|e| PatchError::io(output_folder, e))?;
    let output = output_folder.join(file_name);
    let mut tmp_name = std::ffi::OsString::from(".");
    tmp_name.push(file_name);
    tmp_name.push(".tmp");
    let tmp = output_folder.join(tmp_name);
    tokio::fs::write(&tmp, text)
        .await
        .map_err(|e| PatchError::io(&tmp, e))?;
    tokio::fs::rename(&tmp, &output)
        .await
        .map_err(|e| PatchError::io(&output, e))?;
    Ok(output)
}

// -----------------------------------------------------------------------------
// Run
// -----------------------------------------------------------------------------

/// Patch the configured bundle with every configured mixin.
///
/// Processing is strictly sequential: each injection sees exactly the
/// splices applied before it. Nothing is written when the run aborts.
#[instrument(level = "info", skip_all, fields(bundle = %config.bundle.display()))]
pub async fn run(config: &PatchConfig) -> Result<RunReport> {
    let mut stages = vec![];
    let mut skipped = vec![];
    let mut index = SourceMapIndex::new();

    // The bundle is the single item of its stage; without it there is
    // nothing to continue with.
    let (mut bundle, map_key) = load_bundle(config, &mut index).await?;
    stages.push(StageReport {
        stage: Stage::LoadBundle,
        succeeded: 1,
        failed: 0,
    });
    info!(stage = ?Stage::LoadBundle, succeeded = 1, failed = 0, "stage finished");

    let mut tally = StageTally::new(Stage::ResolveMixins, config.fail_on_error, &mut skipped);
    let mixins = mixin::resolve(
        &config.mixins,
        &config.defaults,
        &config.project_root,
        |path, loaded| tally.record(&path.display().to_string(), loaded),
    )
    .await?;
    tally.finish(&mut stages);

    // Mixin code that does not parse is still usable by the text fallback.
    let mixin_code: Vec<Option<ParsedSource>> = mixins
        .iter()
        .map(|m| match ParsedSource::parse(&m.code_name, m.code.clone()) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                debug!(mixin = %m.name, error = %err, "mixin code not parseable");
                None
            }
        })
        .collect();

    let mut targets: Vec<PreparedTarget<'_>> = vec![];
    let mut tally = StageTally::new(Stage::LoadSources, config.fail_on_error, &mut skipped);
    for (m, code) in mixins.iter().zip(&mixin_code) {
        for target in &m.targets {
            let file = source_name(target, &config.project_root);
            let item = format!("{} -> {}", m.name, file);
            let prepared = prepare_target(&mut index, &map_key, m, code.as_ref(), file).await;
            if let Some(t) = tally.record(&item, prepared)? {
                targets.push(t);
            }
        }
    }
    tally.finish(&mut stages);

    let mut history: Vec<AppliedInjection> = vec![];
    let mut tally = StageTally::new(Stage::ApplyInjections, config.fail_on_error, &mut skipped);
    for target in &targets {
        for injection in &target.mixin.injections {
            let item = format!(
                "{}: {} {} in {}",
                target.mixin.name, injection.at, injection.source_method, target.file
            );
            let applied =
                apply_injection(&mut index, &map_key, &bundle, &history, target, injection).await;
            if let Some((patched, splice)) = tally.record(&item, applied)? {
                bundle = patched;
                history.push(splice);
            }
        }
    }
    tally.finish(&mut stages);

    let output = persist(&config.output_folder, &config.bundle, &bundle).await?;
    stages.push(StageReport {
        stage: Stage::Persist,
        succeeded: 1,
        failed: 0,
    });
    info!(stage = ?Stage::Persist, output = %output.display(), "stage finished");

    Ok(RunReport {
        stages,
        skipped,
        history,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_name_is_root_relative_with_slashes() {
        let root = Path::new("/project");
        assert_eq!(source_name(Path::new("/project/src/app.js"), root), "src/app.js");
        assert_eq!(source_name(Path::new("/elsewhere/lib.js"), root), "lib.js");
    }

    #[test]
    fn tally_counts_and_records_skips() {
        let mut skipped = vec![];
        let mut stages = vec![];
        let mut tally = StageTally::new(Stage::LoadSources, false, &mut skipped);
        assert_eq!(tally.record("ok", Ok(1)).unwrap(), Some(1));
        let missing: Result<i32> = Err(PatchError::NotImplemented("TAIL"));
        assert_eq!(tally.record("tail", missing).unwrap(), None);
        tally.finish(&mut stages);
        assert_eq!(
            stages,
            vec![StageReport {
                stage: Stage::LoadSources,
                succeeded: 1,
                failed: 1
            }]
        );
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].item, "tail");
    }

    #[test]
    fn tally_fails_fast() {
        let mut skipped = vec![];
        let mut tally = StageTally::new(Stage::ApplyInjections, true, &mut skipped);
        let err: Result<()> = Err(PatchError::NotImplemented("TAIL"));
        assert!(matches!(
            tally.record("tail", err),
            Err(PatchError::NotImplemented("TAIL"))
        ));
    }
}
