use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{PatchError, Result};
use crate::model::InjectionPoint;

/// Values a mixin inherits when it leaves them out.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct MixinDefaults {
    #[serde(default)]
    pub at: InjectionPoint,
}

fn default_fail_on_error() -> bool {
    true
}

/// Settings of one patch run.
#[derive(Clone, Debug, Deserialize)]
pub struct PatchConfig {
    /// Generated bundle to patch.
    pub bundle: PathBuf,
    /// Source map of the bundle. Discovered from the bundle when absent.
    #[serde(default)]
    pub source_map: Option<PathBuf>,
    pub output_folder: PathBuf,
    #[serde(default)]
    pub project_root: PathBuf,
    #[serde(default)]
    pub mixins: Vec<PathBuf>,
    #[serde(default)]
    pub defaults: MixinDefaults,
    #[serde(default = "default_fail_on_error")]
    pub fail_on_error: bool,
}

impl PatchConfig {
    /// Read a YAML or JSON config. Relative paths resolve against
    /// `project_root`, which itself defaults to the config's directory.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| PatchError::io(path, e))?;
        let mut config: PatchConfig = if is_json(path) {
            serde_json::from_str(&text)?
        } else {
            serde_yaml::from_str(&text)?
        };
        let base = path.parent().unwrap_or_else(|| Path::new("")).to_path_buf();
        config.project_root = base.join(&config.project_root);
        config.absolutize();
        Ok(config)
    }

    /// Resolve every relative path against `project_root`.
    pub fn absolutize(&mut self) {
        let root = self.project_root.clone();
        self.bundle = root.join(&self.bundle);
        self.source_map = self.source_map.take().map(|p| root.join(p));
        self.output_folder = root.join(&self.output_folder);
        for mixin in &mut self.mixins {
            *mixin = root.join(&*mixin);
        }
    }
}

pub(crate) fn is_json(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}
