#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use sourcemap::SourceMapBuilder;
use swc_mixin_patcher::{MixinDefaults, PatchConfig};
use tempfile::TempDir;

/// v3 source map fixture. Lines are 1-based, columns 0-based.
#[derive(Default)]
pub struct MapBuilder {
    sources: Vec<(String, Option<String>)>,
    // (gen line, gen col, source, src line, src col)
    segments: Vec<(u32, u32, u32, u32, u32)>,
}

impl MapBuilder {
    pub fn source(mut self, name: &str, content: Option<&str>) -> Self {
        self.sources.push((name.to_string(), content.map(str::to_string)));
        self
    }

    pub fn map(mut self, generated: (u32, u32), source: u32, original: (u32, u32)) -> Self {
        self.segments
            .push((generated.0, generated.1, source, original.0, original.1));
        self
    }

    pub fn build(mut self) -> String {
        let mut builder = SourceMapBuilder::new(Some("app.js"));
        for (name, content) in &self.sources {
            let id = builder.add_source(name);
            builder.set_source_contents(id, content.as_deref());
        }
        self.segments.sort();
        for (gen_line, gen_col, src, src_line, src_col) in self.segments {
            builder.add_raw(gen_line - 1, gen_col, src_line - 1, src_col, Some(src), None, false);
        }
        let mut out = vec![];
        builder.into_sourcemap().to_writer(&mut out).unwrap();
        String::from_utf8(out).unwrap()
    }
}

/// Scratch project: `dist/app.js`, its map, mixins and an `out/` folder.
pub struct Project {
    pub dir: TempDir,
    mixins: Vec<PathBuf>,
}

impl Project {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("dist")).unwrap();
        fs::create_dir_all(dir.path().join("mixins")).unwrap();
        Self { dir, mixins: vec![] }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn bundle_path(&self) -> PathBuf {
        self.root().join("dist/app.js")
    }

    pub fn output_path(&self) -> PathBuf {
        self.root().join("out/app.js")
    }

    pub fn write_bundle(&self, bundle: &str, map: Option<&str>) {
        fs::write(self.bundle_path(), bundle).unwrap();
        if let Some(map) = map {
            fs::write(self.root().join("dist/app.js.map"), map).unwrap();
        }
    }

    pub fn add_mixin(&mut self, name: &str, yaml: &str) {
        let path = self.root().join("mixins").join(name);
        fs::write(&path, yaml).unwrap();
        self.mixins.push(path);
    }

    pub fn config(&self, fail_on_error: bool) -> PatchConfig {
        PatchConfig {
            bundle: self.bundle_path(),
            source_map: None,
            output_folder: self.root().join("out"),
            project_root: self.root().to_path_buf(),
            mixins: self.mixins.clone(),
            defaults: MixinDefaults::default(),
            fail_on_error,
        }
    }
}
