use swc_core::{
    common::{sync::Lrc, FileName, SourceMap, Span, DUMMY_SP},
    ecma::{
        ast::{EsVersion, Module, Script, Stmt},
        codegen::{text_writer::JsWriter, Config, Emitter},
        parser::{parse_file_as_module, EsSyntax, Syntax, TsSyntax},
    },
};

use crate::error::{PatchError, Result};
use crate::model::Position;

/// A parsed module together with the source map needed to turn its spans
/// back into line/column positions.
pub struct ParsedSource {
    name: String,
    cm: Lrc<SourceMap>,
    module: Module,
}

fn syntax_for(name: &str) -> Syntax {
    let lower = name.to_ascii_lowercase();
    if lower.ends_with(".tsx") {
        Syntax::Typescript(TsSyntax {
            tsx: true,
            decorators: true,
            ..Default::default()
        })
    } else if lower.ends_with(".ts") || lower.ends_with(".mts") || lower.ends_with(".cts") {
        Syntax::Typescript(TsSyntax {
            decorators: true,
            ..Default::default()
        })
    } else {
        Syntax::Es(EsSyntax {
            jsx: true,
            decorators: true,
            ..Default::default()
        })
    }
}

impl ParsedSource {
    /// Parse `text` as an ES module; `name` picks the syntax by extension.
    pub fn parse(name: &str, text: impl Into<String>) -> Result<Self> {
        let cm: Lrc<SourceMap> = Default::default();
        let fm = cm.new_source_file(FileName::Custom(name.to_string()).into(), text.into());
        let mut recovered = vec![];
        let module = parse_file_as_module(
            &fm,
            syntax_for(name),
            EsVersion::EsNext,
            None,
            &mut recovered,
        )
        .map_err(|e| PatchError::SourceParseFailed {
            name: name.to_string(),
            message: format!("{:?}", e.kind()),
        })?;
        if let Some(first) = recovered.first() {
            return Err(PatchError::SourceParseFailed {
                name: name.to_string(),
                message: format!("{:?}", first.kind()),
            });
        }
        Ok(Self {
            name: name.to_string(),
            cm,
            module,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn module(&self) -> &Module {
        &self.module
    }

    /// 1-based line, 0-based UTF-16 column of the start of `span`.
    pub fn position_of(&self, span: Span) -> Position {
        let loc = self.cm.lookup_char_pos(span.lo());
        let column = match loc.file.get_line(loc.line - 1) {
            Some(text) => text
                .chars()
                .take(loc.col.0)
                .map(char::len_utf16)
                .sum::<usize>(),
            None => loc.col.0,
        };
        Position::new(loc.line as u32, column as u32)
    }

    /// Render statements back to compact source text.
    pub fn render(&self, stmts: &[Stmt]) -> Result<String> {
        render_stmts(&self.cm, stmts)
    }
}

fn render_stmts(cm: &Lrc<SourceMap>, stmts: &[Stmt]) -> Result<String> {
    let script = Script {
        span: DUMMY_SP,
        body: stmts.to_vec(),
        shebang: None,
    };
    let mut buf = vec![];
    {
        let mut emitter = Emitter {
            cfg: Config::default().with_minify(true),
            cm: cm.clone(),
            comments: None,
            wr: JsWriter::new(cm.clone(), "\n", &mut buf, None),
        };
        emitter
            .emit_script(&script)
            .map_err(|e| PatchError::Codegen(e.to_string()))?;
    }
    String::from_utf8(buf).map_err(|e| PatchError::Codegen(e.to_string()))
}
