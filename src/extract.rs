use regex::Regex;
use tracing::debug;

use crate::error::{PatchError, Result};
use crate::locator::find_callable;
use crate::parse::ParsedSource;

/// Which path produced a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FragmentOrigin {
    /// Rendered from the parsed statement list.
    Structural,
    /// Captured by the `function name(...) { ... }` text pattern. Best effort.
    Textual,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    pub code: String,
    pub origin: FragmentOrigin,
}

/// Body of `method` as compact source text.
///
/// Tries the parsed mixin code first and falls back to a text match over
/// `raw` when the code did not parse or the callable was not found.
pub fn extract(
    parsed: Option<&ParsedSource>,
    raw: Option<&str>,
    method: &str,
    mixin: &str,
) -> Result<Fragment> {
    if let Some(parsed) = parsed {
        if let Some(code) = structural(parsed, method)? {
            return Ok(Fragment {
                code,
                origin: FragmentOrigin::Structural,
            });
        }
    }
    if let Some(code) = raw.and_then(|raw| textual(raw, method)) {
        debug!(method, mixin, "fragment captured by text fallback");
        return Ok(Fragment {
            code,
            origin: FragmentOrigin::Textual,
        });
    }
    Err(PatchError::FragmentNotFound {
        method: method.to_string(),
        mixin: mixin.to_string(),
    })
}

fn structural(parsed: &ParsedSource, method: &str) -> Result<Option<String>> {
    let Some(body) = find_callable(parsed.module(), method).and_then(|c| c.body().cloned()) else {
        return Ok(None);
    };
    if body.stmts.is_empty() {
        return Ok(None);
    }
    let code = parsed.render(&body.stmts)?;
    Ok(if code.is_empty() { None } else { Some(code) })
}

/// Greedy up to the last closing brace, so nested blocks survive when the
/// text holds a single function.
fn textual(raw: &str, method: &str) -> Option<String> {
    let pattern = format!(
        r"(?s)function\s+{}\s*\([^)]*\)\s*\{{(.*)\}}",
        regex::escape(method)
    );
    let re = Regex::new(&pattern).ok()?;
    let body = re.captures(raw)?.get(1)?.as_str().trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_code(code: &str, method: &str) -> Result<Fragment> {
        let parsed = ParsedSource::parse("mixin.js", code).ok();
        extract(parsed.as_ref(), Some(code), method, "mixin.yaml")
    }

    #[test]
    fn statements_keep_their_order() {
        let fragment = from_code("function foo() { a(); b(); }", "foo").unwrap();
        assert_eq!(fragment.origin, FragmentOrigin::Structural);
        let a = fragment.code.find("a()").unwrap();
        let b = fragment.code.find("b()").unwrap();
        assert!(a < b);
    }

    #[test]
    fn every_shape_is_extractable() {
        for code in [
            "class M { foo() { hit(); } }",
            "export default { foo() { hit(); } };",
            "const foo = () => { hit(); };",
        ] {
            let fragment = from_code(code, "foo").unwrap();
            assert_eq!(fragment.origin, FragmentOrigin::Structural, "{code}");
            assert!(fragment.code.contains("hit()"), "{code}");
        }
    }

    #[test]
    fn unparseable_code_uses_text_fallback() {
        // `return` plus a stray `}` keeps this from parsing as a module.
        let code = "function foo() {\n  if (x) { return 1; }\n  y();\n}\n}";
        let fragment = from_code(code, "foo").unwrap();
        assert_eq!(fragment.origin, FragmentOrigin::Textual);
        assert!(fragment.code.starts_with("if (x) { return 1; }"));
        assert!(fragment.code.contains("y();"));
    }

    #[test]
    fn missing_method_is_fragment_not_found() {
        assert!(matches!(
            from_code("function bar() { a(); }", "foo"),
            Err(PatchError::FragmentNotFound { .. })
        ));
        assert!(matches!(
            from_code("function foo() {}", "foo"),
            Err(PatchError::FragmentNotFound { .. })
        ));
    }

    #[test]
    fn method_names_are_matched_literally() {
        assert_eq!(textual("function a$b() { go(); }", "a$b").as_deref(), Some("go();"));
        assert_eq!(textual("function axb() { go(); }", "a.b"), None);
    }
}
