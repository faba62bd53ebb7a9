use std::path::{Path, PathBuf};

use regex::Regex;
use walkdir::WalkDir;

fn is_glob(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}

/// Translate a path glob into an anchored regex over `/`-separated paths.
fn glob_regex(pattern: &str) -> Option<Regex> {
    let mut out = String::from("^");
    let chars: Vec<char> = pattern.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' if chars.get(i + 1) == Some(&'*') => {
                if chars.get(i + 2) == Some(&'/') {
                    out.push_str("(?:.*/)?");
                    i += 3;
                } else {
                    out.push_str(".*");
                    i += 2;
                }
                continue;
            }
            '*' => out.push_str("[^/]*"),
            '?' => out.push_str("[^/]"),
            '[' => {
                let close = chars[i + 1..].iter().position(|&c| c == ']')?;
                let class: String = chars[i + 1..i + 1 + close].iter().collect();
                out.push('[');
                match class.strip_prefix('!') {
                    Some(rest) => {
                        out.push('^');
                        out.push_str(&rest.replace('\\', "\\\\"));
                    }
                    None => out.push_str(&class.replace('\\', "\\\\")),
                }
                out.push(']');
                i += close + 2;
                continue;
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }
    out.push('$');
    Regex::new(&out).ok()
}

fn relative_slash(path: &Path, root: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(parts.join("/"))
}

/// Expand target patterns against `root`, keeping pattern order.
///
/// Plain paths pass through as one joined path whether or not the file
/// exists. Globs match files under `root` in path order; a path matched by
/// several patterns is listed once.
pub fn expand(patterns: &[String], root: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = vec![];
    for pattern in patterns {
        let trimmed = pattern.trim();
        let trimmed = trimmed.strip_prefix("./").unwrap_or(trimmed);
        if trimmed.is_empty() {
            continue;
        }
        if !is_glob(trimmed) {
            let path = root.join(trimmed);
            if !out.contains(&path) {
                out.push(path);
            }
            continue;
        }
        let Some(re) = glob_regex(&trimmed.replace('\\', "/")) else {
            continue;
        };
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| {
                e.depth() == 0 || (e.file_name() != "node_modules" && e.file_name() != ".git")
            });
        for entry in walker.filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let matched = relative_slash(entry.path(), root)
                .map(|rel| re.is_match(&rel))
                .unwrap_or(false);
            if matched && !out.iter().any(|p| p == entry.path()) {
                out.push(entry.path().to_path_buf());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn tree() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        for file in ["src/a.js", "src/b.ts", "src/nested/c.js", "node_modules/x/d.js", "top.js"] {
            let path = dir.path().join(file);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, "").unwrap();
        }
        dir
    }

    fn names(paths: &[PathBuf], root: &Path) -> Vec<String> {
        paths.iter().map(|p| relative_slash(p, root).unwrap()).collect()
    }

    #[test]
    fn plain_paths_pass_through() {
        let root = Path::new("/project");
        let out = expand(&["./src/missing.js".to_string()], root);
        assert_eq!(out, vec![PathBuf::from("/project/src/missing.js")]);
    }

    #[test]
    fn single_star_stays_in_directory() {
        let dir = tree();
        let out = expand(&["src/*.js".to_string()], dir.path());
        assert_eq!(names(&out, dir.path()), vec!["src/a.js"]);
    }

    #[test]
    fn double_star_crosses_directories_but_skips_node_modules() {
        let dir = tree();
        let out = expand(&["**/*.js".to_string()], dir.path());
        assert_eq!(names(&out, dir.path()), vec!["src/a.js", "src/nested/c.js", "top.js"]);
    }

    #[test]
    fn classes_and_order_across_patterns() {
        let dir = tree();
        let out = expand(
            &["src/[ab].ts".to_string(), "src/?.js".to_string(), "src/b.ts".to_string()],
            dir.path(),
        );
        assert_eq!(names(&out, dir.path()), vec!["src/b.ts", "src/a.js"]);
    }

    #[test]
    fn unmatched_glob_is_empty() {
        let dir = tree();
        assert!(expand(&["lib/**/*.js".to_string()], dir.path()).is_empty());
    }
}
