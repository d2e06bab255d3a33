//! Architectural Enforcement
//!
//! Source scanning helpers shared by the integration tests in `tests/`:
//! - No blocking I/O inside async code
//! - No sleeping in production code
//!
//! The scanners are line based. They find the function enclosing a line by
//! walking backwards to the nearest `fn` signature, and they treat everything
//! after a `#[cfg(test)]` attribute as test code.

use std::fmt;
use std::path::{Path, PathBuf};

/// Production source trees, relative to the workspace root
pub const PRODUCTION_DIRS: &[&str] = &["backtest/core/src", "backtest/cli/src"];

/// Workspace root, two levels above this crate
#[must_use]
pub fn workspace_root() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("..")
}

// ============================================================================
// Source Files
// ============================================================================

/// One Rust file split into lines
#[derive(Debug, Clone)]
pub struct SourceFile {
    /// Path relative to the workspace root
    pub path: PathBuf,
    /// File contents by line
    pub lines: Vec<String>,
}

impl SourceFile {
    /// Build from in-memory text
    #[must_use]
    pub fn from_text(path: impl Into<PathBuf>, text: &str) -> Self {
        Self {
            path: path.into(),
            lines: text.lines().map(str::to_string).collect(),
        }
    }

    fn line_refs(&self) -> Vec<&str> {
        self.lines.iter().map(String::as_str).collect()
    }

    /// Lines of production code: `(1-based line number, code without comment)`
    #[must_use]
    pub fn production_lines(&self) -> Vec<(usize, String)> {
        let lines = self.line_refs();
        lines
            .iter()
            .enumerate()
            .filter(|(idx, _)| !is_test_code(&lines, *idx))
            .map(|(idx, line)| (idx + 1, code_part(line).to_string()))
            .filter(|(_, code)| !code.trim().is_empty())
            .collect()
    }

    /// Whether line `number` (1-based) sits inside an `async fn`
    #[must_use]
    pub fn in_async_fn(&self, number: usize) -> bool {
        let lines = self.line_refs();
        enclosing_fn(&lines, number.saturating_sub(1)).is_some_and(|idx| is_async_fn(lines[idx]))
    }
}

/// Every `.rs` file under the production trees
#[must_use]
pub fn production_sources() -> Vec<SourceFile> {
    let root = workspace_root();
    let mut files = Vec::new();

    for dir in PRODUCTION_DIRS {
        let base = root.join(dir);
        for entry in walkdir::WalkDir::new(&base)
            .sort_by_file_name()
            .into_iter()
            .filter_map(Result::ok)
        {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) != Some("rs") {
                continue;
            }
            let Ok(text) = std::fs::read_to_string(path) else {
                continue;
            };
            let relative = path.strip_prefix(&root).unwrap_or(path);
            files.push(SourceFile::from_text(relative, &text));
        }
    }
    files
}

// ============================================================================
// Violations
// ============================================================================

/// A rule broken on one line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// File, relative to the workspace root
    pub path: PathBuf,
    /// 1-based line number
    pub line: usize,
    /// What was found
    pub kind: &'static str,
    /// Offending source, trimmed
    pub text: String,
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} - {}: {}",
            self.path.display(),
            self.line,
            self.kind,
            self.text
        )
    }
}

// ============================================================================
// Line Classification
// ============================================================================

/// Code before a `//` comment
#[must_use]
pub fn code_part(line: &str) -> &str {
    line.split("//").next().unwrap_or(line)
}

/// Strip `pub`, `pub(...)`, `const`, `unsafe` and `async` to expose `fn`
fn strip_fn_qualifiers(mut line: &str) -> &str {
    loop {
        let before = line;
        if let Some(rest) = line.strip_prefix("pub(") {
            line = rest.split_once(')').map_or(rest, |(_, tail)| tail).trim_start();
        }
        for prefix in ["pub ", "const ", "unsafe ", "async "] {
            if let Some(rest) = line.strip_prefix(prefix) {
                line = rest.trim_start();
            }
        }
        if line == before {
            return line;
        }
    }
}

/// Whether a line starts a function signature
#[must_use]
pub fn is_fn_signature(line: &str) -> bool {
    strip_fn_qualifiers(line.trim()).starts_with("fn ")
}

fn is_async_fn(line: &str) -> bool {
    let line = line.trim();
    is_fn_signature(line) && line.contains("async ")
}

/// Index of the nearest function signature at or above `idx`
#[must_use]
pub fn enclosing_fn(lines: &[&str], idx: usize) -> Option<usize> {
    (0..=idx.min(lines.len().saturating_sub(1)))
        .rev()
        .find(|&i| is_fn_signature(lines[i]))
}

/// Whether line `idx` belongs to test code
///
/// Either a `#[cfg(test)]` item opened above it, or its enclosing function
/// carries a test attribute.
#[must_use]
pub fn is_test_code(lines: &[&str], idx: usize) -> bool {
    if lines[..=idx.min(lines.len().saturating_sub(1))]
        .iter()
        .any(|line| line.trim().starts_with("#[cfg(test)]"))
    {
        return true;
    }

    let Some(fn_idx) = enclosing_fn(lines, idx) else {
        return false;
    };
    for line in lines[..fn_idx].iter().rev() {
        let line = line.trim();
        if line.starts_with("#[test]") || line.starts_with("#[tokio::test") {
            return true;
        }
        if !line.starts_with("#[") && !line.starts_with("///") {
            break;
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fn_signatures() {
        assert!(is_fn_signature("fn main() {"));
        assert!(is_fn_signature("    pub async fn load(&self) -> Result<()> {"));
        assert!(is_fn_signature("pub(crate) fn helper() {"));
        assert!(is_fn_signature("pub(super) const fn limit() -> usize {"));
        assert!(!is_fn_signature("let f = fn_pointer;"));
        assert!(!is_fn_signature("// fn commented()"));
    }

    #[test]
    fn test_async_detection() {
        let file = SourceFile::from_text(
            "a.rs",
            "pub async fn bad() {\n    std::fs::read(\"x\");\n}\nfn fine() {\n    std::fs::read(\"x\");\n}\n",
        );
        assert!(file.in_async_fn(2));
        assert!(!file.in_async_fn(5));
    }

    #[test]
    fn test_test_code_detection() {
        let lines = [
            "fn production() {}",
            "#[tokio::test]",
            "async fn test_something() {",
            "    std::fs::read(\"x\");",
            "}",
            "#[cfg(test)]",
            "mod tests {",
            "    fn helper() {}",
            "}",
        ];
        assert!(!is_test_code(&lines, 0));
        assert!(is_test_code(&lines, 3));
        assert!(is_test_code(&lines, 7));
    }

    #[test]
    fn test_production_lines_skip_comments_and_tests() {
        let file = SourceFile::from_text(
            "b.rs",
            "fn a() {\n    // std::thread::sleep\n    work();\n}\n#[cfg(test)]\nmod tests {}\n",
        );
        let lines = file.production_lines();
        assert_eq!(lines.len(), 3);
        assert!(lines.iter().all(|(_, code)| !code.contains("sleep")));
    }

    #[test]
    fn test_production_sources_found() {
        let files = production_sources();
        assert!(files
            .iter()
            .any(|f| f.path.ends_with("backtest/core/src/lib.rs")));
        assert!(files
            .iter()
            .any(|f| f.path.ends_with("backtest/cli/src/main.rs")));
    }
}
