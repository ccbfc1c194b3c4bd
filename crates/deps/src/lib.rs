//! # Ilmari Deps
//!
//! Dependency extraction for C sources. Shells out to a compiler in
//! `-M`/`-MM` mode, captures its output, and parses the emitted makefile
//! rule into a product and its prerequisite paths. The result feeds
//! straight into graph construction: one vertex per path, one edge per
//! prerequisite.

#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus};

use itertools::Itertools;
use regex::Regex;
use thiserror::Error;
use tracing::debug;

/// Result type for dependency extraction.
pub type Result<T> = std::result::Result<T, DepsError>;

/// Errors raised while extracting dependencies.
#[derive(Debug, Error)]
pub enum DepsError {
    /// The compiler could not be spawned at all.
    #[error("failed to run compiler '{compiler}'")]
    Spawn {
        compiler: String,
        #[source]
        source: std::io::Error,
    },

    /// The compiler ran and failed; its combined output is attached.
    #[error("compiler exited with {status}:\n{output}")]
    Compiler { status: ExitStatus, output: String },

    #[error("invalid dependency pattern")]
    Pattern(#[from] regex::Error),

    /// The compiler output did not look like a makefile rule.
    #[error("failed to parse dependency rule: {reason}")]
    Parse { reason: String },
}

impl DepsError {
    fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }
}

/// How to invoke the compiler.
#[derive(Debug, Clone)]
pub struct DepsOptions {
    /// Directories passed as `-I` arguments.
    pub include_dirs: Vec<PathBuf>,
    /// Use `-M` (system headers included) instead of `-MM`.
    pub system_headers: bool,
    /// Compiler binary to invoke.
    pub compiler: String,
}

impl Default for DepsOptions {
    fn default() -> Self {
        Self {
            include_dirs: Vec::new(),
            system_headers: false,
            compiler: "cc".to_owned(),
        }
    }
}

/// A parsed makefile rule: the product and its prerequisites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeRule {
    pub product: String,
    pub prerequisites: Vec<String>,
}

/// Ask the compiler for the dependencies of a C source file.
///
/// Runs `<compiler> -M|-MM <source> -I<dir>...`, captures stdout and
/// stderr, and parses the emitted rule.
///
/// # Errors
///
/// [`DepsError::Spawn`] if the compiler cannot be started,
/// [`DepsError::Compiler`] (with the captured output) if it exits
/// non-zero, and [`DepsError::Parse`] if the output is not a makefile
/// rule.
pub fn makedeps(source: &Path, options: &DepsOptions) -> Result<MakeRule> {
    let mode = if options.system_headers { "-M" } else { "-MM" };

    let mut command = Command::new(&options.compiler);
    command.arg(mode).arg(source);
    for dir in &options.include_dirs {
        command.arg(format!("-I{}", dir.display()));
    }

    debug!(compiler = %options.compiler, mode, source = %source.display(), "extracting dependencies");

    let output = command.output().map_err(|source_err| DepsError::Spawn {
        compiler: options.compiler.clone(),
        source: source_err,
    })?;

    if !output.status.success() {
        let mut captured = String::from_utf8_lossy(&output.stdout).into_owned();
        captured.push_str(&String::from_utf8_lossy(&output.stderr));
        return Err(DepsError::Compiler {
            status: output.status,
            output: captured,
        });
    }

    parse_rule(&String::from_utf8_lossy(&output.stdout))
}

/// Parse one makefile rule of the form emitted by `cc -M`:
///
/// ```text
/// target: prereq1 prereq2 \
///     prereq3
/// ```
///
/// Backslash-newline continuations are folded away; prerequisite order is
/// preserved.
///
/// # Errors
///
/// [`DepsError::Parse`] when no `target:` product can be matched.
pub fn parse_rule(text: &str) -> Result<MakeRule> {
    let product_re = Regex::new("^([^:]+):")?;

    let captures = product_re
        .captures(text)
        .ok_or_else(|| DepsError::parse("failed to match the product"))?;
    let matched = captures
        .get(1)
        .ok_or_else(|| DepsError::parse("failed to match the product"))?;
    let product = matched.as_str().trim().to_owned();
    if product.is_empty() {
        return Err(DepsError::parse("empty product"));
    }

    let rest = text
        .get(matched.end().saturating_add(1)..)
        .unwrap_or_default();
    let folded = rest.replace("\\\r\n", " ").replace("\\\n", " ");
    let prerequisites = folded
        .split_whitespace()
        .filter(|token| *token != "\\")
        .map(str::to_owned)
        .collect_vec();

    Ok(MakeRule {
        product,
        prerequisites,
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_simple_rule() {
        let rule = parse_rule("foo.o: foo.c foo.h\n").unwrap();
        assert_eq!(rule.product, "foo.o");
        assert_eq!(rule.prerequisites, vec!["foo.c", "foo.h"]);
    }

    #[test]
    fn test_continuation_lines() {
        let text = "foo.o: foo.c \\\n    foo.h \\\n    bar.h\n";
        let rule = parse_rule(text).unwrap();
        assert_eq!(rule.product, "foo.o");
        assert_eq!(rule.prerequisites, vec!["foo.c", "foo.h", "bar.h"]);
    }

    #[test]
    fn test_crlf_continuations() {
        let text = "foo.o: foo.c \\\r\n    foo.h\r\n";
        let rule = parse_rule(text).unwrap();
        assert_eq!(rule.prerequisites, vec!["foo.c", "foo.h"]);
    }

    #[test]
    fn test_product_with_path() {
        let rule = parse_rule("out/abba.o: out/abba.c include/abba.h\n").unwrap();
        assert_eq!(rule.product, "out/abba.o");
        assert_eq!(
            rule.prerequisites,
            vec!["out/abba.c", "include/abba.h"]
        );
    }

    #[test]
    fn test_no_prerequisites() {
        let rule = parse_rule("phony:\n").unwrap();
        assert_eq!(rule.product, "phony");
        assert!(rule.prerequisites.is_empty());
    }

    #[test]
    fn test_missing_colon_fails() {
        let result = parse_rule("this is not a rule");
        assert!(matches!(result, Err(DepsError::Parse { .. })));
    }

    #[test]
    fn test_empty_output_fails() {
        assert!(parse_rule("").is_err());
    }

    #[test]
    fn test_order_preserved() {
        let rule = parse_rule("a.o: z.h a.c m.h\n").unwrap();
        assert_eq!(rule.prerequisites, vec!["z.h", "a.c", "m.h"]);
    }

    #[test]
    fn test_spawn_failure_reported() {
        let options = DepsOptions {
            compiler: "definitely-not-a-compiler-7f3a".to_owned(),
            ..DepsOptions::default()
        };
        let result = makedeps(Path::new("foo.c"), &options);
        assert!(matches!(result, Err(DepsError::Spawn { .. })));
    }
}
