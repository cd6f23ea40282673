//! Qualified column text for the target of a path.
use once_cell::sync::Lazy;
use regex::Regex;

use crate::lex;
use crate::path::Path;
use crate::sanitize::Sanitizer;

static NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(\.\d+)?$").expect("valid regex"));

static NESTED_CALL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_]+\s*\(.*\)$").expect("valid regex"));

/// The sanitized column a condition on `path` compares. The last segment is
///  qualified with its parent's alias or name; for function calls only the
///  bare identifier arguments are qualified.
pub fn column_from_path(path: &Path, sanitizer: &Sanitizer) -> String {
    let column = path.last().name();
    let Some(parent) = path.parent() else {
        return sanitizer.sanitize(column);
    };
    let prefix = parent.reference();

    match lex::split_function_call(column) {
        Some((name, args)) => {
            let args: Vec<String> = lex::split_arguments(args)
                .into_iter()
                .map(str::trim)
                .filter(|arg| !arg.is_empty())
                .map(|arg| {
                    if is_literal_or_expression(arg) {
                        arg.to_string()
                    } else {
                        format!("{prefix}.{arg}")
                    }
                })
                .collect();
            sanitizer.sanitize(&format!("{name}({})", args.join(", ")))
        }
        None => sanitizer.sanitize(&format!("{prefix}.{column}")),
    }
}

/// Arguments that must not be qualified with a table prefix.
fn is_literal_or_expression(arg: &str) -> bool {
    arg == "*"
        || arg.starts_with('\'')
        || arg.starts_with('"')
        || NUMERIC.is_match(arg)
        || ["NULL", "TRUE", "FALSE"]
            .iter()
            .any(|k| k.eq_ignore_ascii_case(arg))
        || arg.contains(['+', '-', '*', '/'])
        || NESTED_CALL.is_match(arg)
        || arg.contains('.')
}
