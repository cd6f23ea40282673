//! JOIN clauses, either declared explicitly on the query builder or inferred
//!  from the relation segments of a multi-segment path.
use std::fmt;
use std::str::FromStr;

use tracing::{debug, trace};

use crate::error::ParseError;
use crate::lex::{Lexer, TokenType};
use crate::path::Path;
use crate::sanitize::Sanitizer;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
            Self::Right => "RIGHT",
            Self::Cross => "CROSS",
        }
    }
}

impl FromStr for JoinType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(Self::Inner),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            "cross" => Ok(Self::Cross),
            _ => Err(ParseError::InvalidJoinType(s.to_string())),
        }
    }
}

impl fmt::Display for JoinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// A rendered-on-demand JOIN clause. Identifiers are stored sanitized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    kind: JoinType,
    table: String,
    alias: Option<String>,
    condition: Option<String>,
}

impl Join {
    /// Builds a join from caller-supplied text. The table, alias and each
    ///  term of the condition go through `sanitizer`.
    pub fn new(
        kind: JoinType,
        table: &str,
        condition: Option<&str>,
        alias: Option<&str>,
        sanitizer: &Sanitizer,
    ) -> Self {
        let alias = alias
            .map(|a| sanitizer.simple_identifier(a))
            .filter(|a| !a.is_empty());
        let condition = condition
            .map(|c| sanitize_condition(c, sanitizer))
            .filter(|c| !c.is_empty());
        Self {
            kind,
            table: sanitizer.sanitize_expression(table),
            alias,
            condition,
        }
    }

    pub fn kind(&self) -> JoinType {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    pub fn condition(&self) -> Option<&str> {
        self.condition.as_deref()
    }

    /// Joins are deduplicated on table plus alias.
    pub fn key(&self) -> (String, Option<String>) {
        (self.table.clone(), self.alias.clone())
    }
}

impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} JOIN {}", self.kind, self.table)?;
        if let Some(alias) = &self.alias {
            write!(f, " AS {alias}")?;
        }
        // CROSS joins never carry a condition
        if let Some(condition) = &self.condition
            && self.kind != JoinType::Cross
        {
            write!(f, " ON {condition}")?;
        }
        Ok(())
    }
}

/// Derives the JOIN clauses a path needs, relative to `base_table`. The
///  first hop's keys are qualified with `base_alias`, the name the FROM
///  clause gives the base table, or the table itself without one.
///
/// Every segment between the first and the last is a join target chained to
///  the segment before it through its `on` pairs. Segments without `on` are
///  skipped unless they're CROSS joins. Paths rooted at another table
///  contribute nothing.
pub fn infer_joins(
    base_table: &str,
    base_alias: Option<&str>,
    path: &Path,
    sanitizer: &Sanitizer,
) -> Vec<Join> {
    if path.len() < 2 {
        return Vec::new();
    }
    let base = path.first();
    if base.name() != base_table {
        debug!(
            path = %path,
            base_table,
            "path is rooted at another table, no joins inferred"
        );
        return Vec::new();
    }

    let mut joins = Vec::new();
    let mut previous = base_alias.unwrap_or(base_table);
    for segment in &path.relations()[1..] {
        let kind = segment.join_type().unwrap_or_default();
        let target = segment.reference();

        let condition = segment.join_keys().map(|keys| {
            keys.iter()
                .map(|(source, dest)| {
                    format!(
                        "{}.{} = {}.{}",
                        sanitizer.simple_identifier(previous),
                        sanitizer.simple_identifier(source),
                        sanitizer.simple_identifier(target),
                        sanitizer.simple_identifier(dest),
                    )
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        });

        if condition.is_some() || kind == JoinType::Cross {
            joins.push(Join {
                kind,
                table: sanitizer.simple_identifier(segment.name()),
                alias: segment.alias().map(|a| sanitizer.simple_identifier(a)),
                condition,
            });
        } else {
            trace!(segment = %segment, "segment has no join keys, skipping");
        }
        previous = target;
    }
    joins
}

/// Sanitizes a hand-written join condition of the form
///  `a.x = b.y AND c.z = d.w`. Each side of each equality is sanitized as an
///  expression; anything that isn't an equality is sanitized whole.
pub fn sanitize_condition(condition: &str, sanitizer: &Sanitizer) -> String {
    split_conjunction(condition)
        .into_iter()
        .map(|term| match term.split_once('=') {
            Some((left, right)) => format!(
                "{} = {}",
                sanitizer.sanitize_expression(left),
                sanitizer.sanitize_expression(right)
            ),
            None => sanitizer.sanitize_expression(term),
        })
        .filter(|term| !term.is_empty())
        .collect::<Vec<_>>()
        .join(" AND ")
}

/// Splits on top-level `AND` keywords.
fn split_conjunction(condition: &str) -> Vec<&str> {
    let mut terms = Vec::new();
    let mut depth = 0isize;
    let mut from = 0;
    for token in Lexer::new(condition) {
        let Ok(token) = token else {
            break;
        };
        match token.ty {
            TokenType::ParenLeft => depth += 1,
            TokenType::ParenRight => depth -= 1,
            TokenType::Word if depth == 0 => {
                if condition[token.start()..token.end()].eq_ignore_ascii_case("and") {
                    terms.push(&condition[from..token.start()]);
                    from = token.end();
                }
            }
            _ => {}
        }
    }
    terms.push(&condition[from..]);
    terms
}
