use std::borrow::Cow;

use crate::condition::Condition;
use crate::error::{ParseError, Result};
use crate::filter::FilterParser;
use crate::operator::OperatorRegistry;
use crate::path;

pub const FILTER_SEPARATOR: char = '?';

/// Put right after the separator (`total?E>=subtotal`) to compare against
///  another column instead of binding a value.
pub const EXPRESSION_MARKER: char = 'E';

/// Parses full condition expressions: `path?filter` or `path?Efilter`.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionParser<'r> {
    filters: FilterParser<'r>,
}

impl<'r> ExpressionParser<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            filters: FilterParser::new(registry),
        }
    }

    pub fn with_list_delimiter(mut self, delimiter: char) -> Self {
        self.filters = self.filters.with_list_delimiter(delimiter);
        self
    }

    pub fn parse(&self, expression: &str) -> Result<Condition> {
        let (path, filter) = split_expression(expression)
            .ok_or_else(|| ParseError::MissingFilter(expression.to_string()))?;
        let path = path::parse(&path)?;

        // `E` only counts as the marker when an operator follows it, so a
        //  catalog may still define symbols starting with `E`
        let (filter, literal) = match filter.strip_prefix(EXPRESSION_MARKER) {
            Some(rest) if self.filters.registry().longest_prefix(rest).is_some() => (rest, false),
            _ => (filter, true),
        };
        let filter = self.filters.parse(filter)?;
        Ok(Condition::new(path, filter, literal))
    }
}

/// Splits at the first separator not escaped with a backslash. Escaped
///  separators in the path part come back unescaped.
fn split_expression(expression: &str) -> Option<(Cow<'_, str>, &str)> {
    let bytes = expression.as_bytes();
    let at = expression
        .char_indices()
        .find(|&(i, c)| c == FILTER_SEPARATOR && (i == 0 || bytes[i - 1] != b'\\'))
        .map(|(i, _)| i)?;
    let path = &expression[..at];
    let escaped = format!("\\{FILTER_SEPARATOR}");
    let path = if path.contains(&escaped) {
        Cow::Owned(path.replace(&escaped, &FILTER_SEPARATOR.to_string()))
    } else {
        Cow::Borrowed(path)
    };
    Some((path, &expression[at + 1..]))
}
