use crate::cast::{self, DEFAULT_LIST_DELIMITER, Literal};
use crate::error::{ParseError, Result};
use crate::operator::{Operator, OperatorRegistry};

/// An operator and the raw value it applies to.
#[derive(Debug, Clone)]
pub struct Filter {
    operator: Operator,
    value: Option<Literal>,
}

impl Filter {
    /// Builds a filter without validating it, see [Filter::validate].
    pub fn new(operator: Operator, value: Option<Literal>) -> Self {
        Self { operator, value }
    }

    pub fn operator(&self) -> &Operator {
        &self.operator
    }

    pub fn value(&self) -> Option<&Literal> {
        self.value.as_ref()
    }

    /// The value flattened to text, as it is matched against the pattern.
    pub fn normalized_value(&self, delimiter: char) -> Option<String> {
        self.value.as_ref().map(|v| cast::normalize(v, delimiter))
    }

    pub fn validate(&self) -> Result<()> {
        self.validate_with(DEFAULT_LIST_DELIMITER)
    }

    pub fn validate_with(&self, delimiter: char) -> Result<()> {
        self.operator
            .validate_with(self.normalized_value(delimiter).as_deref(), delimiter)
    }
}

/// Parses `<symbol><value>` filter expressions against a registry.
#[derive(Debug, Clone, Copy)]
pub struct FilterParser<'r> {
    registry: &'r OperatorRegistry,
    delimiter: char,
}

impl<'r> FilterParser<'r> {
    pub fn new(registry: &'r OperatorRegistry) -> Self {
        Self {
            registry,
            delimiter: DEFAULT_LIST_DELIMITER,
        }
    }

    /// Delimiter that list values are validated with.
    pub fn with_list_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn registry(&self) -> &'r OperatorRegistry {
        self.registry
    }

    /// Matches the longest registered symbol; whatever follows is the value.
    ///  An empty remainder means no value.
    pub fn parse(&self, expression: &str) -> Result<Filter> {
        let operator = self
            .registry
            .longest_prefix(expression)
            .ok_or_else(|| ParseError::NoMatchingOperator(expression.to_string()))?;
        let value = &expression[operator.symbol().len()..];
        let value = (!value.is_empty()).then(|| Literal::Text(value.to_string()));

        let filter = Filter::new(operator.clone(), value);
        filter.validate_with(self.delimiter)?;
        Ok(filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::error::Error;

    fn parse(expr: &str) -> Result<Filter> {
        let registry = catalog::builtin().unwrap();
        FilterParser::new(&registry).parse(expr)
    }

    fn parts(expr: &str) -> (String, Option<Literal>) {
        let filter = parse(expr).unwrap();
        (
            filter.operator().symbol().to_string(),
            filter.value().cloned(),
        )
    }

    fn text(v: &str) -> Option<Literal> {
        Some(Literal::Text(v.to_string()))
    }

    #[test]
    fn operators_and_values() {
        assert_eq!(parts("=john"), ("=".into(), text("john")));
        assert_eq!(parts("!=5"), ("!=".into(), text("5")));
        assert_eq!(parts("<>5"), ("<>".into(), text("5")));
        assert_eq!(parts(">=10"), (">=".into(), text("10")));
        assert_eq!(parts("in:a,b,c"), ("in:".into(), text("a,b,c")));
        assert_eq!(parts("like:SQL book"), ("like:".into(), text("SQL book")));
        assert_eq!(parts("between:1,5"), ("between:".into(), text("1,5")));
        assert_eq!(parts("is:null"), ("is:".into(), text("null")));
    }

    #[test]
    fn longest_match_wins() {
        assert_eq!(parts("!~*abc").0, "!~*");
        assert_eq!(parts("!~abc").0, "!~");
        assert_eq!(parts("!~~abc").0, "!~~");
        assert_eq!(parts("!~~*abc").0, "!~~*");
        assert_eq!(parts("<=5").0, "<=");
        assert_eq!(parts("<=>").0, "<=>");
        assert_eq!(parts("b&~3").0, "b&~");
    }

    #[test]
    fn empty_remainder_is_no_value() {
        let (symbol, value) = parts("<=>");
        assert_eq!(symbol, "<=>");
        assert_eq!(value, None);
        assert_eq!(parts("=").1, None);
    }

    #[test]
    fn unknown_operator() {
        assert!(matches!(
            parse("@@x"),
            Err(Error::Parse(ParseError::NoMatchingOperator(_)))
        ));
    }

    #[test]
    fn values_are_validated() {
        assert!(matches!(parse("in:"), Err(Error::Validation { .. })));
        assert!(matches!(parse("between:1"), Err(Error::Validation { .. })));
        assert!(matches!(parse("date:2024"), Err(Error::Validation { .. })));
        assert!(matches!(parse("is:maybe"), Err(Error::Validation { .. })));
        assert!(matches!(parse("b&x"), Err(Error::Validation { .. })));
        assert!(matches!(parse("~a[b"), Err(Error::Validation { .. })));
        assert!(parse("is:NULL").is_ok());
        assert!(parse("between:1\\,5,9").is_ok());
    }

    #[test]
    fn list_literals_validate_normalized() {
        let registry = catalog::builtin().unwrap();
        let between = registry.resolve("between:").unwrap().clone();
        let ok = Filter::new(between.clone(), Some(Literal::List(vec!["1".into(), "9".into()])));
        assert!(ok.validate().is_ok());
        let short = Filter::new(between, Some(Literal::List(vec!["1".into()])));
        assert!(short.validate().is_err());
    }
}
