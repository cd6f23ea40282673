use thiserror::Error;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("value {value:?} is not valid for operator `{symbol}`")]
    Validation { symbol: String, value: String },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("operator `{symbol}` has no SQL template for engine `{engine}`")]
    NoTemplateForEngine { symbol: String, engine: String },

    /// The template asks for more values than were produced. Only reachable
    /// with a misconfigured catalog.
    #[error("template `{template}` needs {placeholder} but only {available} parameter(s) exist")]
    MissingParameter {
        template: String,
        placeholder: &'static str,
        available: usize,
    },

    #[error("unknown operator `{0}`")]
    UnknownOperator(String),

    #[error("no table specified and none could be inferred from the conditions")]
    NoTable,
}

/// Syntax errors in paths, filters and builder arguments.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("path expression is empty")]
    EmptyPath,

    #[error("empty segment at position {position}")]
    EmptySegment { position: usize },

    #[error("invalid segment name `{0}`")]
    InvalidSegmentName(String),

    #[error("segment `{0}` ends in `_` and would run into the `__` that follows it")]
    AmbiguousSegment(String),

    #[error("malformed options in segment `{segment}`: {reason}")]
    MalformedOptions { segment: String, reason: String },

    #[error("invalid join type `{0}`, expected inner, left, right or cross")]
    InvalidJoinType(String),

    #[error("no operator matches filter `{0}`")]
    NoMatchingOperator(String),

    #[error("expression `{0}` has no filter part")]
    MissingFilter(String),

    #[error("invalid connector `{0}`, expected AND or OR")]
    InvalidConnector(String),

    #[error("invalid sort direction `{0}`, expected ASC or DESC")]
    InvalidDirection(String),

    #[error("expression nests calls deeper than {limit} levels")]
    NestingTooDeep { limit: usize },
}

/// Problems with an operator catalog or a query document, reported at load
/// time.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("catalog is missing the `{0}` section")]
    MissingSection(&'static str),

    #[error("operator `{symbol}` is missing required field `{field}`")]
    MissingField { symbol: String, field: &'static str },

    #[error("operator `{symbol}` uses undeclared type `{kind}`")]
    UndeclaredType { symbol: String, kind: String },

    #[error("operator `{0}` is already registered")]
    DuplicateSymbol(String),

    #[error("operator `{symbol}` refers to base `{base}`, which is not registered")]
    UnresolvedBase { symbol: String, base: String },

    #[error("operator `{0}` uses itself as its base")]
    SelfReference(String),

    #[error("alias chain of operator `{0}` is too deep")]
    ChainTooDeep(String),

    #[error("operator `{0}` has no SQL template, directly or through its base")]
    NoTemplate(String),

    #[error("operator `{symbol}` has an invalid pattern: {reason}")]
    InvalidPattern { symbol: String, reason: String },

    #[error("operator `{symbol}` uses unknown cast rule `{rule}`")]
    UnknownCastRule { symbol: String, rule: String },

    #[error("query configuration is empty")]
    EmptyQuery,

    #[error("malformed document: {0}")]
    Format(String),

    #[error("could not read `{path}`: {reason}")]
    Io { path: String, reason: String },
}
