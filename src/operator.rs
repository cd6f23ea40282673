//! Operator definitions and the registry that resolves filter symbols.
//!
//! Registration is a two-step affair: a [RegistryBuilder] validates and links
//!  each [OperatorConfig] as it's added, then [RegistryBuilder::build]
//!  freezes everything into an [OperatorRegistry] that is only ever read.
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;

use crate::cast::DEFAULT_LIST_DELIMITER;
use crate::engine::Engine;
use crate::error::{ConfigError, Error, Result};

/// Most operators an alias chain may hold, the direct one at its end
///  included. Registering a longer chain fails.
pub const MAX_ALIAS_DEPTH: usize = 4;

/// Applied to `word:` style operators that don't declare a pattern.
pub const DEFAULT_COLON_PATTERN: &str = ".+";

/// Stands for the list delimiter in validation patterns.
pub const DELIMITER_PLACEHOLDER: &str = "{{delimiter}}";

/// Key of the engine-independent template in a per-engine map.
pub const DEFAULT_TEMPLATE: &str = "default";

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CastRule {
    LikeStart,
    Like,
    LikeEnd,
    List,
    Date,
    Month,
    Year,
    Period,
}

impl CastRule {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LikeStart => "like_start",
            Self::Like => "like",
            Self::LikeEnd => "like_end",
            Self::List => "list",
            Self::Date => "date",
            Self::Month => "month",
            Self::Year => "year",
            Self::Period => "period",
        }
    }
}

impl FromStr for CastRule {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "like_start" => Self::LikeStart,
            "like" => Self::Like,
            "like_end" => Self::LikeEnd,
            "list" => Self::List,
            "date" => Self::Date,
            "month" => Self::Month,
            "year" => Self::Year,
            "period" => Self::Period,
            _ => return Err(s.to_string()),
        })
    }
}

impl fmt::Display for CastRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Templates {
    Single(String),
    PerEngine(IndexMap<String, String>),
}

impl Templates {
    fn lookup(&self, engine: &Engine) -> Option<&str> {
        match self {
            Self::Single(template) => Some(template),
            Self::PerEngine(map) => map
                .get(engine.as_str())
                .or_else(|| map.get(DEFAULT_TEMPLATE))
                .map(String::as_str),
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Self::Single(template) => template.is_empty(),
            Self::PerEngine(map) => map.is_empty(),
        }
    }
}

/// One operator as declared in a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorConfig {
    pub symbol: String,
    /// Category tag, the catalog's `type`.
    pub kind: String,
    pub name: String,
    pub description: String,
    pub sql: Option<Templates>,
    pub pattern: Option<String>,
    pub cast: Vec<CastRule>,
    /// Symbol of the operator this one delegates to.
    pub base: Option<String>,
}

impl OperatorConfig {
    pub fn new(
        symbol: impl Into<String>,
        kind: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            kind: kind.into(),
            name: name.into(),
            description: description.into(),
            sql: None,
            pattern: None,
            cast: Vec::new(),
            base: None,
        }
    }

    pub fn sql(mut self, template: impl Into<String>) -> Self {
        self.sql = Some(Templates::Single(template.into()));
        self
    }

    pub fn sql_for(mut self, engine: impl Into<String>, template: impl Into<String>) -> Self {
        let mut map = match self.sql.take() {
            Some(Templates::PerEngine(map)) => map,
            Some(Templates::Single(default)) => IndexMap::from([(DEFAULT_TEMPLATE.to_string(), default)]),
            None => IndexMap::new(),
        };
        map.insert(engine.into(), template.into());
        self.sql = Some(Templates::PerEngine(map));
        self
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn cast(mut self, rules: impl IntoIterator<Item = CastRule>) -> Self {
        self.cast = rules.into_iter().collect();
        self
    }

    pub fn alias_of(mut self, base: impl Into<String>) -> Self {
        self.base = Some(base.into());
        self
    }
}

/// An [OperatorConfig] with its pattern compiled.
#[derive(Debug)]
pub struct Definition {
    config: OperatorConfig,
    /// Source text, placeholder intact, and its build for the default
    ///  delimiter.
    pattern: Option<(String, Regex)>,
}

impl Definition {
    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }
}

/// A registered operator, linked to its base when it's an alias.
#[derive(Debug, Clone)]
pub enum Operator {
    Direct(Arc<Definition>),
    Delegating(Arc<Definition>, Box<Operator>),
}

impl Operator {
    fn definition(&self) -> &Definition {
        match self {
            Self::Direct(def) | Self::Delegating(def, _) => def,
        }
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.definition().config
    }

    pub fn symbol(&self) -> &str {
        &self.config().symbol
    }

    pub fn base(&self) -> Option<&Operator> {
        match self {
            Self::Direct(_) => None,
            Self::Delegating(_, base) => Some(base),
        }
    }

    /// Length of the alias chain below this operator.
    pub fn depth(&self) -> usize {
        self.base().map_or(0, |base| base.depth() + 1)
    }

    /// Own template for `engine`, else own default, else the base's lookup.
    pub fn template_for(&self, engine: &Engine) -> Option<&str> {
        self.config()
            .sql
            .as_ref()
            .and_then(|t| t.lookup(engine))
            .or_else(|| self.base().and_then(|b| b.template_for(engine)))
    }

    fn has_any_template(&self) -> bool {
        self.config().sql.as_ref().is_some_and(|t| !t.is_empty())
            || self.base().is_some_and(Operator::has_any_template)
    }

    /// Own pattern, else the base's, built for the default delimiter.
    pub fn validation_pattern(&self) -> Option<&Regex> {
        self.pattern().map(|(_, regex)| regex)
    }

    fn pattern(&self) -> Option<&(String, Regex)> {
        self.definition()
            .pattern
            .as_ref()
            .or_else(|| self.base().and_then(Operator::pattern))
    }

    /// Own rules when it declares any, else the base's.
    pub fn casting_rules(&self) -> &[CastRule] {
        match (&self.config().cast, self.base()) {
            (own, Some(base)) if own.is_empty() => base.casting_rules(),
            (own, _) => own.as_slice(),
        }
    }

    /// Checks a raw value against the operator's pattern. A missing value is
    ///  checked as the empty string; no pattern accepts anything.
    pub fn validate(&self, value: Option<&str>) -> Result<()> {
        self.validate_with(value, DEFAULT_LIST_DELIMITER)
    }

    /// Like [Operator::validate], with `delimiter` standing in for
    ///  [DELIMITER_PLACEHOLDER].
    pub fn validate_with(&self, value: Option<&str>, delimiter: char) -> Result<()> {
        let value = value.unwrap_or_default();
        let invalid = || Error::Validation {
            symbol: self.symbol().to_string(),
            value: value.to_string(),
        };
        let matches = match self.pattern() {
            None => true,
            Some((source, _))
                if delimiter != DEFAULT_LIST_DELIMITER && source.contains(DELIMITER_PLACEHOLDER) =>
            {
                compile_pattern(source, delimiter)
                    .map_err(|_| invalid())?
                    .is_match(value)
            }
            Some((_, regex)) => regex.is_match(value),
        };
        if matches { Ok(()) } else { Err(invalid()) }
    }
}

fn compile_pattern(source: &str, delimiter: char) -> std::result::Result<Regex, regex::Error> {
    let delimiter = regex::escape(delimiter.encode_utf8(&mut [0; 4]));
    Regex::new(&source.replace(DELIMITER_PLACEHOLDER, &delimiter))
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    operators: IndexMap<String, Operator>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn contains(&self, symbol: &str) -> bool {
        self.operators.contains_key(symbol)
    }

    /// Validates `config` and links it to its base. Bases must be registered
    ///  before the operators that delegate to them.
    pub fn register(&mut self, config: OperatorConfig) -> Result<&mut Self, ConfigError> {
        let symbol = config.symbol.clone();
        if symbol.is_empty() {
            return Err(ConfigError::MissingField {
                symbol,
                field: "symbol",
            });
        }
        for (field, value) in [
            ("type", &config.kind),
            ("name", &config.name),
            ("description", &config.description),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::MissingField { symbol, field });
            }
        }
        if self.operators.contains_key(&symbol) {
            return Err(ConfigError::DuplicateSymbol(symbol));
        }

        let base = match &config.base {
            None => None,
            Some(base) if *base == symbol => return Err(ConfigError::SelfReference(symbol)),
            Some(base) => match self.operators.get(base) {
                // the new chain holds op's chain plus the new operator
                Some(op) if op.depth() + 2 > MAX_ALIAS_DEPTH => {
                    return Err(ConfigError::ChainTooDeep(symbol));
                }
                Some(op) => Some(op.clone()),
                None => {
                    return Err(ConfigError::UnresolvedBase {
                        symbol,
                        base: base.clone(),
                    });
                }
            },
        };

        let pattern = match &config.pattern {
            Some(p) => Some(p.clone()),
            // an inherited pattern wins over the colon default
            None if base.as_ref().is_some_and(|b| b.validation_pattern().is_some()) => None,
            None if symbol.ends_with(':') => Some(DEFAULT_COLON_PATTERN.to_string()),
            None => None,
        };
        let pattern = pattern
            .map(|p| compile_pattern(&p, DEFAULT_LIST_DELIMITER).map(|regex| (p, regex)))
            .transpose()
            .map_err(|e| ConfigError::InvalidPattern {
                symbol: symbol.clone(),
                reason: e.to_string(),
            })?;

        let definition = Arc::new(Definition { config, pattern });
        let operator = match base {
            None => Operator::Direct(definition),
            Some(base) => Operator::Delegating(definition, Box::new(base)),
        };
        if !operator.has_any_template() {
            return Err(ConfigError::NoTemplate(symbol));
        }

        self.operators.insert(symbol, operator);
        Ok(self)
    }

    /// Freezes the registry.
    pub fn build(self) -> OperatorRegistry {
        let mut by_length: Vec<String> = self.operators.keys().cloned().collect();
        // stable: ties keep registration order
        by_length.sort_by_key(|symbol| Reverse(symbol.len()));
        OperatorRegistry {
            operators: self.operators,
            by_length,
        }
    }
}

/// Read-only set of operators, safe to share between threads.
#[derive(Debug, Clone)]
pub struct OperatorRegistry {
    operators: IndexMap<String, Operator>,
    by_length: Vec<String>,
}

impl OperatorRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    pub fn resolve(&self, symbol: &str) -> Result<&Operator> {
        self.operators
            .get(symbol)
            .ok_or_else(|| Error::UnknownOperator(symbol.to_string()))
    }

    pub fn symbols_by_length_desc(&self) -> &[String] {
        &self.by_length
    }

    /// The operator with the longest symbol that prefixes `expression`.
    pub fn longest_prefix(&self, expression: &str) -> Option<&Operator> {
        self.by_length
            .iter()
            .find(|symbol| expression.starts_with(symbol.as_str()))
            .and_then(|symbol| self.operators.get(symbol))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operator> {
        self.operators.values()
    }
}
