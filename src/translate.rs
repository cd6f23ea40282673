//! Translates condition trees into parameterized SQL fragments.
use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::cast::{self, DEFAULT_LIST_DELIMITER};
use crate::condition::{CompositeCondition, Condition, Connector, Node};
use crate::engine::Engine;
use crate::error::{Error, Result};
use crate::sanitize::{self, Sanitizer};

pub mod column;
pub mod template;

/// A bound parameter value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Text(String),
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

/// SQL with `:name` placeholders and the values to bind to them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GeneratedQuery {
    sql: String,
    parameters: IndexMap<String, Value>,
}

impl GeneratedQuery {
    pub fn new(sql: impl Into<String>, parameters: IndexMap<String, Value>) -> Self {
        Self {
            sql: sql.into(),
            parameters,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn parameters(&self) -> &IndexMap<String, Value> {
        &self.parameters
    }

    pub fn into_parts(self) -> (String, IndexMap<String, Value>) {
        (self.sql, self.parameters)
    }
}

/// Hands out parameter names unique within one build. Share one between
///  fragments that end up in the same statement.
///
/// A list suffix can spell another column's name (`param_a_1` + `_2` is
///  `param_a_1_2`, the name `a_1` gets at counter 2), so every issued name
///  is remembered and a counter value whose names clash is skipped.
#[derive(Debug, Default)]
pub struct ParamNames {
    counter: usize,
    issued: HashSet<String>,
}

impl ParamNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next(&mut self, column: &str) -> String {
        let mut names = self.reserve(column, 1);
        names.pop().unwrap_or_default()
    }

    /// Names for `count` values bound to `column`: the bare name for one
    ///  value, `_1`, `_2`... suffixes for several.
    pub fn reserve(&mut self, column: &str, count: usize) -> Vec<String> {
        let column = sanitize::strip_identifier(column);
        let column = if column.is_empty() { "value" } else { &column };
        loop {
            self.counter += 1;
            let name = format!("param_{column}_{}", self.counter);
            let names = match count {
                1 => vec![name],
                _ => (1..=count).map(|i| format!("{name}_{i}")).collect(),
            };
            if names.iter().all(|n| !self.issued.contains(n)) {
                self.issued.extend(names.iter().cloned());
                return names;
            }
        }
    }
}

/// Builds WHERE/HAVING fragments for one engine.
#[derive(Debug, Clone)]
pub struct WhereBuilder {
    engine: Engine,
    delimiter: char,
    sanitizer: Sanitizer,
}

impl WhereBuilder {
    pub fn new(engine: impl Into<Engine>) -> Self {
        Self {
            engine: engine.into(),
            delimiter: DEFAULT_LIST_DELIMITER,
            sanitizer: Sanitizer::default(),
        }
    }

    pub fn with_list_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.sanitizer = sanitizer;
        self
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn sanitizer(&self) -> &Sanitizer {
        &self.sanitizer
    }

    pub fn build(&self, node: &Node) -> Result<GeneratedQuery> {
        self.build_with(node, &mut ParamNames::new())
    }

    pub fn build_with(&self, node: &Node, names: &mut ParamNames) -> Result<GeneratedQuery> {
        match node {
            Node::Leaf(condition) => self.build_condition(condition, names),
            Node::Group(group) => self.build_group(group, names),
        }
    }

    fn build_group(&self, group: &CompositeCondition, names: &mut ParamNames) -> Result<GeneratedQuery> {
        if group.is_empty() {
            let identity = match group.connector() {
                Connector::And => "(1 = 1)",
                Connector::Or => "(1 = 0)",
            };
            return Ok(GeneratedQuery::new(identity, IndexMap::new()));
        }

        let mut parts = Vec::with_capacity(group.len());
        let mut parameters = IndexMap::new();
        for child in group.children() {
            let (sql, child_parameters) = self.build_with(child, names)?.into_parts();
            parts.push(sql);
            parameters.extend(child_parameters);
        }
        let connector = format!(" {} ", group.connector());
        Ok(GeneratedQuery::new(
            format!("({})", parts.join(&connector)),
            parameters,
        ))
    }

    fn build_condition(&self, condition: &Condition, names: &mut ParamNames) -> Result<GeneratedQuery> {
        let filter = condition.filter();
        let operator = filter.operator();
        let template = operator
            .template_for(&self.engine)
            .ok_or_else(|| Error::NoTemplateForEngine {
                symbol: operator.symbol().to_string(),
                engine: self.engine.to_string(),
            })?;
        trace!(symbol = operator.symbol(), engine = %self.engine, template, "resolved template");

        let column = column::column_from_path(condition.path(), &self.sanitizer);
        let value = filter.normalized_value(self.delimiter);

        if !condition.is_literal() {
            let raw = value.unwrap_or_default();
            let expression = self.sanitizer.try_sanitize(&raw)?;
            if expression.is_empty() {
                return Err(Error::Validation {
                    symbol: operator.symbol().to_string(),
                    value: raw,
                });
            }
            let template = template.replace(template::VALUE, &expression);
            let (sql, parameters) = template::render(&template, &column, IndexMap::new())?;
            return Ok(GeneratedQuery::new(sql, parameters));
        }

        let values = match value {
            Some(value) => {
                operator.validate_with(Some(value.as_str()), self.delimiter)?;
                let cast = cast::apply(value, operator.casting_rules(), self.delimiter).map_err(|e| {
                    Error::Validation {
                        symbol: operator.symbol().to_string(),
                        value: e.value,
                    }
                })?;
                Some(cast.into_values())
            }
            None => None,
        };

        let parameters = if template::is_null_check(template) {
            IndexMap::new()
        } else {
            bind(values, condition.path().last().name(), names)
        };
        let (sql, parameters) = template::render(template, &column, parameters)?;
        Ok(GeneratedQuery::new(sql, parameters))
    }
}

/// One parameter per value; several values get `_1`, `_2`... suffixes.
fn bind(values: Option<Vec<String>>, column: &str, names: &mut ParamNames) -> IndexMap<String, Value> {
    match values {
        None => IndexMap::from([(names.next(column), Value::Null)]),
        Some(values) => names
            .reserve(column, values.len())
            .into_iter()
            .zip(values)
            .map(|(name, v)| (name, Value::Text(v)))
            .collect(),
    }
}
