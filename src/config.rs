//! Query documents: a whole SELECT described in YAML or JSON.
//!
//! ```yaml
//! table: orders
//! select: id, total
//! where:
//!   - status?in:paid,shipped
//!   - orders__customers[on:customer_id=id]__country?=NL
//! orderBy: {total: desc}
//! limit: 20
//! ```
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;

use crate::error::{ConfigError, Result};
use crate::join::JoinType;
use crate::lex;
use crate::query::{Conditions, Direction, QueryBuilder};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct QueryConfig {
    pub table: Option<String>,
    pub alias: Option<String>,
    pub select: Option<Columns>,
    pub distinct: Option<bool>,
    #[serde(rename = "where")]
    pub where_: Option<ConditionSpec>,
    pub and_where: Option<ConditionSpec>,
    pub or_where: Option<ConditionSpec>,
    pub and_where_or: Option<ConditionSpec>,
    pub inner_join: Option<JoinList>,
    pub left_join: Option<JoinList>,
    pub right_join: Option<JoinList>,
    pub cross_join: Option<JoinList>,
    pub group_by: Option<Columns>,
    pub having: Option<ConditionSpec>,
    pub order_by: Option<OrderSpec>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// One expression or a (possibly nested) list of them.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    One(String),
    All(Vec<ConditionSpec>),
}

impl From<&ConditionSpec> for Conditions {
    fn from(spec: &ConditionSpec) -> Self {
        match spec {
            ConditionSpec::One(expression) => Conditions::One(expression.clone()),
            ConditionSpec::All(items) => Conditions::All(items.iter().map(Into::into).collect()),
        }
    }
}

/// A comma-separated string or a list of columns.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum Columns {
    One(String),
    Many(Vec<String>),
}

impl Columns {
    /// Splits a single string at top-level commas, so `ROUND(x, 2), y` stays
    ///  two columns.
    pub fn to_vec(&self) -> Vec<String> {
        match self {
            Self::One(columns) => lex::split_arguments(columns)
                .into_iter()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string)
                .collect(),
            Self::Many(columns) => columns.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JoinSpec {
    pub table: String,
    pub on: Option<String>,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum JoinList {
    One(JoinSpec),
    Many(Vec<JoinSpec>),
}

impl JoinList {
    pub fn as_slice(&self) -> &[JoinSpec] {
        match self {
            Self::One(join) => std::slice::from_ref(join),
            Self::Many(joins) => joins,
        }
    }
}

/// `"name desc, id"`, a list of such items, or `{column: direction}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum OrderSpec {
    One(String),
    Many(Vec<String>),
    Map(IndexMap<String, String>),
}

impl OrderSpec {
    pub fn to_vec(&self) -> Result<Vec<(String, Direction)>> {
        let items: Vec<&str> = match self {
            Self::One(items) => lex::split_arguments(items),
            Self::Many(items) => items.iter().map(String::as_str).collect(),
            Self::Map(map) => {
                return map
                    .iter()
                    .map(|(column, direction)| Ok((column.clone(), direction.parse::<Direction>()?)))
                    .collect();
            }
        };
        items
            .into_iter()
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(order_item)
            .collect()
    }
}

/// `column` or `column direction`.
fn order_item(item: &str) -> Result<(String, Direction)> {
    match item.rsplit_once(char::is_whitespace) {
        Some((column, direction)) if direction.parse::<Direction>().is_ok() => {
            Ok((column.trim().to_string(), direction.parse::<Direction>()?))
        }
        _ => Ok((item.to_string(), Direction::default())),
    }
}

impl QueryConfig {
    pub fn from_yaml_str(source: &str) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Err(ConfigError::EmptyQuery);
        }
        let config: Self =
            serde_yaml::from_str(source).map_err(|e| ConfigError::Format(e.to_string()))?;
        config.non_empty()
    }

    pub fn from_json_str(source: &str) -> Result<Self, ConfigError> {
        if source.trim().is_empty() {
            return Err(ConfigError::EmptyQuery);
        }
        let config: Self =
            serde_json::from_str(source).map_err(|e| ConfigError::Format(e.to_string()))?;
        config.non_empty()
    }

    /// `.json` files are read as JSON, anything else as YAML.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::from_json_str(&source),
            _ => Self::from_yaml_str(&source),
        }
    }

    fn non_empty(self) -> Result<Self, ConfigError> {
        let empty = self.table.is_none()
            && self.select.is_none()
            && self.where_.is_none()
            && self.and_where.is_none()
            && self.or_where.is_none()
            && self.and_where_or.is_none()
            && self.having.is_none();
        if empty {
            Err(ConfigError::EmptyQuery)
        } else {
            Ok(self)
        }
    }

    /// Replays the document onto `builder`: table, select, joins, the WHERE
    ///  family, grouping, HAVING, ordering, then limits.
    pub fn apply<'r>(&self, mut builder: QueryBuilder<'r>) -> Result<QueryBuilder<'r>> {
        if let Some(table) = &self.table {
            builder = builder.table(table);
        }
        if let Some(alias) = &self.alias {
            builder = builder.alias(alias);
        }
        if let Some(select) = &self.select {
            builder = builder.select(select.to_vec());
        }
        if let Some(distinct) = self.distinct {
            builder = builder.distinct(distinct);
        }

        for join in self.inner_join.iter().flat_map(JoinList::as_slice) {
            builder = builder.join(
                JoinType::Inner,
                &join.table,
                join.on.as_deref(),
                join.alias.as_deref(),
            );
        }
        for join in self.left_join.iter().flat_map(JoinList::as_slice) {
            builder = builder.join(
                JoinType::Left,
                &join.table,
                join.on.as_deref(),
                join.alias.as_deref(),
            );
        }
        for join in self.right_join.iter().flat_map(JoinList::as_slice) {
            builder = builder.join(
                JoinType::Right,
                &join.table,
                join.on.as_deref(),
                join.alias.as_deref(),
            );
        }
        for join in self.cross_join.iter().flat_map(JoinList::as_slice) {
            builder = builder.cross_join(&join.table, join.alias.as_deref());
        }

        if let Some(spec) = &self.where_ {
            builder = builder.where_(spec)?;
        }
        if let Some(spec) = &self.and_where {
            builder = builder.and_where(spec)?;
        }
        if let Some(spec) = &self.or_where {
            builder = builder.or_where(spec)?;
        }
        if let Some(spec) = &self.and_where_or {
            builder = builder.and_where_or(spec)?;
        }

        if let Some(group_by) = &self.group_by {
            builder = builder.group_by(group_by.to_vec());
        }
        if let Some(spec) = &self.having {
            builder = builder.having(spec)?;
        }
        if let Some(order_by) = &self.order_by {
            for (column, direction) in order_by.to_vec()? {
                builder = builder.order_by(column, direction);
            }
        }
        if let Some(limit) = self.limit {
            builder = builder.limit(limit);
        }
        if let Some(offset) = self.offset {
            builder = builder.offset(offset);
        }
        Ok(builder)
    }
}
