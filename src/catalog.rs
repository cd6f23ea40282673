//! Loads operator catalogs from YAML or JSON documents.
//!
//! A catalog has a `types` section (category metadata) and an `operators`
//!  section keyed by symbol. Operators are registered in document order, so
//!  an alias must come after the operator it delegates to.
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::ConfigError;
use crate::operator::{CastRule, OperatorConfig, OperatorRegistry, RegistryBuilder, Templates};

/// The catalog shipped with the crate.
pub const BUILTIN_CATALOG: &str = include_str!("../resources/operators.yaml");

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct CatalogDocument {
    types: Option<IndexMap<String, TypeEntry>>,
    operators: Option<IndexMap<String, OperatorEntry>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TypeEntry {
    pub name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OperatorEntry {
    #[serde(rename = "type")]
    kind: Option<String>,
    name: Option<String>,
    description: Option<String>,
    sql: Option<SqlEntry>,
    pattern: Option<String>,
    cast: Option<OneOrMany>,
    alias: Option<String>,
    #[serde(rename = "use")]
    uses: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SqlEntry {
    Single(String),
    PerEngine(IndexMap<String, String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

/// Loads the catalog embedded in the crate.
pub fn builtin() -> Result<OperatorRegistry, ConfigError> {
    from_yaml_str(BUILTIN_CATALOG)
}

pub fn from_yaml_str(source: &str) -> Result<OperatorRegistry, ConfigError> {
    let document: CatalogDocument =
        serde_yaml::from_str(source).map_err(|e| ConfigError::Format(e.to_string()))?;
    load(document)
}

pub fn from_json_str(source: &str) -> Result<OperatorRegistry, ConfigError> {
    let document: CatalogDocument =
        serde_json::from_str(source).map_err(|e| ConfigError::Format(e.to_string()))?;
    load(document)
}

/// Reads a catalog file; `.json` files are parsed as JSON, anything else as
///  YAML.
pub fn from_path(path: impl AsRef<Path>) -> Result<OperatorRegistry, ConfigError> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => from_json_str(&source),
        _ => from_yaml_str(&source),
    }
}

fn load(document: CatalogDocument) -> Result<OperatorRegistry, ConfigError> {
    let types = document.types.ok_or(ConfigError::MissingSection("types"))?;
    let operators = document
        .operators
        .ok_or(ConfigError::MissingSection("operators"))?;

    let mut builder = RegistryBuilder::new();
    for (symbol, entry) in operators {
        let config = operator_config(symbol, entry)?;
        if !types.contains_key(&config.kind) {
            return Err(ConfigError::UndeclaredType {
                symbol: config.symbol,
                kind: config.kind,
            });
        }
        builder.register(config)?;
    }

    debug!(
        operators = builder.len(),
        types = types.len(),
        "loaded operator catalog"
    );
    Ok(builder.build())
}

fn operator_config(symbol: String, entry: OperatorEntry) -> Result<OperatorConfig, ConfigError> {
    let required = |value: Option<String>, field: &'static str| {
        value
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingField {
                symbol: symbol.clone(),
                field,
            })
    };
    let kind = required(entry.kind, "type")?;
    let name = required(entry.name, "name")?;
    let description = required(entry.description, "description")?;

    let cast = match entry.cast {
        None => Vec::new(),
        Some(OneOrMany::One(rule)) => vec![rule],
        Some(OneOrMany::Many(rules)) => rules,
    }
    .into_iter()
    .map(|rule| {
        rule.parse::<CastRule>()
            .map_err(|rule| ConfigError::UnknownCastRule {
                symbol: symbol.clone(),
                rule,
            })
    })
    .collect::<Result<Vec<_>, _>>()?;

    Ok(OperatorConfig {
        sql: entry.sql.map(|sql| match sql {
            SqlEntry::Single(template) => Templates::Single(template),
            SqlEntry::PerEngine(map) => Templates::PerEngine(map),
        }),
        pattern: entry.pattern,
        cast,
        base: entry.alias.or(entry.uses),
        symbol,
        kind,
        name,
        description,
    })
}
