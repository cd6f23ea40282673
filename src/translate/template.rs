//! Placeholder substitution in operator templates.
use indexmap::IndexMap;

use crate::error::{Error, Result};

use super::Value;

pub const COLUMN: &str = "{{column}}";
pub const VALUE: &str = "{{value}}";
pub const VALUE_1: &str = "{{value_1}}";
pub const VALUE_2: &str = "{{value_2}}";
pub const VALUES: &str = "{{values}}";

/// Templates for NULL checks never bind anything.
pub fn is_null_check(template: &str) -> bool {
    template.contains("IS NULL") || template.contains("IS NOT NULL")
}

/// Fills `{{column}}` and whichever value family the template uses. Returns
///  the SQL and the parameters it references, in placeholder order.
pub fn render(
    template: &str,
    column: &str,
    mut parameters: IndexMap<String, Value>,
) -> Result<(String, IndexMap<String, Value>)> {
    let null_check = is_null_check(template);
    let sql = template.replace(COLUMN, column);
    if null_check {
        return Ok((sql, IndexMap::new()));
    }

    let names: Vec<String> = parameters.keys().cloned().collect();
    let missing = |placeholder: &'static str| Error::MissingParameter {
        template: template.to_string(),
        placeholder,
        available: names.len(),
    };
    let placeholder = |name: &String| format!(":{name}");

    let (sql, used) = if sql.contains(VALUE) {
        let first = names.first().ok_or_else(|| missing(VALUE))?;
        (sql.replace(VALUE, &placeholder(first)), &names[..1])
    } else if sql.contains(VALUE_1) || sql.contains(VALUE_2) {
        if names.len() < 2 {
            return Err(missing(if names.is_empty() { VALUE_1 } else { VALUE_2 }));
        }
        let sql = sql
            .replace(VALUE_1, &placeholder(&names[0]))
            .replace(VALUE_2, &placeholder(&names[1]));
        (sql, &names[..2])
    } else if sql.contains(VALUES) {
        if names.is_empty() {
            return Err(missing(VALUES));
        }
        let list = names.iter().map(placeholder).collect::<Vec<_>>().join(", ");
        (sql.replace(VALUES, &list), &names[..])
    } else {
        (sql, &names[..0])
    };

    if used.len() < parameters.len() {
        tracing::trace!(
            template,
            unused = parameters.len() - used.len(),
            "dropping parameters the template doesn't reference"
        );
        parameters.retain(|name, _| used.contains(name));
    }
    Ok((sql, parameters))
}
