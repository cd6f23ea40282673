//! Value normalization and casting applied to literal filter values before
//!  they are bound as parameters.
use chrono::NaiveDate;
use thiserror::Error;

use crate::operator::CastRule;

pub const DEFAULT_LIST_DELIMITER: char = ',';

/// Raw literal carried by a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Literal {
    Text(String),
    Bool(bool),
    List(Vec<String>),
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<Vec<String>> for Literal {
    fn from(items: Vec<String>) -> Self {
        Self::List(items)
    }
}

/// Result of casting: most rules keep a single value, `list` splits it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cast {
    Scalar(String),
    List(Vec<String>),
}

impl Cast {
    pub fn into_values(self) -> Vec<String> {
        match self {
            Self::Scalar(v) => vec![v],
            Self::List(v) => v,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot apply `{rule}` to {value:?}")]
pub struct InvalidCast {
    pub rule: CastRule,
    pub value: String,
}

/// Flattens a literal to text: booleans become `1`/`0`, lists are joined on
///  `delimiter` with the delimiter escaped inside elements.
pub fn normalize(literal: &Literal, delimiter: char) -> String {
    match literal {
        Literal::Text(text) => text.clone(),
        Literal::Bool(true) => "1".to_string(),
        Literal::Bool(false) => "0".to_string(),
        Literal::List(items) => {
            let escaped = format!("\\{delimiter}");
            items
                .iter()
                .map(|item| item.replace(delimiter, &escaped))
                .collect::<Vec<_>>()
                .join(&delimiter.to_string())
        }
    }
}

/// Applies `rules` in order. Rules after `list` apply to every element.
pub fn apply(value: String, rules: &[CastRule], delimiter: char) -> Result<Cast, InvalidCast> {
    let mut cast = Cast::Scalar(value);
    for &rule in rules {
        cast = match (rule, cast) {
            (CastRule::List, Cast::Scalar(v)) => Cast::List(split_list(&v, delimiter)),
            (CastRule::List, list) => list,
            (rule, Cast::Scalar(v)) => Cast::Scalar(apply_one(rule, v)?),
            (rule, Cast::List(items)) => Cast::List(
                items
                    .into_iter()
                    .map(|v| apply_one(rule, v))
                    .collect::<Result<_, _>>()?,
            ),
        };
    }
    Ok(cast)
}

fn apply_one(rule: CastRule, value: String) -> Result<String, InvalidCast> {
    let invalid = |value: &str| InvalidCast {
        rule,
        value: value.to_string(),
    };
    Ok(match rule {
        CastRule::LikeStart => format!("{value}%"),
        CastRule::Like => format!("%{value}%"),
        CastRule::LikeEnd => format!("%{value}"),
        CastRule::List => value,
        CastRule::Date => {
            let full = match value.len() {
                8 => value.clone(),
                6 => format!("20{value}"),
                _ => return Err(invalid(&value)),
            };
            NaiveDate::parse_from_str(&full, "%Y%m%d")
                .map_err(|_| invalid(&value))?
                .format("%Y-%m-%d")
                .to_string()
        }
        CastRule::Month => format!("{value:0>2}"),
        CastRule::Year => {
            if value.len() == 2 {
                format!("20{value}")
            } else {
                value
            }
        }
        CastRule::Period => {
            let full = match value.len() {
                6 => value.clone(),
                4 => format!("20{value}"),
                _ => return Err(invalid(&value)),
            };
            if !full.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid(&value));
            }
            let year = full[..4].parse::<i32>().map_err(|_| invalid(&value))?;
            let month = full[4..].parse::<u32>().map_err(|_| invalid(&value))?;
            NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| invalid(&value))?;
            full
        }
    })
}

/// Splits on delimiters not preceded by a backslash, then unescapes them.
pub fn split_list(value: &str, delimiter: char) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' && chars.peek() == Some(&delimiter) {
            current.push(delimiter);
            chars.next();
        } else if c == delimiter {
            items.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    items.push(current);
    items
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(value: &str, rules: &[CastRule]) -> Result<Cast, InvalidCast> {
        apply(value.to_string(), rules, DEFAULT_LIST_DELIMITER)
    }

    fn scalar(v: &str) -> Cast {
        Cast::Scalar(v.to_string())
    }

    #[test]
    fn normalization() {
        assert_eq!(normalize(&Literal::Bool(true), ','), "1");
        assert_eq!(normalize(&Literal::Bool(false), ','), "0");
        assert_eq!(
            normalize(&Literal::List(vec!["a".into(), "b,c".into()]), ','),
            "a,b\\,c"
        );
    }

    #[test]
    fn like_rules() {
        assert_eq!(cast("abc", &[CastRule::LikeStart]), Ok(scalar("abc%")));
        assert_eq!(cast("abc", &[CastRule::Like]), Ok(scalar("%abc%")));
        assert_eq!(cast("abc", &[CastRule::LikeEnd]), Ok(scalar("%abc")));
    }

    #[test]
    fn lists_keep_escaped_delimiters() {
        assert_eq!(
            cast("a,b\\,c,d", &[CastRule::List]),
            Ok(Cast::List(vec!["a".into(), "b,c".into(), "d".into()]))
        );
        let list = normalize(&Literal::List(vec!["x,y".into(), "z".into()]), ',');
        assert_eq!(split_list(&list, ','), ["x,y", "z"]);
    }

    #[test]
    fn dates() {
        assert_eq!(cast("20240315", &[CastRule::Date]), Ok(scalar("2024-03-15")));
        assert_eq!(cast("240315", &[CastRule::Date]), Ok(scalar("2024-03-15")));
        assert_eq!(
            cast("20240231", &[CastRule::Date]),
            Err(InvalidCast {
                rule: CastRule::Date,
                value: "20240231".into()
            })
        );
        assert!(cast("2024", &[CastRule::Date]).is_err());
    }

    #[test]
    fn months_years_periods() {
        assert_eq!(cast("3", &[CastRule::Month]), Ok(scalar("03")));
        assert_eq!(cast("11", &[CastRule::Month]), Ok(scalar("11")));
        assert_eq!(cast("24", &[CastRule::Year]), Ok(scalar("2024")));
        assert_eq!(cast("1999", &[CastRule::Year]), Ok(scalar("1999")));
        assert_eq!(cast("2403", &[CastRule::Period]), Ok(scalar("202403")));
        assert_eq!(cast("202403", &[CastRule::Period]), Ok(scalar("202403")));
        assert!(cast("202413", &[CastRule::Period]).is_err());
    }

    #[test]
    fn rules_after_list_apply_per_element() {
        assert_eq!(
            cast("240101,240131", &[CastRule::List, CastRule::Date]),
            Ok(Cast::List(vec!["2024-01-01".into(), "2024-01-31".into()]))
        );
    }
}
