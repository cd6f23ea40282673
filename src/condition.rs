//! The condition tree: leaves pair a path with a filter, groups combine
//!  children with AND or OR.
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;
use crate::filter::Filter;
use crate::path::Path;

#[derive(Debug, Clone)]
pub struct Condition {
    path: Path,
    filter: Filter,
    literal: bool,
}

impl Condition {
    pub fn new(path: Path, filter: Filter, literal: bool) -> Self {
        Self {
            path,
            filter,
            literal,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filter(&self) -> &Filter {
        &self.filter
    }

    /// False when the filter value is a column or expression instead of a
    ///  constant to bind.
    pub fn is_literal(&self) -> bool {
        self.literal
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Connector {
    And,
    Or,
}

impl Connector {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::And => "AND",
            Self::Or => "OR",
        }
    }
}

impl FromStr for Connector {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.eq_ignore_ascii_case("and") {
            Ok(Self::And)
        } else if s.eq_ignore_ascii_case("or") {
            Ok(Self::Or)
        } else {
            Err(ParseError::InvalidConnector(s.to_string()))
        }
    }
}

impl fmt::Display for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

#[derive(Debug, Clone)]
pub struct CompositeCondition {
    connector: Connector,
    children: Vec<Node>,
}

impl CompositeCondition {
    pub fn new(connector: Connector, children: Vec<Node>) -> Self {
        Self {
            connector,
            children,
        }
    }

    pub fn and(children: impl IntoIterator<Item = impl Into<Node>>) -> Self {
        Self::new(Connector::And, children.into_iter().map(Into::into).collect())
    }

    pub fn or(children: impl IntoIterator<Item = impl Into<Node>>) -> Self {
        Self::new(Connector::Or, children.into_iter().map(Into::into).collect())
    }

    /// Returns the group with `child` appended.
    pub fn with(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn connector(&self) -> Connector {
        self.connector
    }

    pub fn children(&self) -> &[Node] {
        &self.children
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Leaf conditions of every child, depth first.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.children.iter().for_each(|c| c.collect(&mut out));
        out
    }
}

#[derive(Debug, Clone)]
pub enum Node {
    Leaf(Condition),
    Group(CompositeCondition),
}

impl Node {
    /// Leaf conditions in depth-first order.
    pub fn conditions(&self) -> Vec<&Condition> {
        let mut out = Vec::new();
        self.collect(&mut out);
        out
    }

    fn collect<'a>(&'a self, out: &mut Vec<&'a Condition>) {
        match self {
            Self::Leaf(condition) => out.push(condition),
            Self::Group(group) => group.children.iter().for_each(|c| c.collect(out)),
        }
    }
}

impl From<Condition> for Node {
    fn from(condition: Condition) -> Self {
        Self::Leaf(condition)
    }
}

impl From<CompositeCondition> for Node {
    fn from(group: CompositeCondition) -> Self {
        Self::Group(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::expression::ExpressionParser;

    #[test]
    fn connectors() {
        assert_eq!("and".parse::<Connector>(), Ok(Connector::And));
        assert_eq!("OR".parse::<Connector>(), Ok(Connector::Or));
        assert_eq!(
            "xor".parse::<Connector>(),
            Err(ParseError::InvalidConnector("xor".into()))
        );
    }

    #[test]
    fn leaves_in_order() {
        let registry = catalog::builtin().unwrap();
        let parser = ExpressionParser::new(&registry);
        let a = parser.parse("a?=1").unwrap();
        let b = parser.parse("b?=2").unwrap();
        let c = parser.parse("c?=3").unwrap();

        let tree: Node = CompositeCondition::and([Node::from(a), CompositeCondition::or([b, c]).into()])
            .into();
        let names: Vec<_> = tree
            .conditions()
            .iter()
            .map(|c| c.path().last().name().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }
}
