//! Full SELECT statements assembled around WHERE/HAVING condition trees.
use std::fmt;
use std::str::FromStr;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::condition::{CompositeCondition, Connector, Node};
use crate::engine::Engine;
use crate::error::{Error, ParseError, Result};
use crate::expression::ExpressionParser;
use crate::join::{self, Join, JoinType};
use crate::operator::OperatorRegistry;
use crate::sanitize::Sanitizer;
use crate::translate::{GeneratedQuery, ParamNames, WhereBuilder};

/// Input to the condition methods of [QueryBuilder].
#[derive(Debug, Clone)]
pub enum Conditions {
    /// A single `path?filter` expression.
    One(String),
    All(Vec<Conditions>),
    /// An already built tree, added as is.
    Node(Node),
}

impl From<&str> for Conditions {
    fn from(expression: &str) -> Self {
        Self::One(expression.to_string())
    }
}

impl From<String> for Conditions {
    fn from(expression: String) -> Self {
        Self::One(expression)
    }
}

impl From<Node> for Conditions {
    fn from(node: Node) -> Self {
        Self::Node(node)
    }
}

impl<T: Into<Conditions>> From<Vec<T>> for Conditions {
    fn from(items: Vec<T>) -> Self {
        Self::All(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Conditions>, const N: usize> From<[T; N]> for Conditions {
    fn from(items: [T; N]) -> Self {
        Self::All(items.into_iter().map(Into::into).collect())
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.eq_ignore_ascii_case("asc") {
            Ok(Self::Asc)
        } else if trimmed.eq_ignore_ascii_case("desc") {
            Ok(Self::Desc)
        } else {
            Err(ParseError::InvalidDirection(s.to_string()))
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Builds a parameterized SELECT.
///
/// ```ignore
/// let registry = lookup_sql::catalog::builtin()?;
/// let query = QueryBuilder::new(&registry, "pgsql")
///     .where_("authors__books[on:id=author_id]__title?^SQL")?
///     .order_by("title", Direction::Asc)
///     .limit(10)
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct QueryBuilder<'r> {
    parser: ExpressionParser<'r>,
    generator: WhereBuilder,
    table: Option<String>,
    alias: Option<String>,
    columns: Vec<String>,
    distinct: bool,
    joins: Vec<Join>,
    where_root: Option<CompositeCondition>,
    having_root: Option<CompositeCondition>,
    group_by: Vec<String>,
    order_by: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
}

impl<'r> QueryBuilder<'r> {
    pub fn new(registry: &'r OperatorRegistry, engine: impl Into<Engine>) -> Self {
        Self {
            parser: ExpressionParser::new(registry),
            generator: WhereBuilder::new(engine),
            table: None,
            alias: None,
            columns: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            where_root: None,
            having_root: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn with_sanitizer(mut self, sanitizer: Sanitizer) -> Self {
        self.generator = self.generator.with_sanitizer(sanitizer);
        self
    }

    pub fn with_list_delimiter(mut self, delimiter: char) -> Self {
        self.generator = self.generator.with_list_delimiter(delimiter);
        self.parser = self.parser.with_list_delimiter(delimiter);
        self
    }

    fn sanitizer(&self) -> &Sanitizer {
        self.generator.sanitizer()
    }

    pub fn table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    /// Adds to the select list; nothing selected means `*`.
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self, distinct: bool) -> Self {
        self.distinct = distinct;
        self
    }

    pub fn join(
        mut self,
        kind: JoinType,
        table: &str,
        condition: Option<&str>,
        alias: Option<&str>,
    ) -> Self {
        let join = Join::new(kind, table, condition, alias, self.generator.sanitizer());
        self.joins.push(join);
        self
    }

    pub fn inner_join(self, table: &str, condition: &str, alias: Option<&str>) -> Self {
        self.join(JoinType::Inner, table, Some(condition), alias)
    }

    pub fn left_join(self, table: &str, condition: &str, alias: Option<&str>) -> Self {
        self.join(JoinType::Left, table, Some(condition), alias)
    }

    pub fn right_join(self, table: &str, condition: &str, alias: Option<&str>) -> Self {
        self.join(JoinType::Right, table, Some(condition), alias)
    }

    pub fn cross_join(self, table: &str, alias: Option<&str>) -> Self {
        self.join(JoinType::Cross, table, None, alias)
    }

    /// Replaces the WHERE tree with a new AND group.
    pub fn where_(mut self, conditions: impl Into<Conditions>) -> Result<Self> {
        let children = self.flatten(conditions.into())?;
        self.where_root = Some(CompositeCondition::new(Connector::And, children));
        Ok(self)
    }

    /// ANDs onto the WHERE tree. An OR root is wrapped in a new AND root.
    pub fn and_where(mut self, conditions: impl Into<Conditions>) -> Result<Self> {
        let children = self.flatten(conditions.into())?;
        self.where_root = Some(and_onto(self.where_root.take(), children));
        Ok(self)
    }

    /// ORs onto the WHERE tree. An AND root is wrapped in a new OR root, an
    ///  OR root is extended. A list of expressions is one AND branch; a list
    ///  holding lists adds one branch per element.
    pub fn or_where(mut self, conditions: impl Into<Conditions>) -> Result<Self> {
        let conditions = conditions.into();
        let Some(root) = self.where_root.take() else {
            return self.where_(conditions);
        };
        let branches = self.or_branches(conditions)?;
        let root = match root.connector() {
            Connector::Or => branches.into_iter().fold(root, CompositeCondition::with),
            Connector::And => CompositeCondition::new(
                Connector::Or,
                std::iter::once(Node::from(root)).chain(branches).collect(),
            ),
        };
        self.where_root = Some(root);
        Ok(self)
    }

    /// ANDs an OR group onto the WHERE tree: `a AND (b OR (c AND d))`.
    pub fn and_where_or(mut self, conditions: impl Into<Conditions>) -> Result<Self> {
        let branches = match conditions.into() {
            Conditions::All(items) => items
                .into_iter()
                .map(|item| self.branch(item))
                .collect::<Result<Vec<_>>>()?,
            other => vec![self.branch(other)?],
        };
        let group = CompositeCondition::new(Connector::Or, branches);
        self.where_root = Some(and_onto(self.where_root.take(), vec![group.into()]));
        Ok(self)
    }

    pub fn group_by<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.group_by.extend(columns.into_iter().map(Into::into));
        self
    }

    /// Replaces the HAVING tree with a new AND group.
    pub fn having(mut self, conditions: impl Into<Conditions>) -> Result<Self> {
        let children = self.flatten(conditions.into())?;
        self.having_root = Some(CompositeCondition::new(Connector::And, children));
        Ok(self)
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order_by.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Only rendered together with a limit.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn where_root(&self) -> Option<&CompositeCondition> {
        self.where_root.as_ref()
    }

    pub fn having_root(&self) -> Option<&CompositeCondition> {
        self.having_root.as_ref()
    }

    pub fn build(&self) -> Result<GeneratedQuery> {
        let (table, alias) = self.resolve_table()?;
        let sanitizer = self.sanitizer();

        let mut sql = String::from("SELECT ");
        if self.distinct {
            sql.push_str("DISTINCT ");
        }
        if self.columns.is_empty() {
            sql.push('*');
        } else {
            sql.push_str(&self.sanitized_list(&self.columns)?);
        }

        sql.push_str(" FROM ");
        sql.push_str(&sanitizer.sanitize_expression(&table));
        if let Some(alias) = alias.as_deref().map(|a| sanitizer.simple_identifier(a))
            && !alias.is_empty()
        {
            sql.push_str(" AS ");
            sql.push_str(&alias);
        }

        for join in self.collect_joins(&table, alias.as_deref()) {
            sql.push(' ');
            sql.push_str(&join.to_string());
        }

        let mut names = ParamNames::new();
        let mut parameters = IndexMap::new();
        for (keyword, root) in [("WHERE", &self.where_root), ("HAVING", &self.having_root)] {
            // HAVING goes after GROUP BY
            if keyword == "HAVING" && !self.group_by.is_empty() {
                sql.push_str(" GROUP BY ");
                sql.push_str(&self.sanitized_list(&self.group_by)?);
            }
            let Some(root) = root.as_ref().filter(|r| !r.is_empty()) else {
                continue;
            };
            let node = Node::Group(root.clone());
            let (fragment, fragment_parameters) =
                self.generator.build_with(&node, &mut names)?.into_parts();
            sql.push_str(&format!(" {keyword} {fragment}"));
            parameters.extend(fragment_parameters);
        }

        if !self.order_by.is_empty() {
            let order = self
                .order_by
                .iter()
                .map(|(column, direction)| {
                    Ok(format!("{} {direction}", sanitizer.try_sanitize(column)?))
                })
                .collect::<Result<Vec<_>>>()?
                .join(", ");
            sql.push_str(" ORDER BY ");
            sql.push_str(&order);
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
            if let Some(offset) = self.offset {
                sql.push_str(&format!(" OFFSET {offset}"));
            }
        }

        Ok(GeneratedQuery::new(sql, parameters))
    }

    /// The explicit table, or the root of the first multi-segment WHERE path.
    fn resolve_table(&self) -> Result<(String, Option<String>)> {
        if let Some(table) = &self.table {
            return Ok((table.clone(), self.alias.clone()));
        }
        let root = self.where_root.as_ref().ok_or(Error::NoTable)?;
        let inferred = root
            .conditions()
            .into_iter()
            .map(|c| c.path())
            .find(|p| p.len() >= 2)
            .map(|p| {
                let first = p.first();
                (first.name().to_string(), first.alias().map(str::to_string))
            })
            .ok_or(Error::NoTable)?;
        debug!(table = %inferred.0, alias = ?inferred.1, "inferred base table from conditions");
        Ok((inferred.0, self.alias.clone().or(inferred.1)))
    }

    fn collect_joins(&self, table: &str, alias: Option<&str>) -> Vec<Join> {
        let mut seen = IndexSet::new();
        let mut joins = Vec::new();
        let inferred = self
            .where_root
            .iter()
            .flat_map(|root| root.conditions())
            .flat_map(|c| join::infer_joins(table, alias, c.path(), self.sanitizer()));
        for join in self.joins.iter().cloned().chain(inferred) {
            if seen.insert(join.key()) {
                joins.push(join);
            }
        }
        joins
    }

    fn sanitized_list(&self, columns: &[String]) -> Result<String> {
        let mut sanitized = Vec::with_capacity(columns.len());
        for column in columns {
            let column = self.sanitizer().try_sanitize(column)?;
            if !column.is_empty() {
                sanitized.push(column);
            }
        }
        Ok(sanitized.join(", "))
    }

    fn leaf(&self, expression: &str) -> Result<Node> {
        Ok(self.parser.parse(expression)?.into())
    }

    /// Children for an AND group: lists are spread, nested lists become
    ///  AND groups of their own.
    fn flatten(&self, conditions: Conditions) -> Result<Vec<Node>> {
        match conditions {
            Conditions::One(expression) => Ok(vec![self.leaf(&expression)?]),
            Conditions::Node(node) => Ok(vec![node]),
            Conditions::All(items) => items.into_iter().map(|item| self.branch(item)).collect(),
        }
    }

    /// One node: a leaf, a prebuilt node, or an AND group for a list.
    fn branch(&self, conditions: Conditions) -> Result<Node> {
        match conditions {
            Conditions::One(expression) => self.leaf(&expression),
            Conditions::Node(node) => Ok(node),
            Conditions::All(items) => {
                let children = items
                    .into_iter()
                    .map(|item| self.branch(item))
                    .collect::<Result<Vec<_>>>()?;
                Ok(CompositeCondition::new(Connector::And, children).into())
            }
        }
    }

    fn or_branches(&self, conditions: Conditions) -> Result<Vec<Node>> {
        match conditions {
            Conditions::All(items) if items.iter().any(|i| matches!(i, Conditions::All(_))) => {
                items.into_iter().map(|item| self.branch(item)).collect()
            }
            Conditions::All(mut items) if items.len() == 1 => Ok(vec![self.branch(items.remove(0))?]),
            other => Ok(vec![self.branch(other)?]),
        }
    }
}

fn and_onto(root: Option<CompositeCondition>, children: Vec<Node>) -> CompositeCondition {
    match root {
        None => CompositeCondition::new(Connector::And, children),
        Some(root) if root.connector() == Connector::And => {
            children.into_iter().fold(root, CompositeCondition::with)
        }
        Some(root) => CompositeCondition::new(
            Connector::And,
            std::iter::once(Node::from(root)).chain(children).collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog;
    use crate::translate::Value;

    fn text(v: &str) -> Value {
        Value::Text(v.to_string())
    }

    #[test]
    fn directions() {
        assert_eq!("asc".parse::<Direction>(), Ok(Direction::Asc));
        assert_eq!(" DESC ".parse::<Direction>(), Ok(Direction::Desc));
        assert_eq!(
            "sideways".parse::<Direction>(),
            Err(ParseError::InvalidDirection("sideways".into()))
        );
    }

    #[test]
    fn simple_select() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("users")
            .select(["id", "name"])
            .where_("name?=john")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT id, name FROM users WHERE (name = :param_name_1)"
        );
        assert_eq!(q.parameters()["param_name_1"], text("john"));
    }

    #[test]
    fn no_table() {
        let registry = catalog::builtin().unwrap();
        let err = QueryBuilder::new(&registry, "pgsql")
            .where_("name?=john")
            .unwrap()
            .build()
            .unwrap_err();
        assert_eq!(err, Error::NoTable);
        assert_eq!(
            QueryBuilder::new(&registry, "pgsql").build().unwrap_err(),
            Error::NoTable
        );
    }

    #[test]
    fn inferred_table_and_joins() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "mysql")
            .where_([
                "authors__books[on:id=author_id]__title?like:SQL book",
                "authors__books[on:id=author_id]__price?<30",
            ])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM authors INNER JOIN books ON authors.id = books.author_id \
             WHERE (books.title LIKE BINARY :param_title_1 AND books.price < :param_price_2)"
        );
    }

    #[test]
    fn inferred_joins_follow_from_alias() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("orders")
            .alias("o")
            .where_("orders__customers[on:customer_id=id]__name?=x")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM orders AS o INNER JOIN customers ON o.customer_id = customers.id \
             WHERE (customers.name = :param_name_1)"
        );
    }

    #[test]
    fn explicit_joins_come_first_and_deduplicate() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("orders")
            .alias("o")
            .left_join("customers", "o.customer_id = c.id", Some("c"))
            .cross_join("regions", None)
            .where_("orders[alias:o]__customers[alias:c,on:customer_id=id]__country?=NL")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM orders AS o LEFT JOIN customers AS c ON o.customer_id = c.id \
             CROSS JOIN regions WHERE (c.country = :param_country_1)"
        );
    }

    #[test]
    fn and_or_grouping() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "sqlite")
            .table("orders")
            .where_(["status?=paid", "total?>100"])
            .unwrap()
            .or_where("date?period:2403")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM orders WHERE ((status = :param_status_1 AND total > :param_total_2) \
             OR strftime('%Y%m', date) = :param_date_3)"
        );
        assert_eq!(q.parameters()["param_date_3"], text("202403"));

        // a further and_where wraps the OR root
        let builder = QueryBuilder::new(&registry, "pgsql")
            .table("t")
            .where_("a?=1")
            .unwrap()
            .or_where("b?=2")
            .unwrap()
            .and_where("c?=3")
            .unwrap();
        let root = builder.where_root().unwrap();
        assert_eq!(root.connector(), Connector::And);
        assert_eq!(
            builder.build().unwrap().sql(),
            "SELECT * FROM t WHERE (((a = :param_a_1) OR b = :param_b_2) AND c = :param_c_3)"
        );
    }

    #[test]
    fn chained_or_where_extends() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("t")
            .where_("a?=1")
            .unwrap()
            .or_where("b?=2")
            .unwrap()
            .or_where(["c?=3", "d?=4"])
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM t WHERE ((a = :param_a_1) OR b = :param_b_2 \
             OR (c = :param_c_3 AND d = :param_d_4))"
        );
    }

    #[test]
    fn or_where_with_nested_lists() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("t")
            .where_("a?=1")
            .unwrap()
            .or_where(Conditions::All(vec![
                vec!["b?=2", "c?=3"].into(),
                "d?=4".into(),
            ]))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM t WHERE ((a = :param_a_1) OR (b = :param_b_2 AND c = :param_c_3) \
             OR d = :param_d_4)"
        );
    }

    #[test]
    fn and_where_or() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("t")
            .where_("a?=1")
            .unwrap()
            .and_where_or(Conditions::All(vec![
                "b?=2".into(),
                vec!["c?=3", "d?=4"].into(),
            ]))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT * FROM t WHERE (a = :param_a_1 AND (b = :param_b_2 \
             OR (c = :param_c_3 AND d = :param_d_4)))"
        );
    }

    #[test]
    fn full_layout() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("products")
            .distinct(true)
            .select(["category", "AVG(price) AS avg_price"])
            .where_("active?=1")
            .unwrap()
            .group_by(["category"])
            .having("AVG(price)?>10")
            .unwrap()
            .order_by("avg_price", Direction::Desc)
            .limit(5)
            .offset(10)
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT DISTINCT category, AVG(price) AS avg_price FROM products \
             WHERE (active = :param_active_1) GROUP BY category \
             HAVING (AVG(price) > :param_AVGprice_2) ORDER BY avg_price DESC LIMIT 5 OFFSET 10"
        );
        assert_eq!(q.parameters().len(), 2);
    }

    #[test]
    fn offset_needs_limit() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "pgsql")
            .table("t")
            .offset(10)
            .build()
            .unwrap();
        assert_eq!(q.sql(), "SELECT * FROM t");
    }

    #[test]
    fn quoted_query() {
        let registry = catalog::builtin().unwrap();
        let q = QueryBuilder::new(&registry, "mysql")
            .with_sanitizer(Sanitizer::with_quoter(|s: &str| format!("`{s}`")))
            .table("users; DROP TABLE users")
            .select(["COUNT(*) AS n"])
            .where_("name?=x")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(
            q.sql(),
            "SELECT COUNT(*) AS `n` FROM `usersDROPTABLEusers` WHERE (`name` = :param_name_1)"
        );
    }

    #[test]
    fn parse_errors_surface() {
        let registry = catalog::builtin().unwrap();
        assert!(matches!(
            QueryBuilder::new(&registry, "pgsql").where_("name"),
            Err(Error::Parse(ParseError::MissingFilter(_)))
        ));
    }
}
