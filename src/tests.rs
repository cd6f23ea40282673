use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use proptest::prelude::*;
use regex::Regex;
use test_case::test_case;

use crate::{
    CompositeCondition, ExpressionParser, GeneratedQuery, Node, OperatorRegistry, Result, Value,
    WhereBuilder, catalog,
};

fn registry() -> OperatorRegistry {
    catalog::builtin().unwrap()
}

fn compile(engine: &str, expression: &str) -> Result<GeneratedQuery> {
    let registry = registry();
    let node: Node = ExpressionParser::new(&registry).parse(expression)?.into();
    WhereBuilder::new(engine).build(&node)
}

fn values(query: &GeneratedQuery) -> Vec<&str> {
    query
        .parameters()
        .values()
        .map(|v| match v {
            Value::Text(t) => t.as_str(),
            Value::Null => "NULL",
        })
        .collect()
}

#[test_case("pgsql", "name?=john", "name = :param_name_1", &["john"] ; "equality")]
#[test_case("pgsql", "authors__books__title?like:SQL book", "books.title LIKE :param_title_1", &["SQL book"] ; "related column")]
#[test_case("mysql", "authors__books__title?like:SQL book", "books.title LIKE BINARY :param_title_1", &["SQL book"] ; "related column mysql")]
#[test_case(
    "sqlite",
    "status?in:active,pending,review",
    "status IN (:param_status_1_1, :param_status_1_2, :param_status_1_3)",
    &["active", "pending", "review"] ;
    "list membership"
)]
#[test_case("pgsql", "deleted_at?is:null", "deleted_at IS NULL", &[] ; "null check")]
#[test_case("mysql", "created_at?year:24", "YEAR(created_at) = :param_created_at_1", &["2024"] ; "two digit year")]
#[test_case("pgsql", "created_at?year:24", "TO_CHAR(created_at, 'YYYY') = :param_created_at_1", &["2024"] ; "two digit year pgsql")]
#[test_case("sqlsrv", "created_at?date:240315", "CAST(created_at AS DATE) = :param_created_at_1", &["2024-03-15"] ; "short date")]
#[test_case("oci", "name?^*jo", "LOWER(name) LIKE LOWER(:param_name_1)", &["jo%"] ; "case insensitive prefix")]
#[test_case("pgsql", "name?!~~*x", "name NOT ILIKE :param_name_1", &["%x%"] ; "negated contains")]
#[test_case("oci", "flags?b<<2", "(flags * POWER(2, :param_flags_1)) > 0", &["2"] ; "shift on oracle")]
#[test_case("pgsql", "price?notbetween:1,9", "price NOT BETWEEN :param_price_1_1 AND :param_price_1_2", &["1", "9"] ; "not between")]
#[test_case("pgsql", "products__AVG(price)?>=10", "AVG(products.price) >= :param_AVGprice_1", &["10"] ; "aggregate column")]
#[test_case("firebird", "name?~~*x", "LOWER(name) LIKE LOWER(:param_name_1)", &["%x%"] ; "unknown engine uses default")]
fn scenarios(engine: &str, expression: &str, sql: &str, expected: &[&str]) {
    let query = compile(engine, expression).unwrap();
    assert_eq!(query.sql(), sql);
    assert_eq!(values(&query), expected);
}

#[test]
fn composite_on_sqlite() {
    let registry = registry();
    let parser = ExpressionParser::new(&registry);
    let node: Node = CompositeCondition::or([
        Node::from(CompositeCondition::and([
            parser.parse("status?=active").unwrap(),
            parser.parse("total?>100").unwrap(),
        ])),
        parser.parse("date?period:202403").unwrap().into(),
    ])
    .into();
    let query = WhereBuilder::new("sqlite").build(&node).unwrap();
    assert_eq!(
        query.sql(),
        "((status = :param_status_1 AND total > :param_total_2) OR strftime('%Y%m', date) = :param_date_3)"
    );
    assert_eq!(values(&query), ["active", "100", "202403"]);
}

#[test]
fn builds_are_independent() {
    let registry = registry();
    let node: Node = ExpressionParser::new(&registry).parse("a?=1").unwrap().into();
    let builder = WhereBuilder::new("pgsql");
    assert_eq!(builder.build(&node).unwrap(), builder.build(&node).unwrap());
}

#[test]
fn shared_builder_across_threads() {
    let registry = std::sync::Arc::new(registry());
    let handles: Vec<_> = ["pgsql", "mysql", "sqlite", "sqlsrv"]
        .into_iter()
        .map(|engine| {
            let registry = registry.clone();
            std::thread::spawn(move || {
                let node: Node = ExpressionParser::new(&registry)
                    .parse("name?=x")
                    .unwrap()
                    .into();
                WhereBuilder::new(engine).build(&node).unwrap()
            })
        })
        .collect();
    for handle in handles {
        assert_eq!(handle.join().unwrap().sql(), "name = :param_name_1");
    }
}

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| Regex::new(r":(param_[A-Za-z0-9_]+)").unwrap());

fn leaf() -> impl Strategy<Value = String> {
    (
        "[a-z][a-z]{0,6}(_[a-z0-9]{1,2})?",
        prop::sample::select(vec![
            "=", "!=", ">", "<=", "^", "~~*", "!$", "in:", "notin:", "between:", "like:",
        ]),
        "[a-z0-9]{1,6}",
        "[a-z0-9]{1,6}",
    )
        .prop_map(|(column, symbol, first, second)| format!("{column}?{symbol}{first},{second}"))
}

fn symbols() -> Vec<String> {
    registry().symbols_by_length_desc().to_vec()
}

proptest! {
    #[test]
    fn longest_symbol_wins(
        symbol in prop::sample::select(symbols()),
        rest in "[a-z0-9 ,]{0,8}",
    ) {
        let registry = registry();
        let input = format!("{symbol}{rest}");
        let expected = registry
            .iter()
            .map(|op| op.symbol())
            .filter(|s| input.starts_with(s))
            .max_by_key(|s| s.len());
        let matched = registry.longest_prefix(&input).map(|op| op.symbol());
        prop_assert_eq!(matched, expected);
        prop_assert!(matched.is_some_and(|m| m.len() >= symbol.len()));
    }

    #[test]
    fn parameters_match_placeholders(
        leaves in prop::collection::vec(leaf(), 1..6),
        split in 0usize..6,
        engine in prop::sample::select(vec!["pgsql", "mysql", "sqlite", "sqlsrv", "oci"]),
    ) {
        let registry = registry();
        let parser = ExpressionParser::new(&registry);
        let conditions = leaves
            .iter()
            .map(|e| parser.parse(e))
            .collect::<Result<Vec<_>>>()
            .unwrap();
        let split = split.min(conditions.len());
        let mut and: Vec<Node> = conditions[..split].iter().cloned().map(Node::from).collect();
        and.push(CompositeCondition::or(conditions[split..].to_vec()).into());
        let node: Node = CompositeCondition::and(and).into();

        let builder = WhereBuilder::new(engine);
        let query = builder.build(&node).unwrap();
        // a name issued twice would overwrite a value and shrink the map
        let bound: usize = conditions
            .iter()
            .map(|c| builder.build(&c.clone().into()).unwrap().parameters().len())
            .sum();
        prop_assert_eq!(query.parameters().len(), bound);

        let placeholders: BTreeSet<&str> = PLACEHOLDER
            .captures_iter(query.sql())
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        let names: BTreeSet<&str> = query.parameters().keys().map(String::as_str).collect();
        prop_assert_eq!(placeholders, names, "{}", query.sql());
    }
}
