use std::sync::OnceLock;

use crate::{
    catalog,
    condition::Node,
    expression::ExpressionParser,
    operator::OperatorRegistry,
    sanitize::Sanitizer,
    translate::WhereBuilder,
};

const ENGINES: [&str; 5] = ["pgsql", "mysql", "sqlite", "sqlsrv", "oci"];

fn registry() -> Option<&'static OperatorRegistry> {
    static REGISTRY: OnceLock<Option<OperatorRegistry>> = OnceLock::new();
    REGISTRY.get_or_init(|| catalog::builtin().ok()).as_ref()
}

/// Parses and compiles `expr` for every engine. Errors are expected, panics
///  are not. Every parameter in the output must be referenced by the SQL.
pub fn compile_expr(expr: &str) {
    let Some(registry) = registry() else {
        return;
    };
    let Ok(condition) = ExpressionParser::new(registry).parse(expr) else {
        return;
    };
    let node = Node::from(condition);
    for engine in ENGINES {
        if let Ok(query) = WhereBuilder::new(engine).build(&node) {
            for name in query.parameters().keys() {
                assert!(
                    query.sql().contains(&format!(":{name}")),
                    "{expr:?} on {engine}: parameter {name} unused in {}",
                    query.sql()
                );
            }
        }
    }
}

/// Sanitizes `input` twice, bare and quoted, and checks the result is stable
///  and free of statement terminators and comments.
pub fn sanitize(input: &str) {
    let sanitizers = [
        Sanitizer::new(),
        Sanitizer::with_quoter(|s: &str| format!("\"{s}\"")),
    ];
    for sanitizer in &sanitizers {
        let once = sanitizer.sanitize(input);
        assert_eq!(sanitizer.sanitize(&once), once, "not idempotent for {input:?}");
        assert!(
            !once.contains(';') && !once.contains("--") && !once.contains("/*"),
            "{input:?} -> {once:?}"
        );
    }
}
