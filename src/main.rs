//! Compiles lookup expressions or query documents and prints the SQL and its
//!  parameters as JSON.
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use lookup_sql::{
    CompositeCondition, Engine, ExpressionParser, Node, OperatorRegistry, QueryBuilder,
    QueryConfig, Sanitizer, WhereBuilder, catalog,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QuoteStyle {
    /// Leave identifiers bare
    None,
    /// "identifier" (PostgreSQL, SQLite, Oracle)
    Double,
    /// `identifier` (MySQL)
    Backtick,
    /// [identifier] (SQL Server)
    Bracket,
}

impl QuoteStyle {
    fn sanitizer(self) -> Sanitizer {
        match self {
            Self::None => Sanitizer::new(),
            Self::Double => Sanitizer::with_quoter(|s: &str| format!("\"{s}\"")),
            Self::Backtick => Sanitizer::with_quoter(|s: &str| format!("`{s}`")),
            Self::Bracket => Sanitizer::with_quoter(|s: &str| format!("[{s}]")),
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "lookup_sql")]
#[command(about = "Compile path/filter lookup expressions into parameterized SQL")]
struct Args {
    /// Target engine: pgsql, mysql, sqlite, sqlsrv, oci (or an alias such as postgres)
    #[arg(short, long, default_value = "pgsql")]
    engine: Engine,

    /// Operator catalog (YAML or JSON) to use instead of the built-in one
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Identifier quoting
    #[arg(long, value_enum, default_value = "none")]
    quote: QuoteStyle,

    /// OR the expressions together instead of AND
    #[arg(long)]
    any: bool,

    /// Build a full SELECT from a query document
    #[arg(long, conflicts_with = "expressions")]
    query: Option<PathBuf>,

    /// Expressions such as `authors__books__title?like:SQL`
    #[arg(required_unless_present = "query")]
    expressions: Vec<String>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    match run(&args) {
        Ok(json) => {
            println!("{json}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<String, Box<dyn std::error::Error>> {
    let registry = match &args.catalog {
        Some(path) => catalog::from_path(path)?,
        None => catalog::builtin()?,
    };

    let query = match &args.query {
        Some(path) => select(&registry, args, &QueryConfig::from_path(path)?)?,
        None => {
            let parser = ExpressionParser::new(&registry);
            let conditions = args
                .expressions
                .iter()
                .map(|e| parser.parse(e))
                .collect::<lookup_sql::Result<Vec<_>>>()?;
            let node: Node = if args.any {
                CompositeCondition::or(conditions).into()
            } else {
                CompositeCondition::and(conditions).into()
            };
            WhereBuilder::new(args.engine.clone())
                .with_sanitizer(args.quote.sanitizer())
                .build(&node)?
        }
    };
    Ok(serde_json::to_string_pretty(&query)?)
}

fn select(
    registry: &OperatorRegistry,
    args: &Args,
    config: &QueryConfig,
) -> lookup_sql::Result<lookup_sql::GeneratedQuery> {
    let builder =
        QueryBuilder::new(registry, args.engine.clone()).with_sanitizer(args.quote.sanitizer());
    config.apply(builder)?.build()
}
