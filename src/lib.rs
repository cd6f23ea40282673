//! Compiles lookup expressions such as `authors__books__title?like:SQL` into
//!  parameterized SQL conditions.
pub mod cast;
pub mod catalog;
pub mod condition;
pub mod config;
pub mod engine;
pub mod error;
pub mod expression;
pub mod filter;
pub mod join;
pub mod lex;
pub mod operator;
pub mod path;
pub mod query;
pub mod sanitize;
pub mod translate;

#[doc(hidden)]
pub mod fuzz_helper;

#[cfg(test)]
mod tests;

pub use condition::{CompositeCondition, Condition, Connector, Node};
pub use config::QueryConfig;
pub use engine::Engine;
pub use error::{ConfigError, Error, ParseError, Result};
pub use expression::ExpressionParser;
pub use operator::{OperatorRegistry, RegistryBuilder};
pub use path::{Path, Segment};
pub use query::{Conditions, Direction, QueryBuilder};
pub use sanitize::{IdentifierQuoter, Sanitizer};
pub use translate::{GeneratedQuery, ParamNames, Value, WhereBuilder};
