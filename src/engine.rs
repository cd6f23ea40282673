use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;

/// Database engine a fragment is generated for. Only used to pick template
///  variants; engines the catalog doesn't know fall back to `default`
///  templates.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Engine {
    Pgsql,
    Mysql,
    Sqlite,
    Sqlsrv,
    Oci,
    Other(String),
}

impl Engine {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Pgsql => "pgsql",
            Self::Mysql => "mysql",
            Self::Sqlite => "sqlite",
            Self::Sqlsrv => "sqlsrv",
            Self::Oci => "oci",
            Self::Other(name) => name,
        }
    }
}

impl FromStr for Engine {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_ascii_lowercase();
        Ok(match lower.as_str() {
            "pgsql" | "postgres" | "postgresql" => Self::Pgsql,
            "mysql" | "mariadb" => Self::Mysql,
            "sqlite" | "sqlite3" => Self::Sqlite,
            "sqlsrv" | "mssql" => Self::Sqlsrv,
            "oci" | "oracle" => Self::Oci,
            _ => Self::Other(lower),
        })
    }
}

impl From<&str> for Engine {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(engine) => engine,
            Err(never) => match never {},
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
