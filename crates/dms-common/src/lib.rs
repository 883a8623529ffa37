use serde::{Deserialize, Serialize};

pub mod logging;

// ============================================================================
// Database Backends
// ============================================================================

/// Relational backend holding the RBAC tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseKind {
    Sqlite,
    Postgres,
    Mysql,
}

impl DatabaseKind {
    /// Parse a backend name. Accepts the common aliases used in connection
    /// strings (`postgresql`, `pg`, `mariadb`).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(DatabaseKind::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(DatabaseKind::Postgres),
            "mysql" | "mariadb" => Some(DatabaseKind::Mysql),
            _ => None,
        }
    }

    /// Infer the backend from a connection URL scheme.
    pub fn from_url(url: &str) -> Option<Self> {
        let scheme = url.split(':').next()?;
        Self::parse(scheme)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatabaseKind::Sqlite => "sqlite",
            DatabaseKind::Postgres => "postgres",
            DatabaseKind::Mysql => "mysql",
        }
    }
}

impl Default for DatabaseKind {
    fn default() -> Self {
        DatabaseKind::Mysql
    }
}

impl std::fmt::Display for DatabaseKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

// ============================================================================
// Report Output
// ============================================================================

/// How reports are written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables
    Text,
    /// Pretty-printed JSON document
    Json,
}

impl OutputFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "text" | "plain" => Some(OutputFormat::Text),
            "json" => Some(OutputFormat::Json),
            _ => None,
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Text
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

// ============================================================================
// SQL Identifiers
// ============================================================================

/// True for a bare table or column name (`[A-Za-z_][A-Za-z0-9_]*`).
///
/// Configured names are interpolated into SQL text, so anything else is
/// rejected before a query is built.
pub fn is_sql_identifier(value: &str) -> bool {
    !value.is_empty()
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !value.starts_with(|c: char| c.is_ascii_digit())
}
