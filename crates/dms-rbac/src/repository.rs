//! Role Assignment Repository Trait
//!
//! Data-access interface for the assignment and role lookup tables, plus the
//! SQL shared by the SQLite, PostgreSQL and MySQL implementations.

use async_trait::async_trait;
use dms_common::is_sql_identifier;
use serde::Serialize;

use crate::assignment::RoleAssignmentRecord;
use crate::error::{RbacError, Result};

/// Rows per DELETE statement when removing assignments
pub(crate) const DELETE_CHUNK_SIZE: usize = 500;

/// Table and column names used to build queries.
///
/// These are interpolated into SQL text, so [`AssignmentTables::validate`]
/// must pass before a repository is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentTables {
    pub user_roles: String,
    pub roles: String,
    pub role_key_column: String,
    pub role_display_column: String,
}

impl Default for AssignmentTables {
    fn default() -> Self {
        Self {
            user_roles: "dms_user_roles".to_string(),
            roles: "dms_roles".to_string(),
            role_key_column: "id".to_string(),
            role_display_column: "display_name".to_string(),
        }
    }
}

impl AssignmentTables {
    pub fn validate(&self) -> Result<()> {
        for name in [
            &self.user_roles,
            &self.roles,
            &self.role_key_column,
            &self.role_display_column,
        ] {
            if !is_sql_identifier(name) {
                return Err(RbacError::configuration(format!(
                    "{:?} is not a plain SQL identifier",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Which assignments a query covers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentFilter {
    /// Restrict to one user
    pub user_id: Option<i64>,
    /// Include rows whose status is not `active`
    pub include_inactive: bool,
}

impl Default for AssignmentFilter {
    fn default() -> Self {
        Self {
            user_id: None,
            include_inactive: true,
        }
    }
}

impl AssignmentFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: i64) -> Self {
        Self {
            user_id: Some(user_id),
            include_inactive: true,
        }
    }

    pub fn active_only(mut self) -> Self {
        self.include_inactive = false;
        self
    }

    /// Same scope with inactive rows included
    pub fn with_inactive(mut self) -> Self {
        self.include_inactive = true;
        self
    }
}

/// A role key value that occurs more than once in the role table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRoleLookup {
    pub role_key: i64,
    pub row_count: u64,
}

/// Read and repair access to the RBAC assignment tables
#[async_trait]
pub trait RoleAssignmentRepository: Send + Sync {
    /// Assignments left-joined against the role lookup, ordered by user,
    /// active status first, then newest grant first. Assignments whose role
    /// is missing are returned with `role_missing` set.
    async fn fetch_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<RoleAssignmentRecord>>;

    /// Raw assignment row count for the filter, without the join
    async fn count_assignment_rows(&self, filter: &AssignmentFilter) -> Result<u64>;

    /// Role key values present more than once in the role table
    async fn find_duplicate_role_lookups(&self) -> Result<Vec<DuplicateRoleLookup>>;

    /// Delete assignment rows by primary key in one transaction.
    /// Returns the number of rows removed.
    async fn delete_assignments(&self, ids: &[i64]) -> Result<u64>;
}

// ============================================================================
// SQL shared by the backends
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SqlDialect {
    Sqlite,
    Postgres,
    MySql,
}

impl SqlDialect {
    /// Bind placeholder for the 1-based parameter `index`
    fn placeholder(self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", index),
            SqlDialect::Sqlite | SqlDialect::MySql => "?".to_string(),
        }
    }

    fn cast_int(self, expr: &str) -> String {
        match self {
            SqlDialect::Sqlite => expr.to_string(),
            SqlDialect::Postgres => format!("CAST({} AS BIGINT)", expr),
            SqlDialect::MySql => format!("CAST({} AS SIGNED)", expr),
        }
    }

    fn cast_text(self, expr: &str) -> String {
        match self {
            SqlDialect::Sqlite => expr.to_string(),
            SqlDialect::Postgres => format!("CAST({} AS TEXT)", expr),
            SqlDialect::MySql => format!("CAST({} AS CHAR)", expr),
        }
    }

    fn cast_timestamp(self, expr: &str) -> String {
        match self {
            SqlDialect::Postgres => format!("CAST({} AS TIMESTAMP)", expr),
            SqlDialect::Sqlite | SqlDialect::MySql => expr.to_string(),
        }
    }
}

/// Status test matching `AssignmentStatus::parse`: trimmed, any case
fn active_condition(dialect: SqlDialect) -> String {
    format!("LOWER(TRIM({})) = 'active'", dialect.cast_text("ur.status"))
}

/// WHERE clause for a filter; the user id, if any, is the first bind.
fn where_clause(dialect: SqlDialect, filter: &AssignmentFilter) -> String {
    let mut conditions = Vec::new();
    if filter.user_id.is_some() {
        conditions.push(format!("ur.user_id = {}", dialect.placeholder(1)));
    }
    if !filter.include_inactive {
        conditions.push(active_condition(dialect));
    }

    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

pub(crate) fn select_assignments_sql(
    dialect: SqlDialect,
    tables: &AssignmentTables,
    filter: &AssignmentFilter,
) -> String {
    format!(
        "SELECT {id} AS id, {user_id} AS user_id, {role_id} AS role_id, {status} AS status, \
         {granted_by} AS granted_by, {granted_at} AS granted_at, \
         ur.notes AS notes, ur.department AS department, ur.assignment_reason AS assignment_reason, \
         {display} AS role_display_name, {missing} AS role_missing \
         FROM {user_roles} ur \
         LEFT JOIN {roles} r ON r.{key} = ur.role_id{filter} \
         ORDER BY ur.user_id, \
         CASE WHEN {active} THEN 0 ELSE 1 END, \
         CASE WHEN ur.granted_at IS NULL THEN 1 ELSE 0 END, \
         ur.granted_at DESC, ur.id",
        id = dialect.cast_int("ur.id"),
        user_id = dialect.cast_int("ur.user_id"),
        role_id = dialect.cast_int("ur.role_id"),
        status = dialect.cast_text("ur.status"),
        granted_by = dialect.cast_int("ur.granted_by"),
        granted_at = dialect.cast_timestamp("ur.granted_at"),
        display = dialect.cast_text(&format!("r.{}", tables.role_display_column)),
        missing = dialect.cast_int(&format!("CASE WHEN r.{} IS NULL THEN 1 ELSE 0 END", tables.role_key_column)),
        active = active_condition(dialect),
        user_roles = tables.user_roles,
        roles = tables.roles,
        key = tables.role_key_column,
        filter = where_clause(dialect, filter),
    )
}

pub(crate) fn count_assignments_sql(
    dialect: SqlDialect,
    tables: &AssignmentTables,
    filter: &AssignmentFilter,
) -> String {
    format!(
        "SELECT COUNT(*) AS row_count FROM {} ur{}",
        tables.user_roles,
        where_clause(dialect, filter),
    )
}

pub(crate) fn duplicate_lookups_sql(dialect: SqlDialect, tables: &AssignmentTables) -> String {
    format!(
        "SELECT {key_cast} AS role_key, COUNT(*) AS row_count FROM {roles} r \
         GROUP BY r.{key} HAVING COUNT(*) > 1 ORDER BY r.{key}",
        key_cast = dialect.cast_int(&format!("r.{}", tables.role_key_column)),
        roles = tables.roles,
        key = tables.role_key_column,
    )
}

pub(crate) fn delete_assignments_sql(dialect: SqlDialect, tables: &AssignmentTables, count: usize) -> String {
    let placeholders: Vec<String> = (1..=count).map(|i| dialect.placeholder(i)).collect();
    format!(
        "DELETE FROM {} WHERE id IN ({})",
        tables.user_roles,
        placeholders.join(", ")
    )
}
