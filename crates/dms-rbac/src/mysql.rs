//! MySQL Role Assignment Repository
//!
//! `status` is commonly an ENUM column here; it is cast to CHAR in the query.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::mysql::MySqlRow;
use sqlx::{Row, MySqlPool};
use tracing::{debug, info};

use crate::assignment::{AssignmentStatus, RoleAssignmentRecord};
use crate::error::Result;
use crate::repository::{
    count_assignments_sql, delete_assignments_sql, duplicate_lookups_sql, select_assignments_sql,
    AssignmentFilter, AssignmentTables, DuplicateRoleLookup, RoleAssignmentRepository, SqlDialect,
    DELETE_CHUNK_SIZE,
};

const DIALECT: SqlDialect = SqlDialect::MySql;

/// MySQL implementation of RoleAssignmentRepository
pub struct MySqlRoleAssignmentRepository {
    pool: MySqlPool,
    tables: AssignmentTables,
}

impl MySqlRoleAssignmentRepository {
    /// Create a repository over the given tables; the names are validated.
    pub fn new(pool: MySqlPool, tables: AssignmentTables) -> Result<Self> {
        tables.validate()?;
        Ok(Self { pool, tables })
    }

    /// Create a repository over `dms_user_roles` / `dms_roles`
    pub fn with_default_tables(pool: MySqlPool) -> Self {
        Self {
            pool,
            tables: AssignmentTables::default(),
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }

    fn parse_row(row: &MySqlRow) -> Result<RoleAssignmentRecord> {
        let status: String = row.try_get("status")?;
        let granted_at: Option<NaiveDateTime> = row.try_get("granted_at")?;
        let role_missing: i64 = row.try_get("role_missing")?;

        Ok(RoleAssignmentRecord {
            assignment_id: Some(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            role_id: row.try_get("role_id")?,
            status: AssignmentStatus::parse(&status)?,
            granted_by: row.try_get("granted_by")?,
            granted_at: granted_at.map(|t| t.and_utc()),
            notes: row.try_get("notes")?,
            department: row.try_get("department")?,
            assignment_reason: row.try_get("assignment_reason")?,
            role_display_name: row.try_get("role_display_name")?,
            role_missing: role_missing != 0,
        })
    }
}

#[async_trait]
impl RoleAssignmentRepository for MySqlRoleAssignmentRepository {
    async fn fetch_assignments(&self, filter: &AssignmentFilter) -> Result<Vec<RoleAssignmentRecord>> {
        let sql = select_assignments_sql(DIALECT, &self.tables, filter);

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        let rows = query.fetch_all(&self.pool).await?;

        let records = rows.iter().map(Self::parse_row).collect::<Result<Vec<_>>>()?;
        debug!(table = %self.tables.user_roles, count = records.len(), "Fetched role assignments");
        Ok(records)
    }

    async fn count_assignment_rows(&self, filter: &AssignmentFilter) -> Result<u64> {
        let sql = count_assignments_sql(DIALECT, &self.tables, filter);

        let mut query = sqlx::query(&sql);
        if let Some(user_id) = filter.user_id {
            query = query.bind(user_id);
        }
        let row = query.fetch_one(&self.pool).await?;
        let count: i64 = row.try_get("row_count")?;
        Ok(count.max(0) as u64)
    }

    async fn find_duplicate_role_lookups(&self) -> Result<Vec<DuplicateRoleLookup>> {
        let sql = duplicate_lookups_sql(DIALECT, &self.tables);
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut lookups = Vec::with_capacity(rows.len());
        for row in &rows {
            let row_count: i64 = row.try_get("row_count")?;
            lookups.push(DuplicateRoleLookup {
                role_key: row.try_get("role_key")?,
                row_count: row_count.max(0) as u64,
            });
        }
        Ok(lookups)
    }

    async fn delete_assignments(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for chunk in ids.chunks(DELETE_CHUNK_SIZE) {
            let sql = delete_assignments_sql(DIALECT, &self.tables, chunk.len());
            let mut query = sqlx::query(&sql);
            for id in chunk {
                query = query.bind(*id);
            }
            removed += query.execute(&mut *tx).await?.rows_affected();
        }
        tx.commit().await?;

        info!(table = %self.tables.user_roles, requested = ids.len(), removed, "Deleted role assignment rows");
        Ok(removed)
    }
}
