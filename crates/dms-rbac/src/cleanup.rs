//! Duplicate Assignment Cleanup
//!
//! Removes assignment rows that repeat an existing grant in the table itself.
//! Rows that only look duplicated because the lookup join repeated them share
//! an assignment id and are left alone; those are fixed in the role table.

use std::collections::{BTreeMap, HashMap};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{info, warn};

use crate::assignment::{AssignmentKey, RoleAssignmentRecord};
use crate::error::Result;
use crate::repository::{AssignmentFilter, RoleAssignmentRepository};

/// Rows sharing one assignment key
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRowGroup {
    pub key: AssignmentKey,
    /// Lowest id, kept
    pub keep: i64,
    /// Remaining ids, ascending
    pub remove: Vec<i64>,
}

/// What a cleanup would delete
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupPlan {
    pub groups: Vec<DuplicateRowGroup>,
}

impl CleanupPlan {
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// All ids to delete, ascending
    pub fn remove_ids(&self) -> Vec<i64> {
        let mut ids: Vec<i64> = self.groups.iter().flat_map(|g| g.remove.iter().copied()).collect();
        ids.sort_unstable();
        ids
    }
}

/// Work out which rows to delete. Records without an assignment id are
/// skipped since they cannot be addressed.
pub fn plan_duplicate_cleanup(records: &[RoleAssignmentRecord]) -> CleanupPlan {
    // Join repeats share an id; collapse them first.
    let mut rows: BTreeMap<i64, AssignmentKey> = BTreeMap::new();
    for record in records {
        if let Some(id) = record.assignment_id {
            rows.entry(id).or_insert_with(|| record.key());
        }
    }

    // BTreeMap iterates ids ascending, so each id list comes out sorted.
    let mut by_key: IndexMap<AssignmentKey, Vec<i64>> = IndexMap::new();
    for (id, key) in rows {
        by_key.entry(key).or_default().push(id);
    }

    let groups = by_key
        .into_iter()
        .filter(|(_, ids)| ids.len() > 1)
        .map(|(key, ids)| DuplicateRowGroup {
            key,
            keep: ids[0],
            remove: ids[1..].to_vec(),
        })
        .collect();

    CleanupPlan { groups }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupMode {
    /// Plan only
    DryRun,
    /// Plan and delete
    Apply,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupOutcome {
    pub plan: CleanupPlan,
    pub applied: bool,
    pub deleted_rows: u64,
}

/// Finds and optionally deletes duplicate assignment rows
pub struct DuplicateCleanup;

impl DuplicateCleanup {
    /// Inactive rows are always scanned; a duplicate inactive grant is still
    /// a duplicate.
    pub async fn run(
        repo: &dyn RoleAssignmentRepository,
        filter: &AssignmentFilter,
        mode: CleanupMode,
    ) -> Result<CleanupOutcome> {
        let records = repo.fetch_assignments(&filter.with_inactive()).await?;
        let plan = plan_duplicate_cleanup(&records);

        let mut by_user: HashMap<i64, usize> = HashMap::new();
        for group in &plan.groups {
            *by_user.entry(group.key.user_id).or_insert(0) += group.remove.len();
        }
        for (user_id, rows) in &by_user {
            warn!(user_id, rows, "Duplicate role assignment rows found");
        }

        if plan.is_empty() {
            info!("No duplicate role assignment rows");
            return Ok(CleanupOutcome { plan, applied: false, deleted_rows: 0 });
        }

        match mode {
            CleanupMode::DryRun => {
                info!(rows = plan.remove_ids().len(), "Dry run, nothing deleted");
                Ok(CleanupOutcome { plan, applied: false, deleted_rows: 0 })
            }
            CleanupMode::Apply => {
                let deleted_rows = repo.delete_assignments(&plan.remove_ids()).await?;
                Ok(CleanupOutcome { plan, applied: true, deleted_rows })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentStatus::{Active, Inactive};
    use chrono::DateTime;

    fn row(id: i64, user_id: i64, role_id: i64, t: i64) -> RoleAssignmentRecord {
        RoleAssignmentRecord::new(user_id, role_id, Active, DateTime::from_timestamp(t, 0)).with_assignment_id(id)
    }

    #[test]
    fn test_keeps_lowest_id() {
        let plan = plan_duplicate_cleanup(&[row(30, 1, 1, 100), row(10, 1, 1, 100), row(20, 1, 1, 100)]);

        assert_eq!(plan.groups.len(), 1);
        assert_eq!(plan.groups[0].keep, 10);
        assert_eq!(plan.groups[0].remove, vec![20, 30]);
    }

    #[test]
    fn test_join_repeats_are_not_table_duplicates() {
        let plan = plan_duplicate_cleanup(&[row(5, 1, 1, 100), row(5, 1, 1, 100), row(5, 1, 1, 100)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_distinct_grants_untouched() {
        let records = vec![
            row(1, 1, 1, 100),
            row(2, 1, 2, 100),
            row(3, 1, 1, 200),
            RoleAssignmentRecord::new(1, 1, Inactive, DateTime::from_timestamp(100, 0)).with_assignment_id(4),
        ];
        assert!(plan_duplicate_cleanup(&records).is_empty());
    }

    #[test]
    fn test_records_without_id_skipped() {
        let unaddressable = RoleAssignmentRecord::new(1, 1, Active, DateTime::from_timestamp(100, 0));
        let plan = plan_duplicate_cleanup(&[unaddressable.clone(), unaddressable, row(9, 1, 1, 100)]);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_remove_ids_sorted_across_groups() {
        let plan = plan_duplicate_cleanup(&[
            row(8, 2, 1, 50),
            row(3, 2, 1, 50),
            row(7, 1, 1, 100),
            row(1, 1, 1, 100),
        ]);
        assert_eq!(plan.groups.len(), 2);
        assert_eq!(plan.remove_ids(), vec![7, 8]);
    }
}
