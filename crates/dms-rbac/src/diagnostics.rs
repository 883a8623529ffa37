//! Assignment Diagnostics
//!
//! Fetches assignments through a repository, groups them for display and
//! collects integrity findings. Findings are reported, never raised: only
//! repository failures make [`AssignmentDiagnostics::run`] return an error.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::aggregator::{DedupReport, RoleAssignmentAggregator, RoleAssignmentGroups};
use crate::assignment::RoleAssignmentRecord;
use crate::error::Result;
use crate::repository::{AssignmentFilter, DuplicateRoleLookup, RoleAssignmentRepository};

/// Raw table rows against rows returned by the lookup join
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinCheck {
    pub raw_rows: u64,
    pub joined_rows: u64,
}

impl JoinCheck {
    /// The join produced more rows than the table holds
    pub fn has_fault(&self) -> bool {
        self.joined_rows > self.raw_rows
    }

    pub fn extra_rows(&self) -> u64 {
        self.joined_rows.saturating_sub(self.raw_rows)
    }
}

/// An assignment pointing at a role that does not exist
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrphanedAssignment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<i64>,
    pub user_id: i64,
    pub role_id: i64,
}

/// Everything one diagnostic run found
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticReport {
    pub groups: RoleAssignmentGroups,
    pub dedup: DedupReport,
    pub join_check: JoinCheck,
    pub duplicate_role_lookups: Vec<DuplicateRoleLookup>,
    pub orphaned_assignments: Vec<OrphanedAssignment>,
}

impl DiagnosticReport {
    /// Assemble a report from already fetched data
    pub fn build(
        records: Vec<RoleAssignmentRecord>,
        raw_rows: u64,
        duplicate_role_lookups: Vec<DuplicateRoleLookup>,
    ) -> Self {
        let join_check = JoinCheck {
            raw_rows,
            joined_rows: records.len() as u64,
        };
        let orphaned_assignments = find_orphans(&records);
        let (groups, dedup) = RoleAssignmentAggregator::group_with_report(records);

        Self {
            groups,
            dedup,
            join_check,
            duplicate_role_lookups,
            orphaned_assignments,
        }
    }

    pub fn is_healthy(&self) -> bool {
        !self.dedup.has_removals()
            && !self.join_check.has_fault()
            && self.duplicate_role_lookups.is_empty()
            && self.orphaned_assignments.is_empty()
    }

    pub fn user_count(&self) -> usize {
        self.groups.len()
    }
}

/// One orphan entry per assignment row, even if the join repeated it
fn find_orphans(records: &[RoleAssignmentRecord]) -> Vec<OrphanedAssignment> {
    let mut seen: HashSet<i64> = HashSet::new();
    records
        .iter()
        .filter(|r| r.is_orphaned())
        .filter(|r| r.assignment_id.map_or(true, |id| seen.insert(id)))
        .map(|r| OrphanedAssignment {
            assignment_id: r.assignment_id,
            user_id: r.user_id,
            role_id: r.role_id,
        })
        .collect()
}

/// Runs the read-only checks against a repository
pub struct AssignmentDiagnostics;

impl AssignmentDiagnostics {
    pub async fn run(
        repo: &dyn RoleAssignmentRepository,
        filter: &AssignmentFilter,
    ) -> Result<DiagnosticReport> {
        let records = repo.fetch_assignments(filter).await?;
        let raw_rows = repo.count_assignment_rows(filter).await?;
        let duplicate_role_lookups = repo.find_duplicate_role_lookups().await?;

        let report = DiagnosticReport::build(records, raw_rows, duplicate_role_lookups);

        if report.join_check.has_fault() {
            warn!(
                raw_rows = report.join_check.raw_rows,
                joined_rows = report.join_check.joined_rows,
                "Role lookup join returned more rows than the assignment table holds"
            );
        }
        for lookup in &report.duplicate_role_lookups {
            warn!(role_key = lookup.role_key, row_count = lookup.row_count, "Role lookup key is not unique");
        }
        for orphan in &report.orphaned_assignments {
            warn!(
                user_id = orphan.user_id,
                role_id = orphan.role_id,
                assignment_id = ?orphan.assignment_id,
                "Assignment references a missing role"
            );
        }

        info!(
            users = report.user_count(),
            assignments = report.dedup.retained_count,
            healthy = report.is_healthy(),
            "Role assignment diagnostics complete"
        );

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assignment::AssignmentStatus::{Active, Inactive};
    use chrono::DateTime;

    #[test]
    fn test_clean_data_is_healthy() {
        let records = vec![
            RoleAssignmentRecord::new(1, 1, Active, DateTime::from_timestamp(100, 0))
                .with_assignment_id(1)
                .with_role_display_name("Admin"),
            RoleAssignmentRecord::new(1, 2, Inactive, DateTime::from_timestamp(90, 0))
                .with_assignment_id(2)
                .with_role_display_name("Editor"),
        ];

        let report = DiagnosticReport::build(records, 2, Vec::new());
        assert!(report.is_healthy());
        assert_eq!(report.user_count(), 1);
        assert_eq!(report.groups[&1].len(), 2);
    }

    #[test]
    fn test_join_fault_detected() {
        let row = RoleAssignmentRecord::new(1, 1, Active, DateTime::from_timestamp(100, 0))
            .with_assignment_id(7)
            .with_role_display_name("Admin");
        let report = DiagnosticReport::build(
            vec![row.clone(), row],
            1,
            vec![DuplicateRoleLookup { role_key: 1, row_count: 2 }],
        );

        assert!(report.join_check.has_fault());
        assert_eq!(report.join_check.extra_rows(), 1);
        assert!(report.dedup.has_removals());
        assert_eq!(report.groups[&1].len(), 1);
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_orphans_reported_once_per_row() {
        let orphan = RoleAssignmentRecord::new(3, 99, Active, None)
            .with_assignment_id(12)
            .with_missing_role();
        let report = DiagnosticReport::build(vec![orphan.clone(), orphan], 1, Vec::new());

        assert_eq!(
            report.orphaned_assignments,
            vec![OrphanedAssignment { assignment_id: Some(12), user_id: 3, role_id: 99 }]
        );
        assert!(!report.is_healthy());
    }

    #[test]
    fn test_unnamed_existing_role_is_not_orphaned() {
        let unnamed = RoleAssignmentRecord::new(1, 1, Active, DateTime::from_timestamp(100, 0))
            .with_assignment_id(1);
        assert!(unnamed.role_display_name.is_none());

        let report = DiagnosticReport::build(vec![unnamed], 1, Vec::new());
        assert!(report.orphaned_assignments.is_empty());
        assert!(report.is_healthy());
    }

    #[test]
    fn test_orphans_without_ids_are_all_listed() {
        let orphan = RoleAssignmentRecord::new(3, 99, Active, None).with_missing_role();
        let report = DiagnosticReport::build(vec![orphan.clone(), orphan], 2, Vec::new());
        assert_eq!(report.orphaned_assignments.len(), 2);
    }

    #[test]
    fn test_fewer_joined_rows_is_not_a_join_fault() {
        let check = JoinCheck { raw_rows: 5, joined_rows: 3 };
        assert!(!check.has_fault());
        assert_eq!(check.extra_rows(), 0);
    }
}
