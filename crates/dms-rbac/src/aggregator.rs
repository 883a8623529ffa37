//! Role Assignment Aggregator
//!
//! Groups a flat list of assignment rows by user for display, dropping exact
//! duplicates introduced upstream (typically a lookup join that matched more
//! than one role row) while keeping every distinct grant.
//!
//! Two rows are the same assignment when they share
//! `(user_id, role_id, status, granted_at)`. The first row seen for a key
//! wins; later rows with that key are discarded even if their descriptive
//! fields differ.

use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::warn;

use crate::assignment::{AssignmentKey, RoleAssignmentRecord};

/// Deduplicated assignments of one user, in input order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRoleGroup {
    pub user_id: i64,
    pub assignments: Vec<RoleAssignmentRecord>,
}

impl UserRoleGroup {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            assignments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    /// Active assignments only, order kept
    pub fn active(&self) -> impl Iterator<Item = &RoleAssignmentRecord> {
        self.assignments.iter().filter(|a| a.is_active())
    }

    /// Distinct role ids in first-seen order
    pub fn role_ids(&self) -> Vec<i64> {
        let mut seen = HashSet::new();
        self.assignments
            .iter()
            .filter(|a| seen.insert(a.role_id))
            .map(|a| a.role_id)
            .collect()
    }
}

/// User id to group, iterating users in first-seen order
pub type RoleAssignmentGroups = IndexMap<i64, UserRoleGroup>;

/// Per-user counts for a user that lost rows to deduplication
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDedupStats {
    pub user_id: i64,
    pub input_count: usize,
    pub retained_count: usize,
}

impl UserDedupStats {
    pub fn removed_count(&self) -> usize {
        self.input_count - self.retained_count
    }
}

/// Outcome of a grouping pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DedupReport {
    pub input_count: usize,
    pub retained_count: usize,
    /// Only users where rows were removed
    pub users: Vec<UserDedupStats>,
}

impl DedupReport {
    pub fn removed_count(&self) -> usize {
        self.input_count - self.retained_count
    }

    pub fn has_removals(&self) -> bool {
        self.removed_count() > 0
    }
}

/// Groups role assignment rows by user
pub struct RoleAssignmentAggregator;

impl RoleAssignmentAggregator {
    /// Group and deduplicate. Pure; never fails.
    pub fn group<I>(records: I) -> RoleAssignmentGroups
    where
        I: IntoIterator<Item = RoleAssignmentRecord>,
    {
        Self::group_counting(records).0
    }

    /// Group and deduplicate, reporting users whose input contained
    /// duplicates. Each affected user is logged at warn level since it points
    /// at a broken join upstream.
    pub fn group_with_report<I>(records: I) -> (RoleAssignmentGroups, DedupReport)
    where
        I: IntoIterator<Item = RoleAssignmentRecord>,
    {
        let (groups, input_counts) = Self::group_counting(records);

        let mut report = DedupReport::default();
        for (user_id, input_count) in input_counts {
            let retained_count = groups.get(&user_id).map_or(0, UserRoleGroup::len);
            report.input_count += input_count;
            report.retained_count += retained_count;

            if input_count > retained_count {
                warn!(
                    user_id,
                    input_count,
                    retained_count,
                    "Duplicate role assignment rows collapsed; check the role lookup join"
                );
                report.users.push(UserDedupStats {
                    user_id,
                    input_count,
                    retained_count,
                });
            }
        }

        (groups, report)
    }

    /// Concatenate the groups back into a flat list, users in map order
    pub fn flatten(groups: &RoleAssignmentGroups) -> Vec<RoleAssignmentRecord> {
        groups
            .values()
            .flat_map(|g| g.assignments.iter().cloned())
            .collect()
    }

    fn group_counting<I>(records: I) -> (RoleAssignmentGroups, IndexMap<i64, usize>)
    where
        I: IntoIterator<Item = RoleAssignmentRecord>,
    {
        let mut seen: HashSet<AssignmentKey> = HashSet::new();
        let mut groups = RoleAssignmentGroups::new();
        let mut input_counts: IndexMap<i64, usize> = IndexMap::new();

        for record in records {
            *input_counts.entry(record.user_id).or_insert(0) += 1;

            let group = groups
                .entry(record.user_id)
                .or_insert_with(|| UserRoleGroup::new(record.user_id));
            if seen.insert(record.key()) {
                group.assignments.push(record);
            }
        }

        (groups, input_counts)
    }
}
