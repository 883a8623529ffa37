//! DMS RBAC
//!
//! Role assignment aggregation, integrity diagnostics and duplicate cleanup
//! for the document-management system's `dms_user_roles` / `dms_roles`
//! tables.
//!
//! The [`RoleAssignmentAggregator`] is pure and needs no database. The
//! repositories (one per backend, behind cargo features) supply it with rows
//! from a left join of the assignment table against the role lookup.

pub mod aggregator;
pub mod assignment;
pub mod cleanup;
pub mod diagnostics;
pub mod error;
pub mod repository;

#[cfg(feature = "sqlite")]
pub mod sqlite;
#[cfg(feature = "postgres")]
pub mod postgres;
#[cfg(feature = "mysql")]
pub mod mysql;

pub use aggregator::{DedupReport, RoleAssignmentAggregator, RoleAssignmentGroups, UserDedupStats, UserRoleGroup};
pub use assignment::{AssignmentKey, AssignmentStatus, RoleAssignmentRecord};
pub use cleanup::{plan_duplicate_cleanup, CleanupMode, CleanupOutcome, CleanupPlan, DuplicateCleanup, DuplicateRowGroup};
pub use diagnostics::{AssignmentDiagnostics, DiagnosticReport, JoinCheck, OrphanedAssignment};
pub use error::{RbacError, Result};
pub use repository::{AssignmentFilter, AssignmentTables, DuplicateRoleLookup, RoleAssignmentRepository};

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteRoleAssignmentRepository;
#[cfg(feature = "postgres")]
pub use postgres::PgRoleAssignmentRepository;
#[cfg(feature = "mysql")]
pub use mysql::MySqlRoleAssignmentRepository;
