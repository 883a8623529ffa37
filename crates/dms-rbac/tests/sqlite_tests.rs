#![cfg(feature = "sqlite")]

//! SQLite Repository Integration Tests
//!
//! Runs the repository, diagnostics and cleanup against an in-memory SQLite
//! database seeded with the classic faults:
//! - a role id present twice in the role table (join doubles its rows)
//! - an exact duplicate assignment row
//! - an assignment whose role does not exist

use chrono::{NaiveDate, Utc, DateTime};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;

use dms_rbac::{
    AssignmentDiagnostics, AssignmentFilter, AssignmentStatus, AssignmentTables, CleanupMode,
    DuplicateCleanup, DuplicateRoleLookup, RbacError, RoleAssignmentRepository,
    SqliteRoleAssignmentRepository,
};

const SCHEMA: &str = r#"
CREATE TABLE dms_roles (
    id INTEGER NOT NULL,
    name TEXT NOT NULL,
    display_name TEXT
);
CREATE TABLE dms_user_roles (
    id INTEGER PRIMARY KEY,
    user_id INTEGER NOT NULL,
    role_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    granted_by INTEGER,
    granted_at DATETIME,
    notes TEXT,
    department TEXT,
    assignment_reason TEXT
);
"#;

const SEED: &str = r#"
INSERT INTO dms_roles (id, name, display_name) VALUES
    (1, 'admin', 'Administrator'),
    (2, 'editor', 'Editor'),
    (2, 'editor', 'Editor (legacy)'),
    (3, 'viewer', 'Viewer');
INSERT INTO dms_user_roles (id, user_id, role_id, status, granted_by, granted_at, notes, department, assignment_reason) VALUES
    (1, 1, 1, 'active',   100, '2024-03-01 10:00:00', NULL, 'Legal', 'onboarding'),
    (2, 1, 2, 'active',   100, '2024-02-01 09:00:00', NULL, 'Legal', NULL),
    (3, 1, 3, 'inactive', NULL, '2024-01-15 08:00:00', 'revoked', NULL, NULL),
    (4, 2, 1, 'Active',   101, '2024-01-10 12:00:00', NULL, NULL, NULL),
    (5, 2, 1, 'active',   101, '2024-01-10 12:00:00', 'double click', NULL, NULL),
    (6, 3, 42, 'active',  NULL, NULL, NULL, NULL, NULL);
"#;

async fn create_pool() -> SqlitePool {
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap()
}

async fn seeded_repository() -> SqliteRoleAssignmentRepository {
    let pool = create_pool().await;
    sqlx::raw_sql(SCHEMA).execute(&pool).await.unwrap();
    sqlx::raw_sql(SEED).execute(&pool).await.unwrap();
    SqliteRoleAssignmentRepository::new(pool, AssignmentTables::default()).unwrap()
}

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap()
        .and_hms_opt(hour, 0, 0)
        .unwrap()
        .and_utc()
}

#[tokio::test]
async fn test_fetch_keeps_orphans_and_join_repeats() {
    let repo = seeded_repository().await;

    let records = repo.fetch_assignments(&AssignmentFilter::all()).await.unwrap();
    let ids: Vec<Option<i64>> = records.iter().map(|r| r.assignment_id).collect();

    // Row 2 joins against both role 2 rows
    assert_eq!(ids, vec![Some(1), Some(2), Some(2), Some(3), Some(4), Some(5), Some(6)]);

    let orphan = records.last().unwrap();
    assert_eq!(orphan.role_id, 42);
    assert!(orphan.role_display_name.is_none());
    assert!(orphan.role_missing);
    assert!(orphan.granted_at.is_none());
    assert!(records[..6].iter().all(|r| !r.role_missing));
}

#[tokio::test]
async fn test_fetch_decodes_columns() {
    let repo = seeded_repository().await;

    let records = repo.fetch_assignments(&AssignmentFilter::for_user(1)).await.unwrap();
    let first = &records[0];

    assert_eq!(first.user_id, 1);
    assert_eq!(first.role_id, 1);
    assert_eq!(first.status, AssignmentStatus::Active);
    assert_eq!(first.granted_by, Some(100));
    assert_eq!(first.granted_at, Some(at(2024, 3, 1, 10)));
    assert_eq!(first.department.as_deref(), Some("Legal"));
    assert_eq!(first.assignment_reason.as_deref(), Some("onboarding"));
    assert_eq!(first.role_display_name.as_deref(), Some("Administrator"));

    // Active before inactive, newest grant first
    let last = records.last().unwrap();
    assert_eq!(last.status, AssignmentStatus::Inactive);
    assert_eq!(last.notes.as_deref(), Some("revoked"));
}

#[tokio::test]
async fn test_filters_and_raw_count() {
    let repo = seeded_repository().await;

    let filter = AssignmentFilter::for_user(1).active_only();
    let records = repo.fetch_assignments(&filter).await.unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().all(|r| r.is_active()));

    assert_eq!(repo.count_assignment_rows(&filter).await.unwrap(), 2);
    assert_eq!(repo.count_assignment_rows(&AssignmentFilter::all()).await.unwrap(), 6);
    assert_eq!(repo.count_assignment_rows(&AssignmentFilter::for_user(77)).await.unwrap(), 0);
}

#[tokio::test]
async fn test_duplicate_role_lookups() {
    let repo = seeded_repository().await;

    let lookups = repo.find_duplicate_role_lookups().await.unwrap();
    assert_eq!(lookups, vec![DuplicateRoleLookup { role_key: 2, row_count: 2 }]);
}

#[tokio::test]
async fn test_diagnostics_report() {
    let repo = seeded_repository().await;

    let report = AssignmentDiagnostics::run(&repo, &AssignmentFilter::all()).await.unwrap();

    assert!(!report.is_healthy());
    assert_eq!(report.user_count(), 3);
    assert_eq!(report.groups[&1].role_ids(), vec![1, 2, 3]);
    assert_eq!(report.groups[&2].len(), 1);
    assert_eq!(report.groups[&2].assignments[0].assignment_id, Some(4));

    assert_eq!(report.join_check.raw_rows, 6);
    assert_eq!(report.join_check.joined_rows, 7);
    assert!(report.join_check.has_fault());

    let affected: Vec<i64> = report.dedup.users.iter().map(|u| u.user_id).collect();
    assert_eq!(affected, vec![1, 2]);
    assert_eq!(report.dedup.removed_count(), 2);

    assert_eq!(report.orphaned_assignments.len(), 1);
    assert_eq!(report.orphaned_assignments[0].assignment_id, Some(6));
}

#[tokio::test]
async fn test_cleanup_dry_run_then_apply() {
    let repo = seeded_repository().await;
    let filter = AssignmentFilter::all();

    let dry = DuplicateCleanup::run(&repo, &filter, CleanupMode::DryRun).await.unwrap();
    assert!(!dry.applied);
    assert_eq!(dry.deleted_rows, 0);
    assert_eq!(dry.plan.remove_ids(), vec![5]);
    assert_eq!(dry.plan.groups[0].keep, 4);
    assert_eq!(repo.count_assignment_rows(&filter).await.unwrap(), 6);

    let applied = DuplicateCleanup::run(&repo, &filter, CleanupMode::Apply).await.unwrap();
    assert!(applied.applied);
    assert_eq!(applied.deleted_rows, 1);
    assert_eq!(repo.count_assignment_rows(&filter).await.unwrap(), 5);

    let again = DuplicateCleanup::run(&repo, &filter, CleanupMode::Apply).await.unwrap();
    assert!(again.plan.is_empty());
    assert_eq!(again.deleted_rows, 0);
}

#[tokio::test]
async fn test_delete_nothing_is_noop() {
    let repo = seeded_repository().await;
    assert_eq!(repo.delete_assignments(&[]).await.unwrap(), 0);
}

#[tokio::test]
async fn test_unknown_status_is_an_error() {
    let repo = seeded_repository().await;
    sqlx::query("INSERT INTO dms_user_roles (id, user_id, role_id, status) VALUES (7, 9, 1, 'pending')")
        .execute(repo.pool())
        .await
        .unwrap();

    let result = repo.fetch_assignments(&AssignmentFilter::for_user(9)).await;
    assert!(matches!(result, Err(RbacError::InvalidStatus { .. })));
}

#[tokio::test]
async fn test_padded_status_is_active() {
    let repo = seeded_repository().await;
    sqlx::raw_sql(
        "INSERT INTO dms_user_roles (id, user_id, role_id, status, granted_at) VALUES
             (10, 8, 1, 'inactive', '2024-05-01 00:00:00'),
             (11, 8, 3, ' Active ', '2024-01-01 00:00:00');",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let records = repo.fetch_assignments(&AssignmentFilter::for_user(8)).await.unwrap();
    let order: Vec<(i64, AssignmentStatus)> = records.iter().map(|r| (r.role_id, r.status)).collect();
    assert_eq!(order, vec![(3, AssignmentStatus::Active), (1, AssignmentStatus::Inactive)]);

    let filter = AssignmentFilter::for_user(8).active_only();
    let active = repo.fetch_assignments(&filter).await.unwrap();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].assignment_id, Some(11));
    assert_eq!(repo.count_assignment_rows(&filter).await.unwrap(), 1);
}

#[tokio::test]
async fn test_role_without_display_name_is_not_orphaned() {
    let repo = seeded_repository().await;
    sqlx::raw_sql(
        "INSERT INTO dms_roles (id, name, display_name) VALUES (7, 'unnamed', NULL);
         INSERT INTO dms_user_roles (id, user_id, role_id, status) VALUES (12, 10, 7, 'active');",
    )
    .execute(repo.pool())
    .await
    .unwrap();

    let filter = AssignmentFilter::for_user(10);
    let records = repo.fetch_assignments(&filter).await.unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].role_display_name.is_none());
    assert!(!records[0].role_missing);

    let report = AssignmentDiagnostics::run(&repo, &filter).await.unwrap();
    assert!(report.orphaned_assignments.is_empty());
    assert!(!report.join_check.has_fault());
}

#[tokio::test]
async fn test_custom_table_names() {
    let pool = create_pool().await;
    sqlx::raw_sql(
        "CREATE TABLE legacy_roles (role_no INTEGER NOT NULL, label TEXT);
         CREATE TABLE legacy_user_roles (id INTEGER PRIMARY KEY, user_id INTEGER NOT NULL, role_id INTEGER NOT NULL,
             status TEXT NOT NULL, granted_by INTEGER, granted_at DATETIME, notes TEXT, department TEXT, assignment_reason TEXT);
         INSERT INTO legacy_roles VALUES (5, 'Auditor');
         INSERT INTO legacy_user_roles (id, user_id, role_id, status) VALUES (1, 4, 5, 'inactive');",
    )
    .execute(&pool)
    .await
    .unwrap();

    let tables = AssignmentTables {
        user_roles: "legacy_user_roles".to_string(),
        roles: "legacy_roles".to_string(),
        role_key_column: "role_no".to_string(),
        role_display_column: "label".to_string(),
    };
    let repo = SqliteRoleAssignmentRepository::new(pool, tables).unwrap();

    let records = repo.fetch_assignments(&AssignmentFilter::all()).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].role_display_name.as_deref(), Some("Auditor"));
    assert_eq!(records[0].status, AssignmentStatus::Inactive);
}

#[tokio::test]
async fn test_rejects_unsafe_table_names() {
    let pool = create_pool().await;
    let tables = AssignmentTables {
        roles: "dms_roles r; --".to_string(),
        ..Default::default()
    };
    assert!(matches!(
        SqliteRoleAssignmentRepository::new(pool, tables),
        Err(RbacError::Configuration { .. })
    ));
}
