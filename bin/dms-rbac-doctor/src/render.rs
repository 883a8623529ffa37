//! Plain-text rendering of reports

use std::fmt::Write;

use dms_rbac::{CleanupOutcome, DiagnosticReport, UserRoleGroup};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn diagnostic_report(report: &DiagnosticReport) -> String {
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Role assignments: {} user(s), {} assignment(s)",
        report.user_count(),
        report.dedup.retained_count
    );
    let _ = writeln!(out);

    for group in report.groups.values() {
        user_group(&mut out, group);
    }

    let _ = writeln!(out, "Findings");
    if report.is_healthy() {
        let _ = writeln!(out, "  none");
        return out;
    }

    if report.join_check.has_fault() {
        let _ = writeln!(
            out,
            "  lookup join returned {} row(s) for {} assignment row(s) ({} extra)",
            report.join_check.joined_rows,
            report.join_check.raw_rows,
            report.join_check.extra_rows()
        );
    }
    for lookup in &report.duplicate_role_lookups {
        let _ = writeln!(out, "  role key {} appears {} times in the role table", lookup.role_key, lookup.row_count);
    }
    for user in &report.dedup.users {
        let _ = writeln!(
            out,
            "  user {}: {} row(s) collapsed to {}",
            user.user_id, user.input_count, user.retained_count
        );
    }
    for orphan in &report.orphaned_assignments {
        let id = orphan.assignment_id.map_or_else(|| "?".to_string(), |id| id.to_string());
        let _ = writeln!(
            out,
            "  assignment {} (user {}) references missing role {}",
            id, orphan.user_id, orphan.role_id
        );
    }

    out
}

fn user_group(out: &mut String, group: &UserRoleGroup) {
    let _ = writeln!(out, "User {} ({} assignment(s))", group.user_id, group.len());
    let _ = writeln!(out, "  {:<6} {:<24} {:<9} {:<20} {}", "ROLE", "NAME", "STATUS", "GRANTED AT", "GRANTED BY");
    for assignment in &group.assignments {
        let name = if assignment.role_missing {
            "<missing role>"
        } else {
            assignment.role_display_name.as_deref().unwrap_or("-")
        };
        let granted_at = assignment
            .granted_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let granted_by = assignment
            .granted_by
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "  {:<6} {:<24} {:<9} {:<20} {}",
            assignment.role_id, name, assignment.status, granted_at, granted_by
        );
    }
    let _ = writeln!(out);
}

pub fn cleanup_outcome(outcome: &CleanupOutcome) -> String {
    let mut out = String::new();

    if outcome.plan.is_empty() {
        let _ = writeln!(out, "No duplicate assignment rows found");
        return out;
    }

    for group in &outcome.plan.groups {
        let granted_at = group
            .key
            .granted_at
            .map(|t| t.format(TIME_FORMAT).to_string())
            .unwrap_or_else(|| "-".to_string());
        let removed: Vec<String> = group.remove.iter().map(|id| id.to_string()).collect();
        let _ = writeln!(
            out,
            "user {} role {} {} {}: keep {}, remove {}",
            group.key.user_id,
            group.key.role_id,
            group.key.status,
            granted_at,
            group.keep,
            removed.join(", ")
        );
    }

    let planned = outcome.plan.remove_ids().len();
    if outcome.applied {
        let _ = writeln!(out, "Deleted {} of {} duplicate row(s)", outcome.deleted_rows, planned);
    } else {
        let _ = writeln!(out, "Dry run: {} duplicate row(s) would be deleted; rerun with --apply", planned);
    }

    out
}
