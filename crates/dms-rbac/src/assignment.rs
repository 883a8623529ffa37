//! Role Assignment Records
//!
//! One row of the user/role assignment table joined against the role lookup.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RbacError, Result};

/// Assignment status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentStatus {
    Active,
    Inactive,
}

impl AssignmentStatus {
    /// Parse a status as stored in the database (`active` / `inactive`,
    /// any case, surrounding whitespace ignored).
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "inactive" => Ok(Self::Inactive),
            _ => Err(RbacError::invalid_status(value)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Inactive => "inactive",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }
}

impl std::fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}

/// Identity of a logical assignment.
///
/// Two records with the same key describe the same grant, whatever their
/// descriptive fields say.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentKey {
    pub user_id: i64,
    pub role_id: i64,
    pub status: AssignmentStatus,
    pub granted_at: Option<DateTime<Utc>>,
}

/// A role granted to a user, as returned by the assignment/role join
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleAssignmentRecord {
    /// Primary key of the backing assignment row, when known
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assignment_id: Option<i64>,

    pub user_id: i64,
    pub role_id: i64,
    pub status: AssignmentStatus,

    /// Provenance
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub granted_by: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub granted_at: Option<DateTime<Utc>>,

    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub assignment_reason: Option<String>,

    /// Display name from the role lookup. `None` when the role row is
    /// missing or its display column is NULL.
    #[serde(default)]
    pub role_display_name: Option<String>,

    /// The role lookup found no row for `role_id`
    #[serde(default)]
    pub role_missing: bool,
}

impl RoleAssignmentRecord {
    pub fn new(
        user_id: i64,
        role_id: i64,
        status: AssignmentStatus,
        granted_at: Option<DateTime<Utc>>,
    ) -> Self {
        Self {
            assignment_id: None,
            user_id,
            role_id,
            status,
            granted_by: None,
            granted_at,
            notes: None,
            department: None,
            assignment_reason: None,
            role_display_name: None,
            role_missing: false,
        }
    }

    pub fn with_assignment_id(mut self, id: i64) -> Self {
        self.assignment_id = Some(id);
        self
    }

    pub fn with_granted_by(mut self, granted_by: i64) -> Self {
        self.granted_by = Some(granted_by);
        self
    }

    pub fn with_role_display_name(mut self, name: impl Into<String>) -> Self {
        self.role_display_name = Some(name.into());
        self
    }

    /// Mark the referenced role as absent from the role table
    pub fn with_missing_role(mut self) -> Self {
        self.role_missing = true;
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_department(mut self, department: impl Into<String>) -> Self {
        self.department = Some(department.into());
        self
    }

    pub fn with_assignment_reason(mut self, reason: impl Into<String>) -> Self {
        self.assignment_reason = Some(reason.into());
        self
    }

    pub fn key(&self) -> AssignmentKey {
        AssignmentKey {
            user_id: self.user_id,
            role_id: self.role_id,
            status: self.status,
            granted_at: self.granted_at,
        }
    }

    /// True when the role lookup found no matching role row
    pub fn is_orphaned(&self) -> bool {
        self.role_missing
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}
