use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::MemoError;

/// Departments offered to the raiser at submission time.
///
/// Tagging and assignment accept any non-blank identifier; this list is the
/// suggested catalog only.
pub const DEPARTMENTS: &[&str] = &["Civil", "Electrical", "Laundry", "Plumbing"];

// ---------------------------------------------------------------------------
// MemoId
// ---------------------------------------------------------------------------

/// Opaque memo identifier. Assigned by the store on create, never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MemoId(pub Uuid);

impl MemoId {
    pub fn new_v4() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl fmt::Display for MemoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for MemoId {
    type Err = MemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(MemoId)
            .map_err(|_| MemoError::validation(format!("invalid memo id: {s}")))
    }
}

// ---------------------------------------------------------------------------
// MemoStatus
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MemoStatus {
    Pending,
    Approved,
    Escalated,
    /// Terminal.
    Completed,
    /// Terminal.
    Withheld,
}

impl MemoStatus {
    pub const ALL: [MemoStatus; 5] = [
        MemoStatus::Pending,
        MemoStatus::Approved,
        MemoStatus::Escalated,
        MemoStatus::Completed,
        MemoStatus::Withheld,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemoStatus::Pending => "Pending",
            MemoStatus::Approved => "Approved",
            MemoStatus::Escalated => "Escalated",
            MemoStatus::Completed => "Completed",
            MemoStatus::Withheld => "Withheld",
        }
    }

    /// Case-insensitive parse of the wire name.
    pub fn parse(s: &str) -> Result<Self, MemoError> {
        let t = s.trim();
        MemoStatus::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(t))
            .ok_or_else(|| MemoError::validation(format!("invalid memo status: {s}")))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, MemoStatus::Completed | MemoStatus::Withheld)
    }
}

impl fmt::Display for MemoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemoStatus {
    type Err = MemoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemoStatus::parse(s)
    }
}

// ---------------------------------------------------------------------------
// MemoDraft
// ---------------------------------------------------------------------------

/// What a raiser submits. Everything here becomes immutable once stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoDraft {
    pub title: String,
    pub description: String,
    #[serde(alias = "complaint")]
    pub nature_of_complaint: String,
    pub raised_by: String,
    pub ward: Option<String>,
    pub floor: Option<String>,
    pub duty_timing: Option<String>,
    /// Concerned departments selected at submission.
    pub departments: Vec<String>,
}

impl MemoDraft {
    pub fn new(
        title: impl Into<String>,
        raised_by: impl Into<String>,
        nature_of_complaint: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            raised_by: raised_by.into(),
            nature_of_complaint: nature_of_complaint.into(),
            ..Self::default()
        }
    }

    /// Trim every field, enforce the required ones, and fill derived defaults.
    ///
    /// Required: `raisedBy`, `natureOfComplaint`.
    /// A blank title becomes the comma-joined department list; a blank
    /// description becomes the complaint text. Departments are de-duplicated
    /// in first-seen order and blanks are dropped.
    pub fn normalize(self) -> Result<MemoDraft, MemoError> {
        let raised_by = self.raised_by.trim().to_string();
        if raised_by.is_empty() {
            return Err(MemoError::validation("raisedBy is required"));
        }
        let nature_of_complaint = self.nature_of_complaint.trim().to_string();
        if nature_of_complaint.is_empty() {
            return Err(MemoError::validation("natureOfComplaint is required"));
        }

        let mut departments: Vec<String> = Vec::new();
        for d in self.departments {
            let d = d.trim();
            if !d.is_empty() && !departments.iter().any(|x| x == d) {
                departments.push(d.to_string());
            }
        }

        let mut title = self.title.trim().to_string();
        if title.is_empty() {
            title = departments.join(", ");
        }
        let mut description = self.description.trim().to_string();
        if description.is_empty() {
            description = nature_of_complaint.clone();
        }

        Ok(MemoDraft {
            title,
            description,
            nature_of_complaint,
            raised_by,
            ward: non_blank(self.ward),
            floor: non_blank(self.floor),
            duty_timing: non_blank(self.duty_timing),
            departments,
        })
    }
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

// ---------------------------------------------------------------------------
// Memo
// ---------------------------------------------------------------------------

/// A complaint record as persisted and served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Memo {
    pub id: MemoId,
    pub title: String,
    pub description: String,
    pub nature_of_complaint: String,
    pub raised_by: String,
    pub status: MemoStatus,
    pub assigned_to: Option<String>,
    pub escalation_level: u32,
    /// Append-only, no duplicates, insertion order preserved.
    pub tagged_departments: Vec<String>,
    pub notes: Option<String>,
    pub ward: Option<String>,
    pub floor: Option<String>,
    pub duty_timing: Option<String>,
    pub departments: Vec<String>,
    pub created_at_utc: DateTime<Utc>,
    pub updated_at_utc: DateTime<Utc>,
}

impl Memo {
    /// Build the initial record for a normalized draft: `Pending`, level 0.
    pub fn from_draft(id: MemoId, draft: MemoDraft, now: DateTime<Utc>) -> Self {
        Self {
            id,
            title: draft.title,
            description: draft.description,
            nature_of_complaint: draft.nature_of_complaint,
            raised_by: draft.raised_by,
            status: MemoStatus::Pending,
            assigned_to: None,
            escalation_level: 0,
            tagged_departments: Vec::new(),
            notes: None,
            ward: draft.ward,
            floor: draft.floor,
            duty_timing: draft.duty_timing,
            departments: draft.departments,
            created_at_utc: now,
            updated_at_utc: now,
        }
    }

    pub fn is_tagged(&self, department: &str) -> bool {
        self.tagged_departments.iter().any(|d| d == department)
    }

    /// Merge a patch into this record. Only the fields a patch can carry are
    /// touched; everything set at creation is left alone.
    pub fn apply_patch(&mut self, patch: &MemoPatch, now: DateTime<Utc>) {
        if let Some(status) = patch.status {
            self.status = status;
        }
        if let Some(assignee) = &patch.assigned_to {
            self.assigned_to = Some(assignee.clone());
        }
        if patch.escalate {
            self.escalation_level = self.escalation_level.saturating_add(1);
        }
        if let Some(dept) = &patch.tag_department {
            if !self.is_tagged(dept) {
                self.tagged_departments.push(dept.clone());
            }
        }
        if let Some(notes) = &patch.notes {
            self.notes = Some(notes.clone());
        }
        self.updated_at_utc = now;
    }
}

// ---------------------------------------------------------------------------
// MemoPatch
// ---------------------------------------------------------------------------

/// Field-scoped merge applied by `MemoStore::update` in one atomic step.
///
/// `escalate` asks the store to add exactly one to `escalationLevel`;
/// `tag_department` is a set-union of a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoPatch {
    pub status: Option<MemoStatus>,
    pub assigned_to: Option<String>,
    pub escalate: bool,
    pub tag_department: Option<String>,
    pub notes: Option<String>,
}

impl MemoPatch {
    pub fn is_empty(&self) -> bool {
        self.status.is_none()
            && self.assigned_to.is_none()
            && !self.escalate
            && self.tag_department.is_none()
            && self.notes.is_none()
    }
}

// ---------------------------------------------------------------------------
// MemoFilter / MemoSnapshot
// ---------------------------------------------------------------------------

/// Subscription and listing filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MemoFilter {
    pub status: Option<MemoStatus>,
    pub assigned_to: Option<String>,
}

impl MemoFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn status(status: MemoStatus) -> Self {
        Self {
            status: Some(status),
            assigned_to: None,
        }
    }

    pub fn assigned_to(dept: impl Into<String>) -> Self {
        Self {
            status: None,
            assigned_to: Some(dept.into()),
        }
    }

    pub fn matches(&self, memo: &Memo) -> bool {
        if let Some(st) = self.status {
            if memo.status != st {
                return false;
            }
        }
        if let Some(dept) = &self.assigned_to {
            if memo.assigned_to.as_deref() != Some(dept.as_str()) {
                return false;
            }
        }
        true
    }
}

/// The filtered memo set at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoSnapshot {
    /// Per-subscription sequence number, starting at 0.
    pub seq: u64,
    pub taken_at_utc: DateTime<Utc>,
    pub memos: Vec<Memo>,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
