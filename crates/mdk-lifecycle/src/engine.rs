//! Memo lifecycle state machine.
//!
//! # Design
//!
//! Pure and synchronous: [`plan_transition`] looks at a memo and an action
//! and returns the scoped patch the store should merge, or an error. It never
//! touches storage, so the same rules hold for every backend.
//!
//! 1. **Legal transitions only.** The `(status, action)` pair is checked
//!    before any guard; an illegal pair is `InvalidTransition` even when the
//!    action would otherwise be a no-op.
//! 2. **Guards after state.** Blank inputs and `markComplete` without an
//!    assignee are `Validation` failures.
//! 3. **Idempotent tagging.** Tagging an already tagged department plans
//!    nothing (`Ok(None)`).
//!
//! # Transitions
//!
//! ```text
//!   from                          action          to
//!   Pending                       approve         Approved
//!   Pending|Approved|Escalated    escalate        Escalated   (level + 1)
//!   Approved|Escalated            markComplete    Completed   (term.)
//!   Approved|Escalated            withhold        Withheld    (term., notes = reason)
//!   Approved|Escalated|Withheld   tagDepartment   unchanged   (set-union)
//! ```

use mdk_schemas::{Memo, MemoError, MemoPatch, MemoStatus};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// MemoAction
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum MemoAction {
    /// `Pending -> Approved`, optionally routing to a department.
    #[serde(rename_all = "camelCase")]
    Approve { assigned_to: Option<String> },
    /// Raise the escalation level by one.
    Escalate,
    /// Requires an assignee.
    MarkComplete,
    Withhold { reason: String },
    /// Add a collaborating department. Status is unchanged.
    TagDepartment { department: String },
}

impl MemoAction {
    /// Wire/audit name of the action.
    pub fn name(&self) -> &'static str {
        match self {
            MemoAction::Approve { .. } => "approve",
            MemoAction::Escalate => "escalate",
            MemoAction::MarkComplete => "markComplete",
            MemoAction::Withhold { .. } => "withhold",
            MemoAction::TagDepartment { .. } => "tagDepartment",
        }
    }
}

// ---------------------------------------------------------------------------
// plan_transition
// ---------------------------------------------------------------------------

/// Decide what `action` does to `memo`.
///
/// * `Ok(Some(patch))`: merge `patch` into the stored memo.
/// * `Ok(None)`: legal, but nothing to change.
/// * `Err(InvalidTransition)`: the action is not allowed from this status.
/// * `Err(Validation)`: a guard failed.
pub fn plan_transition(memo: &Memo, action: &MemoAction) -> Result<Option<MemoPatch>, MemoError> {
    use MemoStatus::*;

    let illegal = || MemoError::InvalidTransition {
        from: memo.status,
        action: action.name().to_string(),
    };

    match (memo.status, action) {
        (Pending, MemoAction::Approve { assigned_to }) => {
            let assigned_to = match assigned_to {
                Some(a) => Some(non_blank(a, "assignedTo")?),
                None => None,
            };
            Ok(Some(MemoPatch {
                status: Some(Approved),
                assigned_to,
                ..MemoPatch::default()
            }))
        }

        (Pending | Approved | Escalated, MemoAction::Escalate) => Ok(Some(MemoPatch {
            status: Some(Escalated),
            escalate: true,
            ..MemoPatch::default()
        })),

        (Approved | Escalated, MemoAction::MarkComplete) => {
            let has_assignee = memo
                .assigned_to
                .as_deref()
                .map(|a| !a.trim().is_empty())
                .unwrap_or(false);
            if !has_assignee {
                return Err(MemoError::validation(
                    "markComplete requires an assigned department",
                ));
            }
            Ok(Some(MemoPatch {
                status: Some(Completed),
                ..MemoPatch::default()
            }))
        }

        (Approved | Escalated, MemoAction::Withhold { reason }) => {
            let reason = non_blank(reason, "reason")?;
            Ok(Some(MemoPatch {
                status: Some(Withheld),
                notes: Some(reason),
                ..MemoPatch::default()
            }))
        }

        (Approved | Escalated | Withheld, MemoAction::TagDepartment { department }) => {
            let department = non_blank(department, "department")?;
            if memo.is_tagged(&department) {
                return Ok(None);
            }
            Ok(Some(MemoPatch {
                tag_department: Some(department),
                ..MemoPatch::default()
            }))
        }

        _ => Err(illegal()),
    }
}

fn non_blank(value: &str, field: &str) -> Result<String, MemoError> {
    let t = value.trim();
    if t.is_empty() {
        return Err(MemoError::validation(format!("{field} must not be blank")));
    }
    Ok(t.to_string())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
