//! Moderation policy: intents, branch-limit checks and the transition table.
//!
//! [`plan_transition`] is pure. It decides what an intent does for a given
//! base status, actor role and "changed" flag; the engine carries the plan
//! out against a store. Keeping the table here makes every combination
//! testable without storage.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::roles::ModerationRole;
use crate::status::{ModerationStatus, OpKind};

/// Default maximum number of child revisions per revision.
pub const DEFAULT_BRANCH_LIMIT: i64 = 10;

pub const RECOVER_COMMENT: &str = "Deleted object was recovered.";

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// A user action on a versioned record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Submit the edit for approval.
    ToApprove,
    Approve,
    Reject,
    /// Save a draft, or publish directly when the actor is a content admin.
    Save,
    /// Record a draft in history without submitting it.
    SaveToHistory,
    /// Bring back a deleted record.
    Recover,
}

impl Intent {
    pub const ALL: [Intent; 6] = [
        Intent::ToApprove,
        Intent::Approve,
        Intent::Reject,
        Intent::Save,
        Intent::SaveToHistory,
        Intent::Recover,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToApprove => "to_approve",
            Self::Approve => "approve",
            Self::Reject => "reject",
            Self::Save => "save",
            Self::SaveToHistory => "save_to_history",
            Self::Recover => "recover",
        }
    }

    /// Intents reserved for content admins.
    pub fn requires_admin(&self) -> bool {
        matches!(self, Self::Approve | Self::Reject | Self::Recover)
    }
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Branch limit
// ---------------------------------------------------------------------------

/// Branching state of a record's revision, used to gate edits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub has_children: bool,
    pub can_branch: bool,
}

impl BranchInfo {
    pub fn from_child_count(child_count: i64, limit: i64) -> Self {
        Self {
            has_children: child_count > 0,
            can_branch: child_count < limit,
        }
    }
}

/// Refuse a new unapproved child when the base already has `limit` children.
pub fn check_branch_limit(child_count: i64, limit: i64) -> Result<(), CoreError> {
    if child_count >= limit {
        return Err(CoreError::PolicyViolation(format!(
            "Revision already has {child_count} branches (limit {limit}); \
             resolve pending branches before editing"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transition table
// ---------------------------------------------------------------------------

/// What an intent does to the revision tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Nothing is written.
    Unchanged,
    /// Only the base revision's status changes.
    Restatus {
        status: ModerationStatus,
        /// Stamp moderator and moderation time.
        stamp: bool,
        /// Replace the base comment with the submitted one when non-empty.
        replace_comment: bool,
        /// Revert live records to the base, coming from the latest approved.
        publish: bool,
    },
    /// Persist the submitted data and create a new child of the base.
    Branch(BranchPlan),
}

/// Plan for a new child revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BranchPlan {
    pub op_kind: OpKind,
    pub status: ModerationStatus,
    /// Demote a pending base to draft (stamped) before branching.
    pub demote_base: bool,
    /// Restore live records from the latest approved revision afterwards.
    pub restore_published: bool,
    pub enforce_branch_limit: bool,
    pub comment_override: Option<&'static str>,
}

impl BranchPlan {
    fn change(status: ModerationStatus) -> Self {
        let unapproved = status != ModerationStatus::Approved;
        Self {
            op_kind: OpKind::Change,
            status,
            demote_base: false,
            restore_published: unapproved,
            enforce_branch_limit: unapproved,
            comment_override: None,
        }
    }

    fn demoting_base(mut self, base_status: ModerationStatus) -> Self {
        self.demote_base = base_status == ModerationStatus::NeedAttention;
        self
    }

    /// New revisions created directly in Approved status are stamped.
    pub fn stamps_child(&self) -> bool {
        self.status == ModerationStatus::Approved
    }
}

impl Transition {
    pub fn creates_revision(&self) -> bool {
        matches!(self, Self::Branch(_))
    }
}

/// Decide what `intent` does for a base revision in `base_status`.
///
/// Errors: `PolicyViolation` when the role may not perform the intent,
/// `Conflict` when the base status does not admit it. Guards that need the
/// revision tree (deleted bases, already recovered records) and the branch
/// limit are checked by the engine.
pub fn plan_transition(
    intent: Intent,
    base_status: ModerationStatus,
    role: ModerationRole,
    changed: bool,
) -> Result<Transition, CoreError> {
    use ModerationStatus::*;

    authorize(intent, role)?;
    let is_admin = role == ModerationRole::ContentAdmin;

    let transition = match intent {
        Intent::ToApprove => match (base_status, changed) {
            (Approved, false) => Transition::Unchanged,
            (Rejected, _) | (_, true) => {
                Transition::Branch(BranchPlan::change(NeedAttention).demoting_base(base_status))
            }
            (Draft | NeedAttention, false) => Transition::Restatus {
                status: NeedAttention,
                stamp: false,
                replace_comment: false,
                publish: false,
            },
        },

        Intent::Save if is_admin => Transition::Branch(BranchPlan::change(Approved)),
        Intent::Save | Intent::SaveToHistory => {
            if changed {
                Transition::Branch(BranchPlan::change(Draft))
            } else {
                Transition::Unchanged
            }
        }

        Intent::Approve => {
            require_pending(intent, base_status)?;
            if changed {
                Transition::Branch(BranchPlan::change(Approved).demoting_base(base_status))
            } else {
                Transition::Restatus {
                    status: Approved,
                    stamp: true,
                    replace_comment: false,
                    publish: true,
                }
            }
        }

        Intent::Reject => {
            require_pending(intent, base_status)?;
            Transition::Restatus {
                status: Rejected,
                stamp: true,
                replace_comment: true,
                publish: false,
            }
        }

        Intent::Recover => Transition::Branch(BranchPlan {
            op_kind: OpKind::Recover,
            comment_override: Some(RECOVER_COMMENT),
            ..BranchPlan::change(Approved)
        }),
    };
    Ok(transition)
}

fn authorize(intent: Intent, role: ModerationRole) -> Result<(), CoreError> {
    let allowed = match role {
        ModerationRole::ContentAdmin => true,
        ModerationRole::ContentManager => !intent.requires_admin(),
        ModerationRole::Viewer => false,
    };
    if allowed {
        Ok(())
    } else {
        Err(CoreError::PolicyViolation(format!(
            "Role '{}' may not {}",
            role.as_str(),
            intent.as_str().replace('_', " ")
        )))
    }
}

fn require_pending(intent: Intent, base_status: ModerationStatus) -> Result<(), CoreError> {
    if base_status != ModerationStatus::NeedAttention {
        return Err(CoreError::Conflict(format!(
            "Cannot {intent} a revision in status {}",
            base_status.label()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use ModerationRole::*;
    use ModerationStatus::*;

    const STATUSES: [ModerationStatus; 4] = [Draft, NeedAttention, Approved, Rejected];

    fn branch(result: Result<Transition, CoreError>) -> BranchPlan {
        match result.unwrap() {
            Transition::Branch(plan) => plan,
            other => panic!("expected a branch, got {other:?}"),
        }
    }

    // -- branch limit --------------------------------------------------------

    #[test]
    fn branch_info_from_child_count() {
        assert_eq!(
            BranchInfo::from_child_count(0, 10),
            BranchInfo {
                has_children: false,
                can_branch: true
            }
        );
        assert!(BranchInfo::from_child_count(9, 10).can_branch);
        assert!(!BranchInfo::from_child_count(10, 10).can_branch);
    }

    #[test]
    fn branch_limit_is_a_policy_violation() {
        assert!(check_branch_limit(9, DEFAULT_BRANCH_LIMIT).is_ok());
        assert_matches!(
            check_branch_limit(10, DEFAULT_BRANCH_LIMIT),
            Err(CoreError::PolicyViolation(_))
        );
    }

    // -- roles ---------------------------------------------------------------

    #[test]
    fn viewers_are_refused_everything() {
        for intent in Intent::ALL {
            for status in STATUSES {
                for changed in [true, false] {
                    assert_matches!(
                        plan_transition(intent, status, Viewer, changed),
                        Err(CoreError::PolicyViolation(_))
                    );
                }
            }
        }
    }

    #[test]
    fn managers_cannot_moderate_or_recover() {
        for intent in [Intent::Approve, Intent::Reject, Intent::Recover] {
            assert_matches!(
                plan_transition(intent, NeedAttention, ContentManager, true),
                Err(CoreError::PolicyViolation(msg)) if msg.contains("content_manager")
            );
        }
    }

    // -- to approve ----------------------------------------------------------

    #[test]
    fn to_approve_with_changes_branches_pending() {
        for role in [ContentManager, ContentAdmin] {
            for status in STATUSES {
                let plan = branch(plan_transition(Intent::ToApprove, status, role, true));
                assert_eq!(plan.status, NeedAttention);
                assert_eq!(plan.op_kind, OpKind::Change);
                assert!(plan.enforce_branch_limit);
                assert!(plan.restore_published);
                assert_eq!(plan.demote_base, status == NeedAttention);
            }
        }
    }

    #[test]
    fn to_approve_without_changes() {
        for status in [Draft, NeedAttention] {
            assert_eq!(
                plan_transition(Intent::ToApprove, status, ContentManager, false).unwrap(),
                Transition::Restatus {
                    status: NeedAttention,
                    stamp: false,
                    replace_comment: false,
                    publish: false,
                }
            );
        }
        // Resubmitting a rejected revision always creates a new child.
        let plan = branch(plan_transition(Intent::ToApprove, Rejected, ContentManager, false));
        assert_eq!(plan.status, NeedAttention);
        assert!(!plan.demote_base);

        assert_eq!(
            plan_transition(Intent::ToApprove, Approved, ContentManager, false).unwrap(),
            Transition::Unchanged
        );
    }

    // -- save ----------------------------------------------------------------

    #[test]
    fn admin_save_publishes_even_without_changes() {
        for changed in [true, false] {
            let plan = branch(plan_transition(Intent::Save, Draft, ContentAdmin, changed));
            assert_eq!(plan.status, Approved);
            assert!(plan.stamps_child());
            assert!(!plan.restore_published);
            assert!(!plan.enforce_branch_limit);
        }
    }

    #[test]
    fn manager_save_and_save_to_history_branch_drafts() {
        for intent in [Intent::Save, Intent::SaveToHistory] {
            let plan = branch(plan_transition(intent, Approved, ContentManager, true));
            assert_eq!(plan.status, Draft);
            assert!(!plan.stamps_child());
            assert!(plan.restore_published);
            assert!(plan.enforce_branch_limit);

            assert_eq!(
                plan_transition(intent, Approved, ContentManager, false).unwrap(),
                Transition::Unchanged
            );
        }
    }

    #[test]
    fn admin_save_to_history_is_still_a_draft() {
        let plan = branch(plan_transition(Intent::SaveToHistory, Approved, ContentAdmin, true));
        assert_eq!(plan.status, Draft);
        assert_eq!(
            plan_transition(Intent::SaveToHistory, Approved, ContentAdmin, false).unwrap(),
            Transition::Unchanged
        );
    }

    // -- approve / reject ----------------------------------------------------

    #[test]
    fn approve_requires_pending_base() {
        for status in [Draft, Approved, Rejected] {
            for intent in [Intent::Approve, Intent::Reject] {
                assert_matches!(
                    plan_transition(intent, status, ContentAdmin, false),
                    Err(CoreError::Conflict(_))
                );
            }
        }
    }

    #[test]
    fn approve_unchanged_publishes_base() {
        assert_eq!(
            plan_transition(Intent::Approve, NeedAttention, ContentAdmin, false).unwrap(),
            Transition::Restatus {
                status: Approved,
                stamp: true,
                replace_comment: false,
                publish: true,
            }
        );
    }

    #[test]
    fn approve_changed_demotes_base_and_branches_approved() {
        let plan = branch(plan_transition(Intent::Approve, NeedAttention, ContentAdmin, true));
        assert!(plan.demote_base);
        assert_eq!(plan.status, Approved);
        assert!(!plan.restore_published);
    }

    #[test]
    fn reject_is_status_only() {
        for changed in [true, false] {
            let transition =
                plan_transition(Intent::Reject, NeedAttention, ContentAdmin, changed).unwrap();
            assert!(!transition.creates_revision());
            assert_matches!(
                transition,
                Transition::Restatus {
                    status: Rejected,
                    stamp: true,
                    replace_comment: true,
                    publish: false
                }
            );
        }
    }

    // -- recover -------------------------------------------------------------

    #[test]
    fn recover_branches_approved_recover_revision() {
        for changed in [true, false] {
            let plan = branch(plan_transition(Intent::Recover, Approved, ContentAdmin, changed));
            assert_eq!(plan.op_kind, OpKind::Recover);
            assert_eq!(plan.status, Approved);
            assert_eq!(plan.comment_override, Some(RECOVER_COMMENT));
            assert!(!plan.enforce_branch_limit);
        }
    }

    #[test]
    fn intent_names() {
        assert_eq!(Intent::SaveToHistory.to_string(), "save_to_history");
        assert!(Intent::Recover.requires_admin());
        assert!(!Intent::ToApprove.requires_admin());
    }
}
