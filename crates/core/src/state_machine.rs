//! Single source of truth for "which step is actionable and who may act".
//!
//! Both the read path (listing pending work) and the write path (applying an
//! action) go through [`actionable_step`] and [`authorize`], so ordering
//! cannot drift between the two.

use std::collections::BTreeSet;

use crate::domain::requisition::{Actor, StepAction, WorkflowStep};
use crate::errors::DomainError;

/// Capability checks resolved by the surrounding platform (role tables,
/// tenancy rules). Injected so the engine stays free of any user store.
pub trait CapabilityResolver: Send + Sync {
    fn can_access_requisitions(&self, level: u8) -> bool;
    fn can_approve_at_level(&self, actor_level: u8, step_level: u8) -> bool;
    /// The top authority may act on the current actionable step regardless
    /// of its assigned level. This is an escalation override, not a bypass
    /// of ordering.
    fn is_top_authority(&self, level: u8) -> bool;
    /// Gates deletion of already-approved requisitions.
    fn has_admin_override(&self, level: u8) -> bool;
}

/// Level-set backed resolver derived from the policy configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LevelCapabilityResolver {
    approver_levels: BTreeSet<u8>,
    top_level: u8,
}

impl LevelCapabilityResolver {
    pub fn new(approver_levels: impl IntoIterator<Item = u8>, top_level: u8) -> Self {
        let mut approver_levels: BTreeSet<u8> = approver_levels.into_iter().collect();
        approver_levels.insert(top_level);
        Self { approver_levels, top_level }
    }
}

impl CapabilityResolver for LevelCapabilityResolver {
    fn can_access_requisitions(&self, level: u8) -> bool {
        self.approver_levels.contains(&level)
    }

    fn can_approve_at_level(&self, actor_level: u8, step_level: u8) -> bool {
        actor_level == step_level || self.is_top_authority(actor_level)
    }

    fn is_top_authority(&self, level: u8) -> bool {
        level == self.top_level
    }

    fn has_admin_override(&self, level: u8) -> bool {
        level == self.top_level
    }
}

/// First incomplete step in stored order, if any. The `Pending` check is
/// defensive: a step can only be incomplete and non-pending if storage was
/// corrupted, and acting on it would double-apply a decision.
pub fn actionable_step(steps: &[WorkflowStep]) -> Option<&WorkflowStep> {
    let step = steps.iter().find(|step| !step.is_completed)?;
    if step.action != StepAction::Pending {
        return None;
    }
    Some(step)
}

/// Validates that `actor` may act on `step`. The top-authority override is
/// the only rule that relaxes the level match; it still applies only to the
/// step the caller located via [`actionable_step`], so no step is skipped.
pub fn authorize<C>(resolver: &C, actor: &Actor, step: &WorkflowStep) -> Result<(), DomainError>
where
    C: CapabilityResolver + ?Sized,
{
    if !resolver.can_access_requisitions(actor.level) {
        return Err(DomainError::AccessDenied { level: actor.level });
    }

    if resolver.is_top_authority(actor.level) {
        return Ok(());
    }

    if actor.level == step.reviewer_level
        && resolver.can_approve_at_level(actor.level, step.reviewer_level)
    {
        return Ok(());
    }

    Err(DomainError::WrongReviewerLevel {
        actor_level: actor.level,
        required_level: step.reviewer_level,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use crate::domain::requisition::{
        Actor, RequisitionId, StepAction, StepId, WorkflowStep,
    };
    use crate::errors::DomainError;

    use super::{actionable_step, authorize, LevelCapabilityResolver};

    fn step(position: u32, level: u8, action: StepAction, completed: bool) -> WorkflowStep {
        WorkflowStep {
            id: StepId::generate(),
            requisition_id: RequisitionId("r-1".to_string()),
            position,
            reviewer_level: level,
            reviewer_name: format!("level-{level}"),
            action,
            comment: None,
            acted_by_id: None,
            acted_by_name: None,
            is_required: true,
            is_completed: completed,
            completed_at: completed.then(Utc::now),
        }
    }

    fn actor(level: u8) -> Actor {
        Actor { id: format!("u-{level}"), name: format!("user-{level}"), level }
    }

    fn resolver() -> LevelCapabilityResolver {
        LevelCapabilityResolver::new([6, 7], 10)
    }

    #[test]
    fn first_incomplete_step_is_actionable() {
        let steps = vec![
            step(0, 6, StepAction::Approved, true),
            step(1, 7, StepAction::Pending, false),
            step(2, 10, StepAction::Pending, false),
        ];

        let actionable = actionable_step(&steps).expect("step 1 should be actionable");
        assert_eq!(actionable.position, 1);
    }

    #[test]
    fn no_actionable_step_when_all_completed() {
        let steps = vec![
            step(0, 6, StepAction::Approved, true),
            step(1, 7, StepAction::Rejected, true),
        ];
        assert!(actionable_step(&steps).is_none());
    }

    #[test]
    fn incomplete_non_pending_step_is_not_actionable() {
        // Defensive: should not occur with an intact store.
        let steps = vec![step(0, 6, StepAction::Approved, false)];
        assert!(actionable_step(&steps).is_none());
    }

    #[test]
    fn matching_level_is_authorized() {
        let step = step(0, 6, StepAction::Pending, false);
        authorize(&resolver(), &actor(6), &step).expect("level 6 acts on level-6 step");
    }

    #[test]
    fn wrong_level_is_rejected_with_both_levels() {
        let step = step(0, 6, StepAction::Pending, false);
        let error = authorize(&resolver(), &actor(7), &step).expect_err("level mismatch");
        assert_eq!(error, DomainError::WrongReviewerLevel { actor_level: 7, required_level: 6 });
    }

    #[test]
    fn top_authority_overrides_any_level() {
        let step = step(0, 6, StepAction::Pending, false);
        authorize(&resolver(), &actor(10), &step).expect("top authority override");
    }

    #[test]
    fn unknown_level_is_denied_access() {
        let step = step(0, 6, StepAction::Pending, false);
        let error = authorize(&resolver(), &actor(3), &step).expect_err("no capability");
        assert_eq!(error, DomainError::AccessDenied { level: 3 });
    }
}
