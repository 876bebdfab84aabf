//! Applies reviewer actions to a requisition and recomputes its status.
//!
//! This is the only code path allowed to mutate step state, `status`, or
//! `approved_at`. It performs no I/O: persistence and side-effect dispatch
//! are the caller's job, in that order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::audit::{AuditEvent, AuditOutcome};
use crate::domain::requisition::{
    Actor, Requisition, RequisitionStatus, StepAction,
};
use crate::errors::DomainError;
use crate::notify::{Notification, NotificationKind, NotificationPriority};
use crate::state_machine::{self, CapabilityResolver};

/// The decisions a reviewer can take on an actionable step. Deliberately
/// excludes `Pending` so "act with no action" is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
    Approved,
    Rejected,
    RequestedInfo,
}

impl ReviewAction {
    fn as_step_action(self) -> StepAction {
        match self {
            Self::Approved => StepAction::Approved,
            Self::Rejected => StepAction::Rejected,
            Self::RequestedInfo => StepAction::RequestedInfo,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::RequestedInfo => "requested_info",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SideEffect {
    Notify(Notification),
    Audit(AuditEvent),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ReviewOutcome {
    pub previous_status: RequisitionStatus,
    pub new_status: RequisitionStatus,
    pub acted_step_position: u32,
    pub side_effects: Vec<SideEffect>,
}

/// Applies `action` to the requisition's actionable step on behalf of
/// `actor`. Must run inside the repository's atomic boundary: the caller
/// loads, applies, then saves with a version check before dispatching the
/// returned side effects.
pub fn apply<C>(
    requisition: &mut Requisition,
    action: ReviewAction,
    actor: &Actor,
    comment: Option<String>,
    resolver: &C,
    now: DateTime<Utc>,
) -> Result<ReviewOutcome, DomainError>
where
    C: CapabilityResolver + ?Sized,
{
    if requisition.status.is_terminal() {
        return Err(DomainError::AlreadyResolved {
            id: requisition.id.clone(),
            status: requisition.status,
        });
    }

    let position = match state_machine::actionable_step(&requisition.steps) {
        Some(step) => {
            state_machine::authorize(resolver, actor, step)?;
            step.position
        }
        None => {
            return Err(DomainError::NoActionableStep { id: requisition.id.clone() });
        }
    };

    let step = requisition
        .steps
        .iter_mut()
        .find(|step| step.position == position)
        .ok_or_else(|| DomainError::NoActionableStep { id: requisition.id.clone() })?;
    step.action = action.as_step_action();
    step.comment = comment;
    step.acted_by_id = Some(actor.id.clone());
    step.acted_by_name = Some(actor.name.clone());
    step.is_completed = true;
    step.completed_at = Some(now);
    let step_level = step.reviewer_level;

    let remaining = requisition.remaining_steps();
    let previous_status = requisition.status;
    let new_status = match action {
        ReviewAction::Rejected => {
            requisition.approved_at = None;
            RequisitionStatus::Rejected
        }
        ReviewAction::Approved if remaining == 0 => {
            requisition.approved_at = Some(now);
            RequisitionStatus::Approved
        }
        ReviewAction::Approved => RequisitionStatus::InReview,
        ReviewAction::RequestedInfo => {
            requisition.approved_at = None;
            RequisitionStatus::InReview
        }
    };
    requisition.status = new_status;
    requisition.updated_at = now;

    let mut side_effects = Vec::new();
    if let Some(notification) =
        notification_for(requisition, action, actor, resolver, remaining, step_level)
    {
        side_effects.push(SideEffect::Notify(notification));
    }
    side_effects.push(SideEffect::Audit(
        AuditEvent::new(
            Some(requisition.id.clone()),
            "workflow.action_applied",
            actor.id.clone(),
            AuditOutcome::Success,
            format!("{} step {} of `{}`", action.as_str(), position, requisition.title),
        )
        .with_metadata("action", action.as_str())
        .with_metadata("step_position", position.to_string())
        .with_metadata("step_level", step_level.to_string())
        .with_metadata("status", format!("{new_status:?}"))
        .with_metadata("remaining_steps", remaining.to_string()),
    ));

    Ok(ReviewOutcome { previous_status, new_status, acted_step_position: position, side_effects })
}

fn notification_for<C>(
    requisition: &Requisition,
    action: ReviewAction,
    actor: &Actor,
    resolver: &C,
    remaining: usize,
    step_level: u8,
) -> Option<Notification>
where
    C: CapabilityResolver + ?Sized,
{
    let base = |kind, priority| {
        Notification::new(kind, requisition.requester_id.clone(), priority)
            .with_variable("requisition_id", requisition.id.to_string())
            .with_variable("title", requisition.title.clone())
            .with_variable("reviewer", actor.name.clone())
            .with_variable("step_level", step_level.to_string())
    };

    match action {
        ReviewAction::Approved if remaining == 0 => {
            Some(base(NotificationKind::FinalApproval, NotificationPriority::High))
        }
        // A mid-plan approval is only worth a ping when the top authority
        // stepped in; routine level approvals stay quiet.
        ReviewAction::Approved if resolver.is_top_authority(actor.level) => {
            Some(base(NotificationKind::ApprovalProgress, NotificationPriority::Normal))
        }
        ReviewAction::Approved => None,
        ReviewAction::Rejected => {
            Some(base(NotificationKind::Rejection, NotificationPriority::Normal))
        }
        ReviewAction::RequestedInfo => None,
    }
}

/// Deletion is allowed unless the requisition is already approved, in which
/// case only an administrative override may remove it.
pub fn can_delete<C>(requisition: &Requisition, actor: &Actor, resolver: &C) -> bool
where
    C: CapabilityResolver + ?Sized,
{
    requisition.status != RequisitionStatus::Approved || resolver.has_admin_override(actor.level)
}
