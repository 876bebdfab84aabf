//! Orchestrates the exposed operations end to end: validate, plan, run the
//! lifecycle inside the repository's atomic boundary, then dispatch side
//! effects best-effort.

use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::audit::{AuditEvent, AuditOutcome, AuditSink};
use crate::domain::requisition::{
    Actor, NewRequisition, Requisition, RequisitionId, RequisitionStatus,
};
use crate::errors::{DomainError, EngineError};
use crate::lifecycle::{self, ReviewAction, SideEffect};
use crate::notify::NotificationSink;
use crate::planner::{materialize_steps, ApprovalPolicy};
use crate::repository::{RequisitionFilter, WorkflowRepository};
use crate::state_machine::{self, CapabilityResolver};

/// One pending requisition awaiting the calling actor, as returned by
/// [`WorkflowService::list_pending_for`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ActionableSummary {
    pub requisition_id: RequisitionId,
    pub title: String,
    pub budget: Decimal,
    pub status: RequisitionStatus,
    pub step_position: u32,
    pub reviewer_level: u8,
    pub reviewer_name: String,
}

pub struct WorkflowService<R, C, N, A> {
    repository: R,
    capabilities: C,
    notifications: N,
    audit: A,
}

impl<R, C, N, A> WorkflowService<R, C, N, A>
where
    R: WorkflowRepository,
    C: CapabilityResolver,
    N: NotificationSink,
    A: AuditSink,
{
    pub fn new(repository: R, capabilities: C, notifications: N, audit: A) -> Self {
        Self { repository, capabilities, notifications, audit }
    }

    /// Plans the approval steps for the given budget and persists the new
    /// requisition. An empty plan means immediate approval.
    pub async fn create_requisition(
        &self,
        data: NewRequisition,
        policy: &dyn ApprovalPolicy,
    ) -> Result<Requisition, EngineError> {
        validate_new(&data)?;

        let now = Utc::now();
        let id = RequisitionId::generate();
        let plan = policy.plan(data.budget);
        let (steps, status, approved_at) = materialize_steps(&id, &plan, now);

        let requisition = Requisition {
            id: id.clone(),
            organization_id: data.organization_id,
            requester_id: data.requester_id,
            title: data.title,
            description: data.description,
            category: data.category,
            priority: data.priority,
            justification: data.justification,
            budget: data.budget,
            status,
            approved_at,
            steps,
            version: 0,
            created_at: now,
            updated_at: now,
        };
        self.repository.create(requisition.clone()).await?;

        self.dispatch(vec![SideEffect::Audit(
            AuditEvent::new(
                Some(id),
                "requisition.created",
                requisition.requester_id.clone(),
                AuditOutcome::Success,
                format!("created `{}`", requisition.title),
            )
            .with_metadata("budget", requisition.budget.to_string())
            .with_metadata("planned_steps", requisition.steps.len().to_string())
            .with_metadata("status", format!("{status:?}")),
        )]);

        Ok(requisition)
    }

    /// Applies a reviewer action to the requisition's actionable step. The
    /// persisted transition commits before any notification goes out; a
    /// failed side effect is logged and never rolls the action back.
    pub async fn act(
        &self,
        id: &RequisitionId,
        actor: &Actor,
        action: ReviewAction,
        comment: Option<String>,
    ) -> Result<Requisition, EngineError> {
        let mut requisition = self.repository.load(id).await?;
        let outcome = lifecycle::apply(
            &mut requisition,
            action,
            actor,
            comment,
            &self.capabilities,
            Utc::now(),
        )?;
        let requisition = self.repository.save(requisition).await?;
        self.dispatch(outcome.side_effects);
        Ok(requisition)
    }

    /// Requisitions in the organization whose actionable step is waiting on
    /// this actor's level. The top authority sees every actionable step.
    pub async fn list_pending_for(
        &self,
        actor: &Actor,
        organization_id: &str,
    ) -> Result<Vec<ActionableSummary>, EngineError> {
        if !self.capabilities.can_access_requisitions(actor.level) {
            return Err(DomainError::AccessDenied { level: actor.level }.into());
        }

        let requisitions = self
            .repository
            .list_by_organization(organization_id, RequisitionFilter::default())
            .await?;

        let is_top = self.capabilities.is_top_authority(actor.level);
        let summaries = requisitions
            .into_iter()
            .filter(|requisition| !requisition.status.is_terminal())
            .filter_map(|requisition| {
                let step = state_machine::actionable_step(&requisition.steps)?;
                if !is_top && step.reviewer_level != actor.level {
                    return None;
                }
                Some(ActionableSummary {
                    requisition_id: requisition.id.clone(),
                    title: requisition.title.clone(),
                    budget: requisition.budget,
                    status: requisition.status,
                    step_position: step.position,
                    reviewer_level: step.reviewer_level,
                    reviewer_name: step.reviewer_name.clone(),
                })
            })
            .collect();

        Ok(summaries)
    }

    /// Replaces the approval plan after a budget change. Destructive by
    /// design: completed approvals are discarded and the requisition goes
    /// back to the start of the flow. The audit entry records how many
    /// completed approvals were lost.
    pub async fn update_budget(
        &self,
        id: &RequisitionId,
        actor: &Actor,
        new_budget: Decimal,
        policy: &dyn ApprovalPolicy,
    ) -> Result<Requisition, EngineError> {
        if new_budget < Decimal::ZERO {
            return Err(EngineError::Validation("budget must be non-negative".to_string()));
        }

        let mut requisition = self.repository.load(id).await?;
        let discarded = requisition.completed_steps();
        let previous_budget = requisition.budget;

        let now = Utc::now();
        let plan = policy.plan(new_budget);
        let (steps, status, approved_at) = materialize_steps(&requisition.id, &plan, now);
        requisition.budget = new_budget;
        requisition.steps = steps;
        requisition.status = status;
        requisition.approved_at = approved_at;
        requisition.updated_at = now;

        let requisition = self.repository.save(requisition).await?;

        self.dispatch(vec![SideEffect::Audit(
            AuditEvent::new(
                Some(requisition.id.clone()),
                "requisition.plan_regenerated",
                actor.id.clone(),
                AuditOutcome::Success,
                format!("budget changed from {previous_budget} to {new_budget}"),
            )
            .with_metadata("previous_budget", previous_budget.to_string())
            .with_metadata("new_budget", new_budget.to_string())
            .with_metadata("discarded_completed_steps", discarded.to_string())
            .with_metadata("status", format!("{status:?}")),
        )]);

        Ok(requisition)
    }

    /// Deletes the requisition and its steps. Approved requisitions are
    /// protected unless the actor carries the administrative override.
    pub async fn delete_requisition(
        &self,
        id: &RequisitionId,
        actor: &Actor,
    ) -> Result<(), EngineError> {
        let requisition = self.repository.load(id).await?;
        if !lifecycle::can_delete(&requisition, actor, &self.capabilities) {
            return Err(DomainError::DeleteForbidden { id: requisition.id }.into());
        }

        self.repository.delete(id).await?;

        self.dispatch(vec![SideEffect::Audit(
            AuditEvent::new(
                Some(id.clone()),
                "requisition.deleted",
                actor.id.clone(),
                AuditOutcome::Success,
                format!("deleted `{}`", requisition.title),
            )
            .with_metadata("status", format!("{:?}", requisition.status)),
        )]);

        Ok(())
    }

    fn dispatch(&self, side_effects: Vec<SideEffect>) {
        for side_effect in side_effects {
            let result = match side_effect {
                SideEffect::Notify(notification) => self.notifications.notify(notification),
                SideEffect::Audit(event) => self.audit.record(event),
            };
            if let Err(error) = result {
                warn!(%error, "side effect dispatch failed");
            }
        }
    }
}

fn validate_new(data: &NewRequisition) -> Result<(), EngineError> {
    // `Decimal` cannot encode NaN or infinity, so non-negativity is the
    // whole budget check.
    if data.budget < Decimal::ZERO {
        return Err(EngineError::Validation("budget must be non-negative".to_string()));
    }
    for (field, value) in [
        ("title", &data.title),
        ("organization_id", &data.organization_id),
        ("requester_id", &data.requester_id),
    ] {
        if value.trim().is_empty() {
            return Err(EngineError::Validation(format!("{field} is required")));
        }
    }
    Ok(())
}
