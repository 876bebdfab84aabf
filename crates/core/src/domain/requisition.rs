use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequisitionId(pub String);

impl RequisitionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for RequisitionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequisitionStatus {
    Submitted,
    InReview,
    Approved,
    Rejected,
}

impl RequisitionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepAction {
    Pending,
    Approved,
    Rejected,
    RequestedInfo,
}

/// An authenticated user as resolved by the surrounding platform. The engine
/// only cares about the reviewer level; identity fields are carried through
/// to the step record and the audit trail.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: String,
    pub name: String,
    pub level: u8,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowStep {
    pub id: StepId,
    pub requisition_id: RequisitionId,
    /// Zero-based approval order. Load-bearing: steps are acted on strictly
    /// in ascending position and must never be reordered after creation.
    pub position: u32,
    pub reviewer_level: u8,
    pub reviewer_name: String,
    pub action: StepAction,
    pub comment: Option<String>,
    pub acted_by_id: Option<String>,
    pub acted_by_name: Option<String>,
    pub is_required: bool,
    pub is_completed: bool,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Requisition {
    pub id: RequisitionId,
    pub organization_id: String,
    pub requester_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub justification: String,
    pub budget: Decimal,
    pub status: RequisitionStatus,
    /// Present iff `status == Approved`.
    pub approved_at: Option<DateTime<Utc>>,
    pub steps: Vec<WorkflowStep>,
    /// Optimistic concurrency token, bumped by the repository on every save.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Requisition {
    pub fn remaining_steps(&self) -> usize {
        self.steps.iter().filter(|step| !step.is_completed).count()
    }

    pub fn completed_steps(&self) -> usize {
        self.steps.len() - self.remaining_steps()
    }
}

/// Caller-supplied fields for a new requisition; everything else (id, plan,
/// status, timestamps) is derived at creation time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewRequisition {
    pub organization_id: String,
    pub requester_id: String,
    pub title: String,
    pub description: String,
    pub category: String,
    pub priority: String,
    pub justification: String,
    pub budget: Decimal,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use rust_decimal::Decimal;

    use super::{
        Requisition, RequisitionId, RequisitionStatus, StepAction, StepId, WorkflowStep,
    };

    fn step(position: u32, completed: bool) -> WorkflowStep {
        WorkflowStep {
            id: StepId::generate(),
            requisition_id: RequisitionId("r-1".to_string()),
            position,
            reviewer_level: 6,
            reviewer_name: "Finance".to_string(),
            action: if completed { StepAction::Approved } else { StepAction::Pending },
            comment: None,
            acted_by_id: None,
            acted_by_name: None,
            is_required: true,
            is_completed: completed,
            completed_at: completed.then(Utc::now),
        }
    }

    #[test]
    fn counts_remaining_and_completed_steps() {
        let requisition = Requisition {
            id: RequisitionId("r-1".to_string()),
            organization_id: "org-1".to_string(),
            requester_id: "u-1".to_string(),
            title: "Laptops".to_string(),
            description: String::new(),
            category: "it".to_string(),
            priority: "normal".to_string(),
            justification: String::new(),
            budget: Decimal::new(600_000, 2),
            status: RequisitionStatus::InReview,
            approved_at: None,
            steps: vec![step(0, true), step(1, false), step(2, false)],
            version: 0,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        assert_eq!(requisition.remaining_steps(), 2);
        assert_eq!(requisition.completed_steps(), 1);
    }

    #[test]
    fn terminal_statuses() {
        assert!(RequisitionStatus::Approved.is_terminal());
        assert!(RequisitionStatus::Rejected.is_terminal());
        assert!(!RequisitionStatus::Submitted.is_terminal());
        assert!(!RequisitionStatus::InReview.is_terminal());
    }
}
