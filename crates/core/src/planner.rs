//! Turns a monetary budget into an ordered approval plan.
//!
//! Two interchangeable strategies exist: [`TieredPolicy`] maps the budget
//! into exactly one range with a fixed step list, [`ThresholdStackingPolicy`]
//! stacks one step per crossed threshold. Both are pure; the caller is
//! responsible for validating the budget before planning.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::requisition::{
    RequisitionId, RequisitionStatus, StepAction, StepId, WorkflowStep,
};

pub const AUTO_APPROVAL_LABEL: &str = "automatic approval";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequiredStep {
    pub reviewer_level: u8,
    pub reviewer_name: String,
}

pub trait ApprovalPolicy: Send + Sync {
    /// Budget is assumed validated (non-negative) by the caller.
    fn plan(&self, budget: Decimal) -> Vec<RequiredStep>;
}

/// One budget range of a [`TieredPolicy`]. A tier covers `[lower, upper)`
/// where `lower` is the previous tier's `upper` (zero for the first tier)
/// and `upper = None` marks the final unbounded tier, so the tiers always
/// partition the budget axis.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BudgetTier {
    pub upper: Option<Decimal>,
    pub steps: Vec<RequiredStep>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TieredPolicy {
    tiers: Vec<BudgetTier>,
}

impl TieredPolicy {
    /// Tiers are sorted by upper bound, unbounded tier last. Bound
    /// validation (strictly increasing, exactly one unbounded tier) happens
    /// in the configuration layer.
    pub fn new(mut tiers: Vec<BudgetTier>) -> Self {
        tiers.sort_by(|a, b| match (a.upper, b.upper) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => std::cmp::Ordering::Less,
            (None, Some(_)) => std::cmp::Ordering::Greater,
            (None, None) => std::cmp::Ordering::Equal,
        });
        Self { tiers }
    }

    pub fn tiers(&self) -> &[BudgetTier] {
        &self.tiers
    }
}

impl ApprovalPolicy for TieredPolicy {
    fn plan(&self, budget: Decimal) -> Vec<RequiredStep> {
        self.tiers
            .iter()
            .find(|tier| tier.upper.map_or(true, |upper| budget < upper))
            .map(|tier| tier.steps.clone())
            .unwrap_or_default()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackingThreshold {
    /// Inclusive: a budget greater than or equal to this adds the step.
    pub minimum: Decimal,
    pub reviewer_level: u8,
    pub reviewer_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdStackingPolicy {
    thresholds: Vec<StackingThreshold>,
}

impl ThresholdStackingPolicy {
    pub fn new(mut thresholds: Vec<StackingThreshold>) -> Self {
        // Output order is ascending reviewer level; duplicates are rejected
        // at configuration time.
        thresholds.sort_by_key(|threshold| threshold.reviewer_level);
        Self { thresholds }
    }

    pub fn thresholds(&self) -> &[StackingThreshold] {
        &self.thresholds
    }
}

impl ApprovalPolicy for ThresholdStackingPolicy {
    fn plan(&self, budget: Decimal) -> Vec<RequiredStep> {
        self.thresholds
            .iter()
            .filter(|threshold| budget >= threshold.minimum)
            .map(|threshold| RequiredStep {
                reviewer_level: threshold.reviewer_level,
                reviewer_name: threshold.reviewer_name.clone(),
            })
            .collect()
    }
}

/// Materializes a plan into concrete workflow steps plus the requisition's
/// initial status. An empty plan yields a single synthetic step already
/// marked approved, and the requisition starts out approved rather than
/// submitted.
pub fn materialize_steps(
    requisition_id: &RequisitionId,
    plan: &[RequiredStep],
    now: DateTime<Utc>,
) -> (Vec<WorkflowStep>, RequisitionStatus, Option<DateTime<Utc>>) {
    if plan.is_empty() {
        let synthetic = WorkflowStep {
            id: StepId::generate(),
            requisition_id: requisition_id.clone(),
            position: 0,
            reviewer_level: 0,
            reviewer_name: AUTO_APPROVAL_LABEL.to_string(),
            action: StepAction::Approved,
            comment: None,
            acted_by_id: None,
            acted_by_name: None,
            is_required: true,
            is_completed: true,
            completed_at: Some(now),
        };
        return (vec![synthetic], RequisitionStatus::Approved, Some(now));
    }

    let steps = plan
        .iter()
        .enumerate()
        .map(|(position, required)| WorkflowStep {
            id: StepId::generate(),
            requisition_id: requisition_id.clone(),
            position: position as u32,
            reviewer_level: required.reviewer_level,
            reviewer_name: required.reviewer_name.clone(),
            action: StepAction::Pending,
            comment: None,
            acted_by_id: None,
            acted_by_name: None,
            is_required: true,
            is_completed: false,
            completed_at: None,
        })
        .collect();

    (steps, RequisitionStatus::Submitted, None)
}
