pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod lifecycle;
pub mod notify;
pub mod planner;
pub mod repository;
pub mod service;
pub mod state_machine;

pub use audit::{AuditEvent, AuditOutcome, AuditSink, InMemoryAuditSink};
pub use config::{
    ConfigError, DatabaseConfig, PolicyConfig, StrategyConfig, WorkflowConfig,
};
pub use domain::requisition::{
    Actor, NewRequisition, Requisition, RequisitionId, RequisitionStatus, StepAction, StepId,
    WorkflowStep,
};
pub use errors::{DomainError, EngineError, SideEffectError};
pub use lifecycle::{ReviewAction, ReviewOutcome, SideEffect};
pub use notify::{
    InMemoryNotificationSink, Notification, NotificationKind, NotificationPriority,
    NotificationSink,
};
pub use planner::{
    ApprovalPolicy, BudgetTier, RequiredStep, StackingThreshold, ThresholdStackingPolicy,
    TieredPolicy,
};
pub use repository::{RepositoryError, RequisitionFilter, WorkflowRepository};
pub use service::{ActionableSummary, WorkflowService};
pub use state_machine::{
    actionable_step, authorize, CapabilityResolver, LevelCapabilityResolver,
};
