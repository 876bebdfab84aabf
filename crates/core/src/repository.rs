use async_trait::async_trait;
use thiserror::Error;

use crate::domain::requisition::{Requisition, RequisitionId, RequisitionStatus};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("requisition `{0}` not found")]
    NotFound(RequisitionId),
    #[error("version conflict for requisition `{0}`")]
    Conflict(RequisitionId),
    #[error("storage failure: {0}")]
    Storage(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequisitionFilter {
    pub status: Option<RequisitionStatus>,
    pub requester_id: Option<String>,
}

/// Persistence contract for requisitions and their steps.
///
/// Implementations must provide read-modify-write atomicity per
/// requisition: `save` compares the stored version against
/// `requisition.version` inside one transaction, rewrites the step list,
/// and returns the record with the version bumped. A mismatch is a
/// [`RepositoryError::Conflict`], which the caller may resolve by reloading
/// and retrying.
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn create(&self, requisition: Requisition) -> Result<(), RepositoryError>;

    async fn load(&self, id: &RequisitionId) -> Result<Requisition, RepositoryError>;

    async fn save(&self, requisition: Requisition) -> Result<Requisition, RepositoryError>;

    /// Deletes the requisition and all of its steps.
    async fn delete(&self, id: &RequisitionId) -> Result<(), RepositoryError>;

    async fn list_by_organization(
        &self,
        organization_id: &str,
        filter: RequisitionFilter,
    ) -> Result<Vec<Requisition>, RepositoryError>;
}
