use std::collections::HashMap;

use tokio::sync::RwLock;

use reqflow_core::domain::requisition::{Requisition, RequisitionId};
use reqflow_core::repository::{RepositoryError, RequisitionFilter, WorkflowRepository};

/// Map-backed repository with the same version-check contract as the SQL
/// implementation. Useful for tests and wiring without a database.
#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    requisitions: RwLock<HashMap<String, Requisition>>,
}

#[async_trait::async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn create(&self, requisition: Requisition) -> Result<(), RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        requisitions.insert(requisition.id.0.clone(), requisition);
        Ok(())
    }

    async fn load(&self, id: &RequisitionId) -> Result<Requisition, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        requisitions.get(&id.0).cloned().ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn save(&self, mut requisition: Requisition) -> Result<Requisition, RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        let stored = requisitions
            .get(&requisition.id.0)
            .ok_or_else(|| RepositoryError::NotFound(requisition.id.clone()))?;
        if stored.version != requisition.version {
            return Err(RepositoryError::Conflict(requisition.id.clone()));
        }
        requisition.version += 1;
        requisitions.insert(requisition.id.0.clone(), requisition.clone());
        Ok(requisition)
    }

    async fn delete(&self, id: &RequisitionId) -> Result<(), RepositoryError> {
        let mut requisitions = self.requisitions.write().await;
        requisitions
            .remove(&id.0)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(id.clone()))
    }

    async fn list_by_organization(
        &self,
        organization_id: &str,
        filter: RequisitionFilter,
    ) -> Result<Vec<Requisition>, RepositoryError> {
        let requisitions = self.requisitions.read().await;
        let mut matching: Vec<Requisition> = requisitions
            .values()
            .filter(|requisition| requisition.organization_id == organization_id)
            .filter(|requisition| {
                filter.status.map_or(true, |status| requisition.status == status)
            })
            .filter(|requisition| {
                filter
                    .requester_id
                    .as_deref()
                    .map_or(true, |requester| requisition.requester_id == requester)
            })
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }
}
