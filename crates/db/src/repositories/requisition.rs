use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::Row;

use reqflow_core::domain::requisition::{
    Requisition, RequisitionId, RequisitionStatus, StepAction, StepId, WorkflowStep,
};
use reqflow_core::repository::{RepositoryError, RequisitionFilter, WorkflowRepository};

use crate::DbPool;

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn storage(error: sqlx::Error) -> RepositoryError {
    RepositoryError::Storage(error.to_string())
}

fn decode(message: impl Into<String>) -> RepositoryError {
    RepositoryError::Storage(message.into())
}

pub fn status_as_str(status: RequisitionStatus) -> &'static str {
    match status {
        RequisitionStatus::Submitted => "submitted",
        RequisitionStatus::InReview => "in_review",
        RequisitionStatus::Approved => "approved",
        RequisitionStatus::Rejected => "rejected",
    }
}

fn parse_status(s: &str) -> Result<RequisitionStatus, RepositoryError> {
    match s {
        "submitted" => Ok(RequisitionStatus::Submitted),
        "in_review" => Ok(RequisitionStatus::InReview),
        "approved" => Ok(RequisitionStatus::Approved),
        "rejected" => Ok(RequisitionStatus::Rejected),
        other => Err(decode(format!("unknown requisition status `{other}`"))),
    }
}

pub fn action_as_str(action: StepAction) -> &'static str {
    match action {
        StepAction::Pending => "pending",
        StepAction::Approved => "approved",
        StepAction::Rejected => "rejected",
        StepAction::RequestedInfo => "requested_info",
    }
}

fn parse_action(s: &str) -> Result<StepAction, RepositoryError> {
    match s {
        "pending" => Ok(StepAction::Pending),
        "approved" => Ok(StepAction::Approved),
        "rejected" => Ok(StepAction::Rejected),
        "requested_info" => Ok(StepAction::RequestedInfo),
        other => Err(decode(format!("unknown step action `{other}`"))),
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| decode(format!("invalid timestamp `{raw}`: {e}")))
}

fn parse_optional_timestamp(
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    raw.map(|s| parse_timestamp(&s)).transpose()
}

fn row_to_requisition(row: &sqlx::sqlite::SqliteRow) -> Result<Requisition, RepositoryError> {
    let id: String = row.try_get("id").map_err(storage)?;
    let budget_str: String = row.try_get("budget").map_err(storage)?;
    let budget: Decimal = budget_str
        .parse()
        .map_err(|e| decode(format!("invalid budget `{budget_str}`: {e}")))?;
    let status_str: String = row.try_get("status").map_err(storage)?;
    let approved_at: Option<String> = row.try_get("approved_at").map_err(storage)?;
    let created_at: String = row.try_get("created_at").map_err(storage)?;
    let updated_at: String = row.try_get("updated_at").map_err(storage)?;

    Ok(Requisition {
        id: RequisitionId(id),
        organization_id: row.try_get("organization_id").map_err(storage)?,
        requester_id: row.try_get("requester_id").map_err(storage)?,
        title: row.try_get("title").map_err(storage)?,
        description: row.try_get("description").map_err(storage)?,
        category: row.try_get("category").map_err(storage)?,
        priority: row.try_get("priority").map_err(storage)?,
        justification: row.try_get("justification").map_err(storage)?,
        budget,
        status: parse_status(&status_str)?,
        approved_at: parse_optional_timestamp(approved_at)?,
        steps: Vec::new(),
        version: row.try_get("version").map_err(storage)?,
        created_at: parse_timestamp(&created_at)?,
        updated_at: parse_timestamp(&updated_at)?,
    })
}

fn row_to_step(row: &sqlx::sqlite::SqliteRow) -> Result<WorkflowStep, RepositoryError> {
    let action_str: String = row.try_get("action").map_err(storage)?;
    let completed_at: Option<String> = row.try_get("completed_at").map_err(storage)?;
    let position: i64 = row.try_get("position").map_err(storage)?;
    let reviewer_level: i64 = row.try_get("reviewer_level").map_err(storage)?;
    let is_required: i64 = row.try_get("is_required").map_err(storage)?;
    let is_completed: i64 = row.try_get("is_completed").map_err(storage)?;

    Ok(WorkflowStep {
        id: StepId(row.try_get("id").map_err(storage)?),
        requisition_id: RequisitionId(row.try_get("requisition_id").map_err(storage)?),
        position: u32::try_from(position).map_err(|_| decode("negative step position"))?,
        reviewer_level: u8::try_from(reviewer_level)
            .map_err(|_| decode("reviewer level out of range"))?,
        reviewer_name: row.try_get("reviewer_name").map_err(storage)?,
        action: parse_action(&action_str)?,
        comment: row.try_get("comment").map_err(storage)?,
        acted_by_id: row.try_get("acted_by_id").map_err(storage)?,
        acted_by_name: row.try_get("acted_by_name").map_err(storage)?,
        is_required: is_required != 0,
        is_completed: is_completed != 0,
        completed_at: parse_optional_timestamp(completed_at)?,
    })
}

async fn insert_steps(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    steps: &[WorkflowStep],
) -> Result<(), RepositoryError> {
    for step in steps {
        sqlx::query(
            "INSERT INTO workflow_step (id, requisition_id, position, reviewer_level,
                                        reviewer_name, action, comment, acted_by_id,
                                        acted_by_name, is_required, is_completed, completed_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&step.id.0)
        .bind(&step.requisition_id.0)
        .bind(step.position as i64)
        .bind(step.reviewer_level as i64)
        .bind(&step.reviewer_name)
        .bind(action_as_str(step.action))
        .bind(&step.comment)
        .bind(&step.acted_by_id)
        .bind(&step.acted_by_name)
        .bind(step.is_required as i64)
        .bind(step.is_completed as i64)
        .bind(step.completed_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut **tx)
        .await
        .map_err(storage)?;
    }
    Ok(())
}

async fn load_steps(
    pool: &DbPool,
    requisition_id: &RequisitionId,
) -> Result<Vec<WorkflowStep>, RepositoryError> {
    let rows = sqlx::query(
        "SELECT id, requisition_id, position, reviewer_level, reviewer_name, action,
                comment, acted_by_id, acted_by_name, is_required, is_completed, completed_at
         FROM workflow_step WHERE requisition_id = ? ORDER BY position ASC",
    )
    .bind(&requisition_id.0)
    .fetch_all(pool)
    .await
    .map_err(storage)?;

    rows.iter().map(row_to_step).collect()
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn create(&self, requisition: Requisition) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query(
            "INSERT INTO requisition (id, organization_id, requester_id, title, description,
                                      category, priority, justification, budget, status,
                                      approved_at, version, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&requisition.id.0)
        .bind(&requisition.organization_id)
        .bind(&requisition.requester_id)
        .bind(&requisition.title)
        .bind(&requisition.description)
        .bind(&requisition.category)
        .bind(&requisition.priority)
        .bind(&requisition.justification)
        .bind(requisition.budget.to_string())
        .bind(status_as_str(requisition.status))
        .bind(requisition.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(requisition.version)
        .bind(requisition.created_at.to_rfc3339())
        .bind(requisition.updated_at.to_rfc3339())
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        insert_steps(&mut tx, &requisition.steps).await?;
        tx.commit().await.map_err(storage)
    }

    async fn load(&self, id: &RequisitionId) -> Result<Requisition, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, organization_id, requester_id, title, description, category, priority,
                    justification, budget, status, approved_at, version, created_at, updated_at
             FROM requisition WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        let Some(row) = row else {
            return Err(RepositoryError::NotFound(id.clone()));
        };
        let mut requisition = row_to_requisition(&row)?;
        requisition.steps = load_steps(&self.pool, id).await?;
        Ok(requisition)
    }

    async fn save(&self, mut requisition: Requisition) -> Result<Requisition, RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        // Optimistic version check: zero rows means someone else saved
        // since this copy was loaded (or the record is gone).
        let result = sqlx::query(
            "UPDATE requisition SET
                 organization_id = ?, requester_id = ?, title = ?, description = ?,
                 category = ?, priority = ?, justification = ?, budget = ?, status = ?,
                 approved_at = ?, updated_at = ?, version = version + 1
             WHERE id = ? AND version = ?",
        )
        .bind(&requisition.organization_id)
        .bind(&requisition.requester_id)
        .bind(&requisition.title)
        .bind(&requisition.description)
        .bind(&requisition.category)
        .bind(&requisition.priority)
        .bind(&requisition.justification)
        .bind(requisition.budget.to_string())
        .bind(status_as_str(requisition.status))
        .bind(requisition.approved_at.map(|dt| dt.to_rfc3339()))
        .bind(requisition.updated_at.to_rfc3339())
        .bind(&requisition.id.0)
        .bind(requisition.version)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;

        if result.rows_affected() == 0 {
            let exists = sqlx::query("SELECT 1 FROM requisition WHERE id = ?")
                .bind(&requisition.id.0)
                .fetch_optional(&mut *tx)
                .await
                .map_err(storage)?
                .is_some();
            return Err(if exists {
                RepositoryError::Conflict(requisition.id)
            } else {
                RepositoryError::NotFound(requisition.id)
            });
        }

        // The step list is rewritten wholesale; step order is the insertion
        // order and must survive the rewrite.
        sqlx::query("DELETE FROM workflow_step WHERE requisition_id = ?")
            .bind(&requisition.id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        insert_steps(&mut tx, &requisition.steps).await?;

        tx.commit().await.map_err(storage)?;
        requisition.version += 1;
        Ok(requisition)
    }

    async fn delete(&self, id: &RequisitionId) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        sqlx::query("DELETE FROM workflow_step WHERE requisition_id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        let result = sqlx::query("DELETE FROM requisition WHERE id = ?")
            .bind(&id.0)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(id.clone()));
        }
        tx.commit().await.map_err(storage)
    }

    async fn list_by_organization(
        &self,
        organization_id: &str,
        filter: RequisitionFilter,
    ) -> Result<Vec<Requisition>, RepositoryError> {
        let status = filter.status.map(status_as_str);
        let rows = sqlx::query(
            "SELECT id, organization_id, requester_id, title, description, category, priority,
                    justification, budget, status, approved_at, version, created_at, updated_at
             FROM requisition
             WHERE organization_id = ?
               AND (? IS NULL OR status = ?)
               AND (? IS NULL OR requester_id = ?)
             ORDER BY created_at ASC",
        )
        .bind(organization_id)
        .bind(status)
        .bind(status)
        .bind(&filter.requester_id)
        .bind(&filter.requester_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut requisitions = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut requisition = row_to_requisition(row)?;
            requisition.steps = load_steps(&self.pool, &requisition.id).await?;
            requisitions.push(requisition);
        }
        Ok(requisitions)
    }
}
