//! Import run records: creation, status transitions, archive and soft delete.

use crate::error::{ImportError, ImportResult};
use crate::models::entity::imports;
use chrono::{NaiveDate, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, IntoActiveModel, QueryFilter,
    QueryOrder, Set,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportStatus {
    Pending,
    Queued,
    Processing,
    Completed,
    Failed,
}

impl ImportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportStatus::Pending => "pending",
            ImportStatus::Queued => "queued",
            ImportStatus::Processing => "processing",
            ImportStatus::Completed => "completed",
            ImportStatus::Failed => "failed",
        }
    }

    /// pending → (queued | processing) → (completed | failed); a queued run may still fail before it starts.
    pub fn can_transition_to(&self, next: ImportStatus) -> bool {
        use ImportStatus::*;
        matches!(
            (*self, next),
            (Pending, Queued)
                | (Pending, Processing)
                | (Pending, Failed)
                | (Queued, Processing)
                | (Queued, Failed)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ImportStatus::Completed | ImportStatus::Failed)
    }
}

impl fmt::Display for ImportStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ImportStatus {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ImportStatus::Pending),
            "queued" => Ok(ImportStatus::Queued),
            "processing" => Ok(ImportStatus::Processing),
            "completed" => Ok(ImportStatus::Completed),
            "failed" => Ok(ImportStatus::Failed),
            other => Err(ImportError::UnknownStatus(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServingStatus {
    #[serde(rename = "Daily Served")]
    DailyServed,
    #[serde(rename = "Payout Served")]
    PayoutServed,
    #[serde(rename = "Scheduled Payout")]
    ScheduledPayout,
}

impl ServingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServingStatus::DailyServed => "Daily Served",
            ServingStatus::PayoutServed => "Payout Served",
            ServingStatus::ScheduledPayout => "Scheduled Payout",
        }
    }

    /// Form value to status; blank and unknown values mean "none".
    pub fn parse_optional(raw: Option<&str>) -> Option<ServingStatus> {
        match raw.map(str::trim) {
            Some("Daily Served") => Some(ServingStatus::DailyServed),
            Some("Payout Served") => Some(ServingStatus::PayoutServed),
            Some("Scheduled Payout") => Some(ServingStatus::ScheduledPayout),
            _ => None,
        }
    }

    /// The payout date is only kept for scheduled payouts.
    pub fn payout_date(status: Option<ServingStatus>, date: Option<NaiveDate>) -> Option<NaiveDate> {
        match status {
            Some(ServingStatus::ScheduledPayout) => date,
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImportFilter {
    #[default]
    Active,
    Archived,
    Trashed,
}

#[derive(Debug, Clone, Default)]
pub struct NewImport {
    pub file_name: String,
    pub target_tables: Vec<String>,
    pub remark: Option<String>,
    pub serving_status: Option<ServingStatus>,
    pub payout_schedule_date: Option<NaiveDate>,
}

pub async fn create_import<C: ConnectionTrait>(db: &C, new: NewImport) -> ImportResult<imports::Model> {
    let now = Utc::now();
    let record = imports::ActiveModel {
        id: Default::default(),
        file_name: Set(new.file_name),
        target_table: Set(new.target_tables.join(", ")),
        status: Set(ImportStatus::Pending.as_str().to_string()),
        imported_rows: Set(0),
        remark: Set(new.remark.filter(|r| !r.trim().is_empty())),
        serving_status: Set(new.serving_status.map(|s| s.as_str().to_string())),
        payout_schedule_date: Set(ServingStatus::payout_date(new.serving_status, new.payout_schedule_date)),
        archived_at: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        deleted_at: Set(None),
    };
    let inserted = record.insert(db).await?;
    info!("Created import {} for {}", inserted.id, inserted.file_name);
    Ok(inserted)
}

/// Finds an import that has not been soft-deleted.
pub async fn find_import<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    imports::Entity::find_by_id(id)
        .filter(imports::Column::DeletedAt.is_null())
        .one(db)
        .await?
        .ok_or(ImportError::ImportNotFound(id))
}

pub async fn list_imports<C: ConnectionTrait>(db: &C, filter: ImportFilter) -> ImportResult<Vec<imports::Model>> {
    let query = imports::Entity::find();
    let query = match filter {
        ImportFilter::Active => query
            .filter(imports::Column::DeletedAt.is_null())
            .filter(imports::Column::ArchivedAt.is_null()),
        ImportFilter::Archived => query
            .filter(imports::Column::DeletedAt.is_null())
            .filter(imports::Column::ArchivedAt.is_not_null()),
        ImportFilter::Trashed => query.filter(imports::Column::DeletedAt.is_not_null()),
    };
    Ok(query
        .order_by_desc(imports::Column::CreatedAt)
        .order_by_desc(imports::Column::Id)
        .all(db)
        .await?)
}

pub async fn transition_status<C: ConnectionTrait>(
    db: &C,
    id: i32,
    next: ImportStatus,
) -> ImportResult<imports::Model> {
    let active = checked_transition(db, id, next).await?;
    Ok(active.update(db).await?)
}

/// Records a finished run together with the number of entity records it wrote.
pub async fn mark_completed<C: ConnectionTrait>(
    db: &C,
    id: i32,
    imported_rows: usize,
) -> ImportResult<imports::Model> {
    let mut active = checked_transition(db, id, ImportStatus::Completed).await?;
    active.imported_rows = Set(i32::try_from(imported_rows).unwrap_or(i32::MAX));
    Ok(active.update(db).await?)
}

async fn checked_transition<C: ConnectionTrait>(
    db: &C,
    id: i32,
    next: ImportStatus,
) -> ImportResult<imports::ActiveModel> {
    let import = find_import(db, id).await?;
    let current: ImportStatus = import.status.parse()?;
    if !current.can_transition_to(next) {
        return Err(ImportError::InvalidTransition {
            from: current.to_string(),
            to: next.to_string(),
        });
    }
    info!("Import {} status: {} -> {}", id, current, next);

    let mut active = import.into_active_model();
    active.status = Set(next.as_str().to_string());
    active.updated_at = Set(Utc::now());
    Ok(active)
}

/// Marks a run failed unless it already reached a terminal status.
pub async fn mark_failed<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    let import = find_import(db, id).await?;
    let current: ImportStatus = import.status.parse()?;
    if current.is_terminal() {
        return Ok(import);
    }
    transition_status(db, id, ImportStatus::Failed).await
}

pub async fn update_details<C: ConnectionTrait>(
    db: &C,
    id: i32,
    remark: Option<String>,
    serving_status: Option<ServingStatus>,
    payout_schedule_date: Option<NaiveDate>,
) -> ImportResult<imports::Model> {
    let import = find_import(db, id).await?;
    let mut active = import.into_active_model();
    active.remark = Set(remark.filter(|r| !r.trim().is_empty()));
    active.serving_status = Set(serving_status.map(|s| s.as_str().to_string()));
    active.payout_schedule_date = Set(ServingStatus::payout_date(serving_status, payout_schedule_date));
    active.updated_at = Set(Utc::now());
    Ok(active.update(db).await?)
}

pub async fn archive<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    let import = find_import(db, id).await?;
    let mut active = import.into_active_model();
    let now = Utc::now();
    active.archived_at = Set(Some(now));
    active.updated_at = Set(now);
    let updated = active.update(db).await?;
    info!("Import {} archived", id);
    Ok(updated)
}

pub async fn unarchive<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    let import = find_import(db, id).await?;
    if import.archived_at.is_none() {
        return Err(ImportError::ImportNotFound(id));
    }
    let mut active = import.into_active_model();
    active.archived_at = Set(None);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;
    info!("Import {} restored from archive", id);
    Ok(updated)
}

pub async fn soft_delete<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    let import = find_import(db, id).await?;
    let mut active = import.into_active_model();
    let now = Utc::now();
    active.deleted_at = Set(Some(now));
    active.updated_at = Set(now);
    let updated = active.update(db).await?;
    info!("Import {} moved to trash", id);
    Ok(updated)
}

pub async fn restore<C: ConnectionTrait>(db: &C, id: i32) -> ImportResult<imports::Model> {
    let import = imports::Entity::find_by_id(id)
        .filter(imports::Column::DeletedAt.is_not_null())
        .one(db)
        .await?
        .ok_or(ImportError::ImportNotFound(id))?;
    let mut active = import.into_active_model();
    active.deleted_at = Set(None);
    active.updated_at = Set(Utc::now());
    let updated = active.update(db).await?;
    info!("Import {} restored", id);
    Ok(updated)
}
