pub mod entity;

use crate::mapping::{MappingEntry, SuggestedMapping};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Counters produced by one import run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub total_rows: usize,
    pub beneficiaries_imported: usize,
    pub profiles_imported: usize,
    pub transactions_imported: usize,
    pub skipped_rows: usize,
}

impl ImportStats {
    pub fn with_total(total_rows: usize) -> Self {
        Self {
            total_rows,
            ..Self::default()
        }
    }

    /// Entity records written, the value stored as `imported_rows` on the import.
    pub fn records_imported(&self) -> usize {
        self.beneficiaries_imported + self.profiles_imported + self.transactions_imported
    }

    pub fn summary_message(&self) -> String {
        let mut parts = Vec::new();
        if self.beneficiaries_imported > 0 {
            parts.push(format!("{} beneficiaries", self.beneficiaries_imported));
        }
        if self.profiles_imported > 0 {
            parts.push(format!("{} profiles", self.profiles_imported));
        }
        if self.transactions_imported > 0 {
            parts.push(format!("{} transactions", self.transactions_imported));
        }
        let mut message = format!("Import completed: {}.", parts.join(", "));
        if self.skipped_rows > 0 {
            message.push_str(&format!(" {} rows skipped.", self.skipped_rows));
        }
        message
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SheetSummary {
    pub index: usize,
    pub name: String,
    pub header_count: usize,
    pub row_count: usize,
    pub sample_headers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeaderView {
    pub index: usize,
    pub name: String,
}

/// Everything a presentation layer needs to render the mapping step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingPreview {
    pub sheet_index: usize,
    pub sheet_name: String,
    pub headers: Vec<HeaderView>,
    pub sample_rows: Vec<Vec<String>>,
    pub total_rows: usize,
    pub table_columns: BTreeMap<String, Vec<String>>,
    pub suggested_mappings: SuggestedMapping,
    pub queue_threshold: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadResponse {
    pub session_id: Uuid,
    pub file_name: String,
    pub sheets: Vec<SheetSummary>,
    /// Present when the sheet could be chosen without asking.
    pub preview: Option<MappingPreview>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectSheetRequest {
    pub sheet_index: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessImportRequest {
    pub sheet_index: usize,
    pub mapping: Vec<MappingEntry>,
    pub remark: Option<String>,
    pub serving_status: Option<String>,
    pub payout_schedule_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessImportResponse {
    pub import: entity::imports::Model,
    pub queued: bool,
    pub stats: Option<ImportStats>,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateImportRequest {
    pub remark: Option<String>,
    pub serving_status: Option<String>,
    pub payout_schedule_date: Option<NaiveDate>,
}
