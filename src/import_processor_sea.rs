use crate::catalog::TableCatalog;
use crate::config::DEFAULT_BATCH_SIZE;
use crate::error::{ImportError, ImportResult};
use crate::import_records::{self, ImportStatus};
use crate::mapping::{ColumnMapping, TableMap};
use crate::materializer::RowMaterializer;
use crate::models::ImportStats;
use crate::spreadsheet::{read_document_blocking, SpreadsheetDocument};
use sea_orm::{DatabaseConnection, DbErr, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Where a confirmed import runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Inline,
    Deferred,
}

impl ExecutionMode {
    pub fn for_rows(row_count: usize, queue_threshold: usize) -> Self {
        if row_count > queue_threshold {
            ExecutionMode::Deferred
        } else {
            ExecutionMode::Inline
        }
    }
}

/// A confirmed import waiting to run against an uploaded file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportJob {
    pub import_id: i32,
    pub file_path: PathBuf,
    pub sheet_index: usize,
    pub mapping: ColumnMapping,
}

#[derive(Clone)]
pub struct ImportProcessor {
    db: DatabaseConnection,
    catalog: TableCatalog,
    batch_size: usize,
}

impl ImportProcessor {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            catalog: TableCatalog::from_entities(),
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn db(&self) -> &DatabaseConnection {
        &self.db
    }

    pub fn catalog(&self) -> &TableCatalog {
        &self.catalog
    }

    /// Imports one sheet under `mapping`, one transaction per batch of rows.
    ///
    /// A failing batch is rolled back and the error returned; batches committed
    /// before it stay committed, so a failed run leaves a prefix of the sheet imported.
    pub async fn run(
        &self,
        document: &SpreadsheetDocument,
        sheet_index: usize,
        import_id: i32,
        mapping: &ColumnMapping,
    ) -> ImportResult<ImportStats> {
        // Configuration errors surface before any row is touched.
        let table_map = mapping.resolve(&self.catalog)?;
        let sheet = document
            .sheet(sheet_index)
            .ok_or(ImportError::SheetNotFound(sheet_index))?;

        let mut stats = ImportStats::with_total(sheet.rows.len());
        if sheet.rows.is_empty() {
            info!("Import {}: sheet {} has no data rows", import_id, sheet.name);
            return Ok(stats);
        }

        info!(
            "Import {}: {} rows from sheet {} in batches of {} (dual-name mode: {})",
            import_id,
            sheet.rows.len(),
            sheet.name,
            self.batch_size,
            table_map.dual_name_mode()
        );

        for (batch_no, batch) in sheet.rows.chunks(self.batch_size).enumerate() {
            let first_row = batch_no * self.batch_size;
            if let Err(e) = self
                .import_batch(&table_map, import_id, batch, first_row, &mut stats)
                .await
            {
                error!(
                    "Import {}: batch {} rolled back, run aborted: {}",
                    import_id,
                    batch_no + 1,
                    e
                );
                return Err(e.into());
            }
            debug!("Import {}: batch {} committed", import_id, batch_no + 1);
        }

        info!(
            "Import {} finished - rows: {}, beneficiaries: {}, profiles: {}, transactions: {}, skipped: {}",
            import_id,
            stats.total_rows,
            stats.beneficiaries_imported,
            stats.profiles_imported,
            stats.transactions_imported,
            stats.skipped_rows
        );
        Ok(stats)
    }

    async fn import_batch(
        &self,
        table_map: &TableMap,
        import_id: i32,
        batch: &[Vec<String>],
        first_row: usize,
        stats: &mut ImportStats,
    ) -> Result<(), DbErr> {
        let materializer = RowMaterializer::new(table_map, import_id);
        let txn = self.db.begin().await?;

        for (offset, row) in batch.iter().enumerate() {
            if let Err(e) = materializer.materialize(&txn, row, stats).await {
                // Data rows start on the second sheet line.
                error!(
                    "Row import failed: import={} row={} error={}",
                    import_id,
                    first_row + offset + 2,
                    e
                );
                txn.rollback().await?;
                return Err(e);
            }
        }

        txn.commit().await?;
        Ok(())
    }

    /// Runs a job and records the outcome on its import; the uploaded file is always removed.
    pub async fn process_job(&self, job: &ImportJob) -> ImportResult<ImportStats> {
        let result = self.process_job_inner(job).await;

        let recorded = match &result {
            Ok(stats) => {
                import_records::mark_completed(&self.db, job.import_id, stats.records_imported())
                    .await
                    .map(|_| ())
            }
            Err(e) => {
                error!("Import {} failed: {}", job.import_id, e);
                if let Err(status_err) = import_records::mark_failed(&self.db, job.import_id).await {
                    error!(
                        "Could not mark import {} as failed: {}",
                        job.import_id, status_err
                    );
                }
                Ok(())
            }
        };

        remove_upload(&job.file_path);
        recorded?;
        result
    }

    async fn process_job_inner(&self, job: &ImportJob) -> ImportResult<ImportStats> {
        import_records::transition_status(&self.db, job.import_id, ImportStatus::Processing).await?;
        let document = read_document_blocking(job.file_path.clone()).await?;
        self.run(&document, job.sheet_index, job.import_id, &job.mapping)
            .await
    }

    /// Queues the job and runs it on a background task under `timeout`.
    pub async fn spawn_deferred(
        &self,
        job: ImportJob,
        timeout: Duration,
    ) -> ImportResult<JoinHandle<()>> {
        import_records::transition_status(&self.db, job.import_id, ImportStatus::Queued).await?;
        info!(
            "Import {} queued for background processing ({})",
            job.import_id,
            job.file_path.display()
        );

        let processor = self.clone();
        Ok(tokio::spawn(async move {
            match tokio::time::timeout(timeout, processor.process_job(&job)).await {
                Ok(Ok(stats)) => info!(
                    "Background import {} completed: {} records",
                    job.import_id,
                    stats.records_imported()
                ),
                Ok(Err(e)) => error!("Background import {} failed: {}", job.import_id, e),
                Err(_) => {
                    let err = ImportError::Timeout(timeout.as_secs());
                    error!("Background import {}: {}", job.import_id, err);
                    if let Err(e) = import_records::mark_failed(processor.db(), job.import_id).await {
                        error!("Could not mark import {} as failed: {}", job.import_id, e);
                    }
                    remove_upload(&job.file_path);
                }
            }
        }))
    }
}

fn remove_upload(path: &Path) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove uploaded file {}: {}", path.display(), e);
        }
    }
}
