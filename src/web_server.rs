use crate::config::AppConfig;
use crate::error::{ImportError, MappingError};
use crate::import_processor_sea::{ExecutionMode, ImportJob, ImportProcessor};
use crate::import_records::{self, ImportFilter, NewImport, ServingStatus};
use crate::mapping::{ColumnMapping, MappingSuggester};
use crate::models::entity::imports;
use crate::models::{
    MappingPreview, ProcessImportRequest, ProcessImportResponse, SelectSheetRequest,
    UpdateImportRequest, UploadResponse,
};
use crate::spreadsheet::{is_supported_extension, read_document_blocking, Sheet, SpreadsheetDocument};
use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use sea_orm::DatabaseConnection;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::path::{Path as FsPath, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type ApiError = (StatusCode, String);

/// An uploaded file waiting for its mapping to be confirmed.
#[derive(Debug, Clone)]
struct UploadSession {
    path: PathBuf,
    original_name: String,
    created_at: Instant,
}

struct UploadSessions {
    entries: HashMap<Uuid, UploadSession>,
    ttl: Duration,
}

impl UploadSessions {
    fn new(ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            ttl,
        }
    }

    fn is_expired(&self, session: &UploadSession) -> bool {
        session.created_at.elapsed() > self.ttl
    }

    fn insert(&mut self, session: UploadSession) -> Uuid {
        let id = Uuid::new_v4();
        self.entries.insert(id, session);
        id
    }

    /// A live session whose file is still on disk. Stale entries are dropped.
    fn get(&mut self, id: &Uuid) -> Option<UploadSession> {
        let session = self.entries.get(id)?.clone();
        if self.is_expired(&session) || !session.path.exists() {
            self.entries.remove(id);
            remove_file_quietly(&session.path);
            return None;
        }
        Some(session)
    }

    /// Removes a live session so only one caller can import its file.
    fn claim(&mut self, id: &Uuid) -> Option<UploadSession> {
        let session = self.entries.remove(id)?;
        if self.is_expired(&session) || !session.path.exists() {
            remove_file_quietly(&session.path);
            return None;
        }
        Some(session)
    }

    /// Returns a claimed session whose import never started.
    fn put_back(&mut self, id: Uuid, session: UploadSession) {
        self.entries.insert(id, session);
    }

    fn purge_expired(&mut self) -> usize {
        let expired: Vec<Uuid> = self
            .entries
            .iter()
            .filter(|(_, session)| self.is_expired(session))
            .map(|(id, _)| *id)
            .collect();
        for id in &expired {
            if let Some(session) = self.entries.remove(id) {
                remove_file_quietly(&session.path);
            }
        }
        expired.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    db: DatabaseConnection,
    config: Arc<AppConfig>,
    processor: ImportProcessor,
    suggester: Arc<MappingSuggester>,
    sessions: Arc<Mutex<UploadSessions>>,
}

impl AppState {
    pub fn new(db: DatabaseConnection, config: AppConfig) -> Self {
        let processor = ImportProcessor::new(db.clone()).with_batch_size(config.batch_size);
        let suggester = MappingSuggester::new(processor.catalog().clone());
        let sessions = UploadSessions::new(config.session_ttl);
        Self {
            db,
            config: Arc::new(config),
            processor,
            suggester: Arc::new(suggester),
            sessions: Arc::new(Mutex::new(sessions)),
        }
    }

    fn sessions(&self) -> MutexGuard<'_, UploadSessions> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[derive(Deserialize)]
pub struct ListQuery {
    show: Option<ImportFilter>,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;
    Router::new()
        .route("/api/catalog", get(catalog_handler))
        .route("/api/imports", get(list_imports_handler))
        .route("/api/imports/upload", post(upload_handler))
        .route("/api/imports/sessions/{id}/sheet", post(select_sheet_handler))
        .route("/api/imports/sessions/{id}/process", post(process_handler))
        .route(
            "/api/imports/{id}",
            get(get_import_handler)
                .patch(update_import_handler)
                .delete(delete_import_handler),
        )
        .route("/api/imports/{id}/archive", post(archive_handler))
        .route("/api/imports/{id}/unarchive", post(unarchive_handler))
        .route("/api/imports/{id}/restore", post(restore_handler))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CorsLayer::very_permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn start_server(
    db: DatabaseConnection,
    config: AppConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let port = config.port;
    let state = AppState::new(db, config);
    let app = router(state);
    debug!("Routes registered");

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("🚀 Import server listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn import_error_response(err: ImportError) -> ApiError {
    let status = match &err {
        ImportError::TableNotAllowed(_)
        | ImportError::UnknownColumn { .. }
        | ImportError::SheetNotFound(_)
        | ImportError::Spreadsheet(_)
        | ImportError::Csv(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ImportError::UnsupportedFile(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
        ImportError::ImportNotFound(_) => StatusCode::NOT_FOUND,
        ImportError::InvalidTransition { .. } => StatusCode::CONFLICT,
        ImportError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        ImportError::Io(_)
        | ImportError::Database(_)
        | ImportError::UnknownStatus(_)
        | ImportError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status == StatusCode::INTERNAL_SERVER_ERROR {
        error!("Request failed: {}", err);
    }
    (status, err.to_string())
}

fn mapping_error_response(err: MappingError) -> ApiError {
    (StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
}

fn session_not_found(id: &Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        format!("Upload session {} has expired or does not exist. Please upload the file again.", id),
    )
}

fn remove_file_quietly(path: &FsPath) {
    if path.exists() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Mapping screen data for one sheet, with the suggester's pre-selection.
fn build_preview(sheet: &Sheet, suggester: &MappingSuggester, queue_threshold: usize) -> MappingPreview {
    MappingPreview {
        sheet_index: sheet.index,
        sheet_name: sheet.name.clone(),
        headers: sheet.header_views(),
        sample_rows: sheet.sample_rows(),
        total_rows: sheet.row_count(),
        table_columns: suggester.catalog().to_map(),
        suggested_mappings: suggester.suggest(sheet.header_pairs()),
        queue_threshold,
    }
}

async fn load_document(path: PathBuf) -> Result<SpreadsheetDocument, ApiError> {
    read_document_blocking(path)
        .await
        .map_err(import_error_response)
}

async fn catalog_handler(State(app_state): State<AppState>) -> Json<BTreeMap<String, Vec<String>>> {
    Json(app_state.processor.catalog().to_map())
}

async fn upload_handler(
    State(app_state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, ApiError> {
    let purged = app_state.sessions().purge_expired();
    if purged > 0 {
        debug!("Dropped {} expired upload session(s)", purged);
    }

    let mut upload: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| (StatusCode::BAD_REQUEST, format!("Invalid upload: {}", e)))?
    {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field
            .file_name()
            .map(str::to_string)
            .unwrap_or_default();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| (StatusCode::BAD_REQUEST, format!("Failed to read upload: {}", e)))?;
        upload = Some((file_name, bytes.to_vec()));
    }

    let (file_name, bytes) =
        upload.ok_or((StatusCode::BAD_REQUEST, "A file field is required".to_string()))?;
    if !is_supported_extension(&file_name) {
        return Err(import_error_response(ImportError::UnsupportedFile(file_name)));
    }

    let extension = FsPath::new(&file_name)
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let stored_path = app_state
        .config
        .upload_dir
        .join(format!("{}.{}", Uuid::new_v4(), extension));
    tokio::fs::write(&stored_path, &bytes)
        .await
        .map_err(|e| import_error_response(e.into()))?;
    info!("Stored upload {} ({} bytes) at {}", file_name, bytes.len(), stored_path.display());

    let document = match load_document(stored_path.clone()).await {
        Ok(document) if document.sheet_count() > 0 => document,
        Ok(_) => {
            remove_file_quietly(&stored_path);
            return Err((
                StatusCode::UNPROCESSABLE_ENTITY,
                "The file has no sheet with a header row".to_string(),
            ));
        }
        Err(e) => {
            remove_file_quietly(&stored_path);
            return Err(e);
        }
    };

    let preview = document
        .auto_selected_sheet()
        .map(|sheet| build_preview(sheet, &app_state.suggester, app_state.config.queue_threshold));

    let session_id = app_state.sessions().insert(UploadSession {
        path: stored_path,
        original_name: file_name.clone(),
        created_at: Instant::now(),
    });

    Ok(Json(UploadResponse {
        session_id,
        file_name,
        sheets: document.summaries(),
        preview,
    }))
}

async fn select_sheet_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SelectSheetRequest>,
) -> Result<Json<MappingPreview>, ApiError> {
    let session = app_state.sessions().get(&id).ok_or_else(|| session_not_found(&id))?;
    let document = load_document(session.path).await?;
    let sheet = document
        .sheet(request.sheet_index)
        .ok_or_else(|| import_error_response(ImportError::SheetNotFound(request.sheet_index)))?;

    Ok(Json(build_preview(
        sheet,
        &app_state.suggester,
        app_state.config.queue_threshold,
    )))
}

/// Checks the mapping and sheet, then records the pending import.
async fn prepare_import(
    app_state: &AppState,
    session: &UploadSession,
    request: &ProcessImportRequest,
) -> Result<(ColumnMapping, usize, imports::Model), ApiError> {
    let mapping = ColumnMapping::from_entries(&request.mapping);
    mapping.validate().map_err(mapping_error_response)?;
    mapping
        .resolve(app_state.processor.catalog())
        .map_err(import_error_response)?;

    let document = load_document(session.path.clone()).await?;
    let row_count = document
        .sheet(request.sheet_index)
        .ok_or_else(|| import_error_response(ImportError::SheetNotFound(request.sheet_index)))?
        .row_count();

    let import = import_records::create_import(
        &app_state.db,
        NewImport {
            file_name: session.original_name.clone(),
            target_tables: mapping.target_tables(),
            remark: request.remark.clone(),
            serving_status: ServingStatus::parse_optional(request.serving_status.as_deref()),
            payout_schedule_date: request.payout_schedule_date,
        },
    )
    .await
    .map_err(import_error_response)?;

    Ok((mapping, row_count, import))
}

async fn process_handler(
    State(app_state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<ProcessImportRequest>,
) -> Result<Json<ProcessImportResponse>, ApiError> {
    // One claim per session; a repeated request gets 404.
    let session = app_state.sessions().claim(&id).ok_or_else(|| session_not_found(&id))?;

    let (mapping, row_count, import) = match prepare_import(&app_state, &session, &request).await {
        Ok(prepared) => prepared,
        Err(e) => {
            app_state.sessions().put_back(id, session);
            return Err(e);
        }
    };

    // The job owns the file from here on.
    let job = ImportJob {
        import_id: import.id,
        file_path: session.path.clone(),
        sheet_index: request.sheet_index,
        mapping,
    };

    match ExecutionMode::for_rows(row_count, app_state.config.queue_threshold) {
        ExecutionMode::Deferred => {
            app_state
                .processor
                .spawn_deferred(job, app_state.config.job_timeout)
                .await
                .map_err(|e| {
                    remove_file_quietly(&session.path);
                    import_error_response(e)
                })?;
            let import = import_records::find_import(&app_state.db, import.id)
                .await
                .map_err(import_error_response)?;
            Ok(Json(ProcessImportResponse {
                import,
                queued: true,
                stats: None,
                message: format!(
                    "{} rows exceed the inline limit of {}. The import was queued for background processing.",
                    row_count, app_state.config.queue_threshold
                ),
            }))
        }
        ExecutionMode::Inline => {
            let stats = app_state
                .processor
                .process_job(&job)
                .await
                .map_err(import_error_response)?;
            let import = import_records::find_import(&app_state.db, import.id)
                .await
                .map_err(import_error_response)?;
            Ok(Json(ProcessImportResponse {
                import,
                queued: false,
                message: stats.summary_message(),
                stats: Some(stats),
            }))
        }
    }
}

async fn list_imports_handler(
    State(app_state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<imports::Model>>, ApiError> {
    let filter = query.show.unwrap_or_default();
    import_records::list_imports(&app_state.db, filter)
        .await
        .map(Json)
        .map_err(import_error_response)
}

async fn get_import_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::find_import(&app_state.db, id)
        .await
        .map(Json)
        .map_err(import_error_response)
}

async fn update_import_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
    Json(request): Json<UpdateImportRequest>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::update_details(
        &app_state.db,
        id,
        request.remark,
        ServingStatus::parse_optional(request.serving_status.as_deref()),
        request.payout_schedule_date,
    )
    .await
    .map(Json)
    .map_err(import_error_response)
}

async fn delete_import_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::soft_delete(&app_state.db, id)
        .await
        .map(Json)
        .map_err(import_error_response)
}

async fn archive_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::archive(&app_state.db, id)
        .await
        .map(Json)
        .map_err(import_error_response)
}

async fn unarchive_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::unarchive(&app_state.db, id)
        .await
        .map(Json)
        .map_err(import_error_response)
}

async fn restore_handler(
    State(app_state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<imports::Model>, ApiError> {
    import_records::restore(&app_state.db, id)
        .await
        .map(Json)
        .map_err(import_error_response)
}
