//! REST handlers

use axum::extract::{Multipart, Path, Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{info, warn};
use uuid::Uuid;

use docview_core::{
    Document, DocumentId, DocumentStatus, ErrorKind, FileType, ProcessingTask, View,
};
use docview_engine::{quality_of, Job};
use docview_ingestion::estimated_processing_secs;
use docview_store::HistoryFilter;
use docview_views::{cache_key, type_mapping};

use crate::error::ApiError;
use crate::AppState;

type ApiResult<T> = Result<T, ApiError>;

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    views: Option<String>,
}

pub async fn upload(
    State(state): State<AppState>,
    Query(query): Query<UploadQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<Value>> {
    let views_hint = parse_views_list(query.views.as_deref())?;

    let mut file: Option<(String, Vec<u8>)> = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("invalid multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let filename = field
                .file_name()
                .map(String::from)
                .ok_or_else(|| ApiError::bad_request("file field has no filename"))?;
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read file field: {}", e)))?;
            file = Some((filename, bytes.to_vec()));
            break;
        }
    }
    let (filename, bytes) =
        file.ok_or_else(|| ApiError::bad_request("multipart field 'file' is required"))?;

    let extension = filename
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if extension == "doc" {
        return Err(ApiError::from_kind(
            ErrorKind::UnsupportedFormat,
            "Legacy .doc files are not supported; save the document as .docx and upload it again",
        ));
    }
    let file_type = match FileType::from_filename(&filename) {
        Some(t) if state.config.processing.is_extension_allowed(&extension) => t,
        _ => {
            return Err(ApiError::from_kind(
                ErrorKind::UnsupportedFormat,
                format!("unsupported file extension: .{}", extension),
            ))
        }
    };

    let max_bytes = state.config.processing.max_file_size_bytes;
    if bytes.len() as u64 > max_bytes {
        return Err(ApiError::from_kind(
            ErrorKind::FileTooLarge,
            format!("file is {} bytes, limit is {}", bytes.len(), max_bytes),
        ));
    }

    // Pre-flight time estimate over the content ceiling; the classifier may
    // enable more views later, but the wall-clock ceiling covers that.
    let estimated_chars = (bytes.len()).min(state.config.processing.max_content_chars);
    let view_count = views_hint.as_ref().map(|v| v.len()).unwrap_or(1);
    let estimate = estimated_processing_secs(estimated_chars, view_count);
    if estimate > state.config.processing.job_timeout_secs {
        return Err(ApiError::from_kind(
            ErrorKind::EstimatedTimeExceedsBudget,
            format!(
                "estimated processing time {}s exceeds the {}s ceiling",
                estimate, state.config.processing.job_timeout_secs
            ),
        ));
    }

    let mut document = Document::new(&filename, "", bytes.len() as u64, file_type);

    let blob_dir = std::path::Path::new(&state.config.storage.blob_dir);
    tokio::fs::create_dir_all(blob_dir)
        .await
        .map_err(|e| ApiError::from_kind(ErrorKind::ServerError, format!("blob dir: {}", e)))?;
    let blob_path = blob_dir.join(format!("{}.{}", document.id, extension));
    tokio::fs::write(&blob_path, &bytes)
        .await
        .map_err(|e| ApiError::from_kind(ErrorKind::ServerError, format!("blob write: {}", e)))?;
    document.blob_path = blob_path.to_string_lossy().into_owned();

    let task = ProcessingTask::new(document.id);
    state.store.create_document(&document).await?;
    state.store.create_task(&task).await?;

    let mut job = Job::new(document.id, task.id);
    if let Some(views) = views_hint {
        job = job.with_views_hint(views);
    }
    state.queue.enqueue(job)?;

    info!(
        document_id = %document.id,
        filename = %document.filename,
        file_type = %document.file_type,
        size = document.file_size,
        "document accepted"
    );

    Ok(Json(json!({
        "document_id": document.id,
        "task_id": task.id,
        "filename": document.filename,
        "file_size": document.file_size,
        "file_type": document.file_type,
        "status": document.status,
        "upload_time": document.uploaded_at,
    })))
}

pub async fn get_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;
    Ok(Json(document_body(&document)))
}

pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;
    let task = state.store.latest_task(document.id).await?;
    let profile = state.store.get_profile(document.id).await?;

    let mut body = Map::new();
    body.insert("document_id".into(), json!(document.id));
    body.insert("status".into(), json!(document.status));
    match &task {
        Some(task) => {
            body.insert("progress".into(), json!(task.progress));
            body.insert("current_stage".into(), json!(task.current_stage));
            body.insert("task_id".into(), json!(task.id));
        }
        None => {
            body.insert("progress".into(), json!(0));
            body.insert("current_stage".into(), json!("queued"));
        }
    }
    if let Some(profile) = profile {
        body.insert("enabled_views".into(), json!(profile.enabled_views));
        body.insert("primary_view".into(), json!(profile.primary_view));
    }
    Ok(Json(Value::Object(body)))
}

#[derive(Debug, Deserialize)]
pub struct ResultQuery {
    view: Option<String>,
    views: Option<String>,
}

pub async fn get_result(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<ResultQuery>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;

    if let Some(view_name) = query.view.as_deref() {
        let view = parse_view(view_name)?;
        let result = state
            .store
            .get_result(document.id, view)
            .await?
            .ok_or_else(|| {
                ApiError::not_found(format!("no {} result for document {}", view, document.id))
            })?;
        let quality = quality_of(document.id, view, &result.result_data);
        return Ok(Json(json!({
            "document_id": document.id,
            "view": view,
            "document_type": type_mapping()[view.as_str()].clone(),
            "result": result.result_data,
            "processing_time": result.processing_time_seconds,
            "quality_score": quality.quality_score,
            "created_at": result.created_at,
        })));
    }

    if let Some(views_param) = query.views.as_deref() {
        let requested = parse_views_list(Some(views_param))?
            .ok_or_else(|| ApiError::bad_request("views parameter is empty"))?;
        let mut results = Map::new();
        for view in &requested {
            if let Some(result) = state.store.get_result(document.id, *view).await? {
                results.insert(view.as_str().to_string(), result.result_data);
            }
        }
        if results.is_empty() {
            return Err(ApiError::not_found(format!(
                "no results for requested views on document {}",
                document.id
            )));
        }
        return Ok(Json(json!({
            "document_id": document.id,
            "requested_views": requested,
            "results": results,
        })));
    }

    let all = state.store.list_results(document.id).await?;
    if all.is_empty() {
        return Err(ApiError::not_found(format!(
            "no results for document {}",
            document.id
        )));
    }
    let profile = state.store.get_profile(document.id).await?;
    let mut views = Map::new();
    for result in &all {
        views.insert(result.view.as_str().to_string(), result.result_data.clone());
    }
    let meta = match &profile {
        Some(p) => json!({
            "enabled_views": p.enabled_views,
            "primary_view": p.primary_view,
            "confidence": p.confidence,
            "view_count": all.len(),
            "timestamp": chrono::Utc::now(),
        }),
        None => json!({ "view_count": all.len(), "timestamp": chrono::Utc::now() }),
    };
    Ok(Json(json!({
        "document_id": document.id,
        "views": views,
        "meta": meta,
    })))
}

pub async fn recommend_views(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;
    let intermediate = state
        .store
        .get_intermediate(document.id)
        .await?
        .ok_or_else(|| {
            ApiError::bad_request(format!(
                "intermediate results are not ready for document {}",
                document.id
            ))
        })?;

    let classification = state
        .engine
        .classify_text(&intermediate.preprocessed_text)
        .await;
    let key = cache_key(&document.id, &classification.scores);

    Ok(Json(json!({
        "primary_view": classification.primary,
        "enabled_views": classification.enabled,
        "detection_scores": classification.scores,
        "cache_key": key,
        "type_mapping": type_mapping(),
        "method": classification.method,
    })))
}

#[derive(Debug, Deserialize)]
pub struct SwitchQuery {
    view: String,
}

pub async fn switch_view(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<SwitchQuery>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;
    let view = parse_view(&query.view)?;

    let outcome = state.engine.switch_view(document.id, view).await?;
    Ok(Json(json!({
        "document_id": document.id,
        "view": view,
        "result": outcome.result.result_data,
        "from_cache": outcome.from_cache,
        "used_intermediate_results": outcome.used_intermediate_results,
        "processing_time": outcome.processing_time,
    })))
}

pub async fn views_status(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;
    let profile = state.store.get_profile(document.id).await?;
    let results = state.store.list_results(document.id).await?;

    let enabled = profile
        .as_ref()
        .map(|p| p.enabled_views.clone())
        .unwrap_or_default();

    let mut views_status = Map::new();
    for view in &enabled {
        let result = results.iter().find(|r| r.view == *view);
        let mut entry = Map::new();
        entry.insert("view".into(), json!(view));
        match result {
            Some(result) => {
                entry.insert("status".into(), json!("completed"));
                entry.insert("ready".into(), json!(true));
                entry.insert("is_primary".into(), json!(result.is_primary));
                entry.insert(
                    "processing_time".into(),
                    json!(result.processing_time_seconds),
                );
                entry.insert(
                    "has_content".into(),
                    json!(result
                        .result_data
                        .as_object()
                        .map(|o| !o.is_empty())
                        .unwrap_or(false)),
                );
            }
            None => {
                // Enabled but absent: failed once the document is terminal,
                // otherwise still on its way.
                let status = match document.status {
                    DocumentStatus::Pending | DocumentStatus::Processing => "processing",
                    _ => "failed",
                };
                entry.insert("status".into(), json!(status));
                entry.insert("ready".into(), json!(false));
                entry.insert("is_primary".into(), json!(false));
            }
        }
        views_status.insert(view.as_str().to_string(), Value::Object(entry));
    }

    Ok(Json(json!({
        "document_id": document.id,
        "views_status": views_status,
        "primary_view": profile.as_ref().map(|p| p.primary_view),
        "enabled_views": enabled,
    })))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    page: Option<u32>,
    page_size: Option<u32>,
    document_type: Option<String>,
    start_date: Option<String>,
    end_date: Option<String>,
}

pub async fn history(
    State(state): State<AppState>,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<Json<Value>> {
    let file_type = match query.document_type.as_deref() {
        Some(raw) => Some(
            FileType::from_filename(&format!("x.{}", raw))
                .ok_or_else(|| ApiError::bad_request(format!("unknown document type: {}", raw)))?,
        ),
        None => None,
    };

    let filter = HistoryFilter {
        page: query.page.unwrap_or(1).max(1),
        page_size: query.page_size.unwrap_or(20).clamp(1, 100),
        file_type,
        start_date: parse_date(query.start_date.as_deref(), false)?,
        end_date: parse_date(query.end_date.as_deref(), true)?,
    };

    let page = state.store.list_documents(&filter).await?;
    Ok(Json(json!({
        "items": page.items.iter().map(document_body).collect::<Vec<_>>(),
        "total": page.total,
        "page": page.page,
        "page_size": page.page_size,
    })))
}

pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Value>> {
    let document = load_document(&state, id).await?;

    state.cancels.cancel(document.id);
    if let Some(task) = state.store.latest_task(document.id).await? {
        state.broker.remove(task.id);
    }

    let deleted = state.store.delete_document(document.id).await?;
    if let Err(e) = tokio::fs::remove_file(&document.blob_path).await {
        warn!(document_id = %document.id, error = %e, "failed to remove blob");
    }

    info!(document_id = %document.id, "document deleted");
    Ok(Json(json!({
        "document_id": document.id,
        "deleted": deleted,
    })))
}

async fn load_document(state: &AppState, id: Uuid) -> ApiResult<Document> {
    let document_id = DocumentId::from_uuid(id);
    state
        .store
        .get_document(document_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("document not found: {}", document_id)))
}

fn document_body(document: &Document) -> Value {
    json!({
        "document_id": document.id,
        "filename": document.filename,
        "file_size": document.file_size,
        "file_type": document.file_type,
        "status": document.status,
        "upload_time": document.uploaded_at,
    })
}

fn parse_view(raw: &str) -> ApiResult<View> {
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("unknown view: {}", raw)))
}

fn parse_views_list(raw: Option<&str>) -> ApiResult<Option<Vec<View>>> {
    let Some(raw) = raw else { return Ok(None) };
    let mut views = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let view = parse_view(part)?;
        if !views.contains(&view) {
            views.push(view);
        }
    }
    Ok(if views.is_empty() { None } else { Some(views) })
}

fn parse_date(
    raw: Option<&str>,
    end_of_day: bool,
) -> ApiResult<Option<chrono::DateTime<chrono::Utc>>> {
    let Some(raw) = raw else { return Ok(None) };
    if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(parsed.with_timezone(&chrono::Utc)));
    }
    let date = chrono::NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| ApiError::bad_request(format!("invalid date: {}", raw)))?;
    let time = if end_of_day {
        date.and_hms_opt(23, 59, 59).unwrap_or_default()
    } else {
        date.and_hms_opt(0, 0, 0).unwrap_or_default()
    };
    Ok(Some(chrono::DateTime::from_naive_utc_and_offset(
        time,
        chrono::Utc,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_views_list() {
        let views = parse_views_list(Some("learning,qa")).unwrap().unwrap();
        assert_eq!(views, vec![View::Learning, View::Qa]);

        let deduped = parse_views_list(Some("learning, learning")).unwrap().unwrap();
        assert_eq!(deduped, vec![View::Learning]);

        assert!(parse_views_list(Some("video")).is_err());
        assert!(parse_views_list(Some("")).unwrap().is_none());
        assert!(parse_views_list(None).unwrap().is_none());
    }

    #[test]
    fn test_parse_date_forms() {
        assert!(parse_date(Some("2026-07-01"), false).unwrap().is_some());
        assert!(parse_date(Some("2026-07-01T10:00:00Z"), false).unwrap().is_some());
        assert!(parse_date(Some("yesterday"), false).is_err());
        assert!(parse_date(None, false).unwrap().is_none());

        let start = parse_date(Some("2026-07-01"), false).unwrap().unwrap();
        let end = parse_date(Some("2026-07-01"), true).unwrap().unwrap();
        assert!(end > start);
    }
}
