use actix_multipart::Multipart;
use actix_web::{web, HttpResponse, ResponseError};
use futures::StreamExt;

use crate::config::Config;
use crate::database::MongoDB;
use crate::middleware::Claims;
use crate::models::{ChartConfigResponse, UploadRecordResponse};
use crate::services::chart_service::{self, ChartRequest};
use crate::services::upload_service::{self, UploadSummary};
use crate::utils::AppError;

const FILE_FIELD: &str = "file";

/// Reads the `file` field of a multipart body, enforcing the extension
/// filter before buffering and the size limit while buffering.
pub async fn read_file_field(payload: &mut Multipart, limit: usize) -> Result<(String, Vec<u8>), AppError> {
    while let Some(item) = payload.next().await {
        let mut field = item.map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;

        let (name, filename) = match field.content_disposition() {
            Some(cd) => (cd.get_name().map(String::from), cd.get_filename().map(String::from)),
            None => (None, None),
        };

        let original_name = match (name.as_deref(), filename) {
            (Some(FILE_FIELD), Some(filename)) if !filename.is_empty() => filename,
            _ => {
                while let Some(chunk) = field.next().await {
                    chunk.map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;
                }
                continue;
            }
        };

        if upload_service::spreadsheet_extension(&original_name).is_none() {
            return Err(AppError::Validation("Only .xls and .xlsx files are allowed".to_string()));
        }

        let mut bytes = Vec::new();
        while let Some(chunk) = field.next().await {
            let chunk = chunk.map_err(|e| AppError::Validation(format!("Invalid upload: {}", e)))?;
            if bytes.len() + chunk.len() > limit {
                return Err(AppError::PayloadTooLarge(format!(
                    "File too large. Maximum size is {} bytes",
                    limit
                )));
            }
            bytes.extend_from_slice(&chunk);
        }

        return Ok((original_name, bytes));
    }

    Err(AppError::Validation("No file uploaded".to_string()))
}

#[utoipa::path(
    post,
    path = "/api/upload",
    tag = "Upload",
    request_body(content = String, content_type = "multipart/form-data", description = "Spreadsheet in field `file`"),
    responses(
        (status = 200, description = "File uploaded and parsed", body = UploadSummary),
        (status = 400, description = "No file or wrong extension"),
        (status = 413, description = "File too large"),
        (status = 500, description = "Failed to process file")
    ),
    security(("bearer_auth" = []))
)]
pub async fn upload_file(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    mut payload: Multipart,
) -> HttpResponse {
    log::info!("📤 POST /upload - user: {}", claims.user_id);

    let result = match read_file_field(&mut payload, config.max_file_size).await {
        Ok((original_name, bytes)) => {
            upload_service::save_upload(&db, &config, &claims.user_id, &original_name, &bytes).await
        }
        Err(e) => Err(e),
    };

    match result {
        Ok(summary) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "File uploaded and parsed",
            "data": summary
        })),
        Err(e) => {
            log::warn!("❌ Upload failed for {}: {}", claims.user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/upload/files",
    tag = "Upload",
    responses(
        (status = 200, description = "Caller's uploads, newest first")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_files(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📁 GET /upload/files - user: {}", claims.user_id);

    match upload_service::list_files(&db, &claims.user_id).await {
        Ok(records) => {
            let files: Vec<UploadRecordResponse> = records.iter().map(UploadRecordResponse::from).collect();
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "files": files
            }))
        }
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/upload/files/{file_id}",
    tag = "Upload",
    params(("file_id" = String, Path, description = "Upload ID or stored file name")),
    responses(
        (status = 200, description = "File deleted"),
        (status = 404, description = "File not found in your uploads")
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_file(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let file_id = path.into_inner();
    log::info!("🗑️ DELETE /upload/files/{} - user: {}", file_id, claims.user_id);

    match upload_service::delete_file(&db, &config, &claims.user_id, &file_id).await {
        Ok(record) => {
            log::info!("✅ Deleted {}", record.file_name);
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "message": "File deleted successfully"
            }))
        }
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/upload/parsed/{file_id}",
    tag = "Upload",
    params(("file_id" = String, Path, description = "Upload ID or stored file name")),
    responses(
        (status = 200, description = "Columns and column-keyed rows"),
        (status = 404, description = "File not in your uploads or missing on the server"),
        (status = 500, description = "Failed to parse file")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_parsed_file(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let file_id = path.into_inner();
    log::info!("📊 GET /upload/parsed/{} - user: {}", file_id, claims.user_id);

    match upload_service::get_parsed(&db, &config, &claims.user_id, &file_id).await {
        Ok(sheet) => {
            let data = sheet.to_records();
            HttpResponse::Ok().json(serde_json::json!({
                "success": true,
                "columns": sheet.columns,
                "data": data
            }))
        }
        Err(e) => {
            log::warn!("❌ Parsed lookup failed for {}: {}", file_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/upload/parsed/{file_id}/chart",
    tag = "Upload",
    params(("file_id" = String, Path, description = "Upload ID or stored file name")),
    request_body = ChartRequest,
    responses(
        (status = 200, description = "Chart labels and datasets"),
        (status = 400, description = "Axes identical or unknown")
    ),
    security(("bearer_auth" = []))
)]
pub async fn build_chart(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ChartRequest>,
) -> HttpResponse {
    let file_id = path.into_inner();
    log::info!(
        "📈 POST /upload/parsed/{}/chart - {} {} x {}",
        file_id,
        request.chart_type,
        request.x_axis,
        request.y_axis
    );

    let chart = match upload_service::get_parsed(&db, &config, &claims.user_id, &file_id).await {
        Ok(sheet) => chart_service::build_chart(&sheet.columns, &sheet.to_records(), &request),
        Err(e) => Err(e),
    };

    match chart {
        Ok(chart) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": chart
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/upload/files/{file_id}/charts",
    tag = "Upload",
    params(("file_id" = String, Path, description = "Upload ID or stored file name")),
    request_body = ChartRequest,
    responses(
        (status = 201, description = "Chart configuration saved"),
        (status = 400, description = "Axes identical or unknown"),
        (status = 404, description = "File not found in your uploads")
    ),
    security(("bearer_auth" = []))
)]
pub async fn save_chart_config(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<ChartRequest>,
) -> HttpResponse {
    let file_id = path.into_inner();
    log::info!("💾 POST /upload/files/{}/charts - user: {}", file_id, claims.user_id);

    match upload_service::add_chart_config(&db, &config, &claims.user_id, &file_id, &request).await {
        Ok(chart) => HttpResponse::Created().json(serde_json::json!({
            "success": true,
            "message": "Chart configuration saved",
            "data": ChartConfigResponse::from(&chart)
        })),
        Err(e) => e.error_response(),
    }
}
