use actix_web::http::header::{ContentDisposition, DispositionParam, DispositionType};
use actix_web::{web, HttpResponse, ResponseError};

use crate::config::Config;
use crate::database::MongoDB;
use crate::middleware::Claims;
use crate::services::export_service::{
    self, ExportChartRequest, ExportDataRequest, ReportRequest,
};
use crate::utils::AppError;

#[utoipa::path(
    post,
    path = "/api/export-reporting/export-chart",
    tag = "Export",
    request_body = ExportChartRequest,
    responses((status = 200, description = "Chart export metadata")),
    security(("bearer_auth" = []))
)]
pub async fn export_chart(claims: web::ReqData<Claims>, request: web::Json<ExportChartRequest>) -> HttpResponse {
    log::info!("🖼️ POST /export-reporting/export-chart - user: {}", claims.user_id);

    let export = export_service::chart_export(&request, chrono::Utc::now());
    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "message": format!("Chart exported as {}", export.format.to_uppercase()),
        "data": export
    }))
}

#[utoipa::path(
    post,
    path = "/api/export-reporting/export-data",
    tag = "Export",
    request_body = ExportDataRequest,
    responses(
        (status = 200, description = "Data written to a downloadable file"),
        (status = 400, description = "Invalid data format")
    ),
    security(("bearer_auth" = []))
)]
pub async fn export_data(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    request: web::Json<ExportDataRequest>,
) -> HttpResponse {
    log::info!("📤 POST /export-reporting/export-data - user: {}", claims.user_id);

    match export_service::export_data(&db, &config, &claims.user_id, &request).await {
        Ok(file) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": format!("Data exported as {}", file.format.to_uppercase()),
            "data": file
        })),
        Err(e) => {
            log::warn!("❌ Export failed for {}: {}", claims.user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/export-reporting/download/{filename}",
    tag = "Export",
    params(("filename" = String, Path, description = "Exported file name")),
    responses(
        (status = 200, description = "File contents as an attachment"),
        (status = 400, description = "Invalid filename"),
        (status = 404, description = "File not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn download(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let filename = path.into_inner();
    log::info!("⬇️ GET /export-reporting/download/{} - user: {}", filename, claims.user_id);

    let file = match export_service::download_path(&db, &config, &claims.user_id, &filename).await {
        Ok(path) => tokio::fs::read(path)
            .await
            .map_err(|e| AppError::io("Failed to download file", e)),
        Err(e) => Err(e),
    };

    match file {
        Ok(bytes) => HttpResponse::Ok()
            .content_type(export_service::content_type_for(&filename))
            .insert_header(ContentDisposition {
                disposition: DispositionType::Attachment,
                parameters: vec![DispositionParam::Filename(filename)],
            })
            .body(bytes),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/export-reporting/generate-report",
    tag = "Export",
    request_body = ReportRequest,
    responses(
        (status = 200, description = "Report content"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_report(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<ReportRequest>,
) -> HttpResponse {
    log::info!(
        "📑 POST /export-reporting/generate-report - user: {}, type: {}",
        claims.user_id,
        request.report_type.as_deref().unwrap_or("summary")
    );

    let message = if request.format.as_deref() == Some("pdf") {
        "Comprehensive report generated"
    } else {
        "Report generated"
    };

    match export_service::generate_report(&db, &claims.user_id, &request).await {
        Ok(report) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": message,
            "data": report
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/export-reporting/export-history",
    tag = "Export",
    responses((status = 200, description = "Caller's exports, newest first")),
    security(("bearer_auth" = []))
)]
pub async fn export_history(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🕘 GET /export-reporting/export-history - user: {}", claims.user_id);

    match export_service::export_history(&db, &claims.user_id).await {
        Ok(history) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": history
        })),
        Err(e) => e.error_response(),
    }
}
