use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{
    config::Config,
    database::{self, MongoDB},
    models::{ExportRecord, ExportRecordResponse, UploadRecord, UploadRecordResponse, User},
    services::{spreadsheet, upload_service},
    utils::{time, AppError},
};

const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Csv,
    Excel,
}

impl ExportFormat {
    pub fn parse(format: Option<&str>) -> Result<Self, AppError> {
        match format.unwrap_or("csv") {
            "csv" => Ok(ExportFormat::Csv),
            "excel" => Ok(ExportFormat::Excel),
            other => Err(AppError::Validation(format!("Unsupported export format: {}", other))),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "excel",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Excel => "xlsx",
        }
    }
}

/// Only the format matters; the chart itself is rendered by the client.
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ExportChartRequest {
    pub format: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct ExportDataRequest {
    #[schema(value_type = Object)]
    pub data: Option<Value>,
    pub format: Option<String>,
    pub filename: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub report_type: Option<String>,
    #[schema(value_type = Object)]
    pub selected_charts: Option<Value>,
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ChartExport {
    pub format: String,
    pub timestamp: String,
    pub filename: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedFile {
    pub filename: String,
    pub format: String,
    pub download_url: String,
    pub timestamp: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportHistory {
    pub exports: Vec<ExportRecordResponse>,
    pub total_exports: usize,
}

/// Metadata for a chart image export. Rendering happens client-side.
pub fn chart_export(request: &ExportChartRequest, now: DateTime<Utc>) -> ChartExport {
    let format = request
        .format
        .as_deref()
        .filter(|f| !f.is_empty())
        .unwrap_or("png")
        .to_lowercase();

    ChartExport {
        filename: format!("chart-{}.{}", now.timestamp_millis(), format),
        timestamp: now.to_rfc3339(),
        format,
    }
}

/// Keeps `[A-Za-z0-9_-]` from a requested base name.
pub fn sanitize_base_name(name: Option<&str>) -> String {
    let cleaned: String = name
        .unwrap_or_default()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect();
    if cleaned.is_empty() {
        "export".to_string()
    } else {
        cleaned
    }
}

/// Header row (keys in first-appearance order) and aligned value rows.
pub fn tabulate(data: &Value) -> Result<(Vec<String>, Vec<Vec<Value>>), AppError> {
    let invalid = || AppError::Validation("Invalid data format".to_string());
    let items = data.as_array().ok_or_else(invalid)?;

    let records: Vec<Map<String, Value>> = items
        .iter()
        .map(|item| item.as_object().cloned().ok_or_else(invalid))
        .collect::<Result<_, _>>()?;

    let columns = spreadsheet::record_columns(&records);
    let rows = records
        .iter()
        .map(|record| {
            columns
                .iter()
                .map(|c| record.get(c).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok((columns, rows))
}

pub async fn export_data(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    request: &ExportDataRequest,
) -> Result<ExportedFile, AppError> {
    let data = request
        .data
        .as_ref()
        .ok_or_else(|| AppError::Validation("Invalid data format".to_string()))?;
    let (columns, rows) = tabulate(data)?;
    let format = ExportFormat::parse(request.format.as_deref())?;

    let bytes = match format {
        ExportFormat::Csv => spreadsheet::write_csv(&columns, &rows).into_bytes(),
        ExportFormat::Excel => {
            tokio::task::spawn_blocking(move || spreadsheet::write_xlsx("Data", &columns, &rows))
                .await
                .map_err(|e| AppError::internal("Failed to export data", e))??
        }
    };

    fs::create_dir_all(&config.upload_path)
        .await
        .map_err(|e| AppError::io("Failed to export data", e))?;

    let base = sanitize_base_name(request.filename.as_deref());
    let mut stamp = Utc::now().timestamp_millis();
    let (file_name, mut file) = loop {
        let name = format!("{}-{}.{}", base, stamp, format.extension());
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(config.upload_path.join(&name))
            .await
        {
            Ok(file) => break (name, file),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(AppError::io("Failed to export data", e)),
        }
    };

    let path = config.upload_path.join(&file_name);
    let written = async {
        file.write_all(&bytes).await?;
        file.flush().await
    }
    .await;
    drop(file);
    upload_service::discard_on_error(&path, written.map_err(|e| AppError::io("Failed to export data", e))).await?;

    let record = ExportRecord {
        export_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        file_name: file_name.clone(),
        format: format.name().to_string(),
        created_at: BsonDateTime::now(),
    };

    // Unrecorded exports can never be downloaded.
    let inserted = db
        .collection::<ExportRecord>(database::EXPORTS)
        .insert_one(&record)
        .await
        .map_err(|e| AppError::database("Failed to export data", e));
    upload_service::discard_on_error(&path, inserted).await?;

    log::info!("📤 Exported {} rows to {}", data.as_array().map_or(0, Vec::len), file_name);

    let response = ExportRecordResponse::from(&record);
    Ok(ExportedFile {
        filename: response.filename,
        format: response.format,
        download_url: response.download_url,
        timestamp: response.created_at,
    })
}

/// A bare file name inside the upload directory, or a validation error.
pub fn validate_download_name(filename: &str) -> Result<&str, AppError> {
    if filename.is_empty()
        || filename.contains('/')
        || filename.contains('\\')
        || filename.contains("..")
        || filename.contains('\0')
    {
        return Err(AppError::Validation("Invalid filename".to_string()));
    }
    Ok(filename)
}

pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename.rsplit_once('.').map(|(_, e)| e.to_ascii_lowercase());
    match ext.as_deref() {
        Some("csv") => "text/csv",
        Some("xlsx") => XLSX_MIME,
        _ => "application/octet-stream",
    }
}

/// Path of one of the caller's exports.
pub async fn download_path(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    filename: &str,
) -> Result<PathBuf, AppError> {
    let filename = validate_download_name(filename)?;
    let not_found = || AppError::NotFound("File not found".to_string());

    db.collection::<ExportRecord>(database::EXPORTS)
        .find_one(doc! { "user_id": user_id, "file_name": filename })
        .await
        .map_err(|e| AppError::database("Failed to download file", e))?
        .ok_or_else(not_found)?;

    let path = config.upload_path.join(filename);
    if !upload_service::file_present(&path, "Failed to download file").await? {
        return Err(not_found());
    }
    Ok(path)
}

pub async fn export_history(db: &MongoDB, user_id: &str) -> Result<ExportHistory, AppError> {
    let records: Vec<ExportRecord> = db
        .collection::<ExportRecord>(database::EXPORTS)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "created_at": -1 })
        .await
        .map_err(|e| AppError::database("Failed to get export history", e))?
        .try_collect()
        .await
        .map_err(|e| AppError::database("Failed to get export history", e))?;

    Ok(ExportHistory {
        total_exports: records.len(),
        exports: records.iter().map(ExportRecordResponse::from).collect(),
    })
}

fn total_charts(uploads: &[UploadRecord]) -> usize {
    uploads.iter().map(|u| u.chart_configs.len()).sum()
}

/// Month with the most uploads, e.g. "March 2025". Ties go to the earliest.
fn most_active_month(uploads: &[UploadRecord]) -> String {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for upload in uploads {
        let month = time::to_chrono(upload.uploaded_at).format("%B %Y").to_string();
        match counts.iter_mut().find(|(m, _)| *m == month) {
            Some((_, count)) => *count += 1,
            None => counts.push((month, 1)),
        }
    }

    let mut best: Option<&(String, usize)> = None;
    for entry in &counts {
        if best.map_or(true, |(_, count)| entry.1 > *count) {
            best = Some(entry);
        }
    }
    best.map(|(m, _)| m.clone()).unwrap_or_else(|| "No data".to_string())
}

fn chart_type_distribution(uploads: &[UploadRecord]) -> Map<String, Value> {
    let mut distribution = Map::new();
    for chart in uploads.iter().flat_map(|u| u.chart_configs.iter()) {
        let entry = distribution.entry(chart.chart_type.to_string()).or_insert(json!(0));
        *entry = json!(entry.as_u64().unwrap_or(0) + 1);
    }
    distribution
}

/// "High" above 0.5 files a day since sign-up, "Medium" above 0.1.
fn engagement(user: &User, file_count: usize, now: DateTime<Utc>) -> &'static str {
    let days = (now - time::to_chrono(user.created_at)).num_days();
    let files_per_day = if days > 0 { file_count as f64 / days as f64 } else { 0.0 };

    if files_per_day > 0.5 {
        "High"
    } else if files_per_day > 0.1 {
        "Medium"
    } else {
        "Low"
    }
}

pub fn build_report(
    user: &User,
    uploads: &[UploadRecord],
    report_type: &str,
    selected_charts: Option<&Value>,
    now: DateTime<Utc>,
) -> Value {
    let file_count = uploads.len();
    let chart_count = total_charts(uploads);

    let analysis = match report_type {
        "summary" => json!({
            "type": "Summary Report",
            "description": "Overview of uploaded files and basic analytics",
            "highlights": [
                format!("Total files uploaded: {}", file_count),
                format!("Total charts created: {}", chart_count),
                format!("User since: {}", time::to_chrono(user.created_at).format("%Y-%m-%d")),
            ]
        }),
        "detailed" => json!({
            "type": "Detailed Analysis",
            "description": "Comprehensive analysis of all uploaded data",
            "fileDetails": uploads.iter().map(|u| json!({
                "name": u.original_name,
                "size": u.file_size,
                "uploadDate": time::to_rfc3339(u.uploaded_at),
                "charts": u.chart_configs.len(),
            })).collect::<Vec<_>>()
        }),
        "comprehensive" => {
            let average_size = if file_count > 0 {
                uploads.iter().map(|u| u.file_size as f64).sum::<f64>() / file_count as f64
            } else {
                0.0
            };
            json!({
                "type": "Comprehensive Report",
                "description": "Complete analysis with statistical insights",
                "statistics": {
                    "averageFileSize": average_size,
                    "mostActiveMonth": most_active_month(uploads),
                    "chartTypes": chart_type_distribution(uploads),
                }
            })
        }
        "executive" => {
            let charts_per_file = if file_count > 0 {
                chart_count as f64 / file_count as f64
            } else {
                0.0
            };
            json!({
                "type": "Executive Summary",
                "description": "High-level overview for executive review",
                "keyMetrics": {
                    "totalDataProcessed": file_count,
                    "averageChartsPerFile": charts_per_file,
                    "userEngagement": engagement(user, file_count, now),
                }
            })
        }
        _ => json!({}),
    };

    json!({
        "title": "Excel Analytics Platform Report",
        "generatedAt": now.to_rfc3339(),
        "user": { "username": user.username, "email": user.email },
        "summary": {
            "totalFiles": file_count,
            "totalCharts": chart_count,
            "reportType": report_type,
        },
        "files": uploads.iter().map(UploadRecordResponse::from).collect::<Vec<_>>(),
        "charts": selected_charts.cloned().unwrap_or_else(|| json!([])),
        "analysis": analysis,
    })
}

pub async fn generate_report(db: &MongoDB, user_id: &str, request: &ReportRequest) -> Result<Value, AppError> {
    let user = db
        .collection::<User>(database::USERS)
        .find_one(doc! { "user_id": user_id })
        .await
        .map_err(|e| AppError::database("Failed to generate report", e))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let uploads: Vec<UploadRecord> = db
        .collection::<UploadRecord>(database::UPLOADS)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "uploaded_at": 1 })
        .await
        .map_err(|e| AppError::database("Failed to generate report", e))?
        .try_collect()
        .await
        .map_err(|e| AppError::database("Failed to generate report", e))?;

    let now = Utc::now();
    let report_type = request.report_type.as_deref().unwrap_or("summary");
    let report = build_report(&user, &uploads, report_type, request.selected_charts.as_ref(), now);

    if request.format.as_deref() == Some("pdf") {
        return Ok(json!({
            "reportType": report_type,
            "content": report,
            "timestamp": now.to_rfc3339(),
            "filename": format!("comprehensive-report-{}.pdf", now.timestamp_millis()),
        }));
    }

    Ok(report)
}
