use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::time::to_rfc3339;

/// A data export written to the upload directory (`exports`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRecord {
    pub export_id: String,
    pub user_id: String,
    pub file_name: String,
    pub format: String,
    pub created_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportRecordResponse {
    pub id: String,
    pub filename: String,
    pub format: String,
    pub download_url: String,
    pub created_at: String,
}

impl From<&ExportRecord> for ExportRecordResponse {
    fn from(record: &ExportRecord) -> Self {
        ExportRecordResponse {
            id: record.export_id.clone(),
            filename: record.file_name.clone(),
            format: record.format.clone(),
            download_url: format!("/api/export-reporting/download/{}", record.file_name),
            created_at: to_rfc3339(record.created_at),
        }
    }
}
