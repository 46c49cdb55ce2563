use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::time::to_rfc3339;

/// Chart kinds the client knows how to draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Scatter,
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChartType::Bar => "bar",
            ChartType::Line => "line",
            ChartType::Pie => "pie",
            ChartType::Scatter => "scatter",
        };
        write!(f, "{}", name)
    }
}

/// Saved chart selection for an uploaded file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    pub chart_id: String,
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: Option<String>,
    pub created_at: BsonDateTime,
}

/// Document in the `uploads` collection, one per stored file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadRecord {
    pub upload_id: String,
    /// Owner
    pub user_id: String,
    /// Generated on-disk name; unique and the join key to the upload directory.
    pub file_name: String,
    pub original_name: String,
    pub file_size: i64,
    #[serde(default)]
    pub chart_configs: Vec<ChartConfig>,
    pub uploaded_at: BsonDateTime,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartConfigResponse {
    pub id: String,
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: Option<String>,
    pub created_at: String,
}

impl From<&ChartConfig> for ChartConfigResponse {
    fn from(config: &ChartConfig) -> Self {
        ChartConfigResponse {
            id: config.chart_id.clone(),
            chart_type: config.chart_type,
            x_axis: config.x_axis.clone(),
            y_axis: config.y_axis.clone(),
            title: config.title.clone(),
            created_at: to_rfc3339(config.created_at),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecordResponse {
    pub id: String,
    pub file_name: String,
    pub original_name: String,
    pub file_size: i64,
    pub chart_configs: Vec<ChartConfigResponse>,
    pub uploaded_at: String,
}

impl From<&UploadRecord> for UploadRecordResponse {
    fn from(record: &UploadRecord) -> Self {
        UploadRecordResponse {
            id: record.upload_id.clone(),
            file_name: record.file_name.clone(),
            original_name: record.original_name.clone(),
            file_size: record.file_size,
            chart_configs: record.chart_configs.iter().map(ChartConfigResponse::from).collect(),
            uploaded_at: to_rfc3339(record.uploaded_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chart_type_wire_names() {
        let parsed: ChartType = serde_json::from_str("\"scatter\"").unwrap();
        assert_eq!(parsed, ChartType::Scatter);
        assert!(serde_json::from_str::<ChartType>("\"radar\"").is_err());
        assert_eq!(ChartType::Pie.to_string(), "pie");
    }

    #[test]
    fn test_record_response_is_camel_case() {
        let record = UploadRecord {
            upload_id: "u1".to_string(),
            user_id: "owner".to_string(),
            file_name: "1700000000000-file.xlsx".to_string(),
            original_name: "sales.xlsx".to_string(),
            file_size: 2048,
            chart_configs: vec![],
            uploaded_at: BsonDateTime::from_millis(0),
        };
        let json = serde_json::to_value(UploadRecordResponse::from(&record)).unwrap();
        assert_eq!(json["fileName"], "1700000000000-file.xlsx");
        assert_eq!(json["originalName"], "sales.xlsx");
        assert_eq!(json["chartConfigs"].as_array().unwrap().len(), 0);
        assert!(json.get("userId").is_none());
    }
}
