use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::models::ChartType;
use crate::utils::AppError;

const PALETTE: [&str; 10] = [
    "#7c3aed", "#a78bfa", "#c4b5fd", "#f472b6", "#fbbf24", "#34d399", "#60a5fa", "#f87171",
    "#facc15", "#4ade80",
];
const BAR_FILL: &str = "rgba(59,130,246,0.6)";
const BORDER: &str = "#7c3aed";

#[derive(Debug, Clone, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChartRequest {
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Dataset {
    pub label: String,
    pub data: Vec<Value>,
    pub background_color: Value,
    pub border_color: String,
    pub border_width: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChartData {
    pub chart_type: ChartType,
    pub labels: Vec<Value>,
    pub datasets: Vec<Dataset>,
}

/// Both axes must be distinct columns of the sheet.
pub fn validate_axes(columns: &[String], x_axis: &str, y_axis: &str) -> Result<(), AppError> {
    if x_axis.is_empty() || y_axis.is_empty() {
        return Err(AppError::Validation("X and Y axes are required".to_string()));
    }
    if x_axis == y_axis {
        return Err(AppError::Validation("X and Y axes must be different".to_string()));
    }
    for axis in [x_axis, y_axis] {
        if !columns.iter().any(|c| c == axis) {
            return Err(AppError::Validation(format!("Unknown column: {}", axis)));
        }
    }
    Ok(())
}

pub fn build_chart(
    columns: &[String],
    records: &[Map<String, Value>],
    request: &ChartRequest,
) -> Result<ChartData, AppError> {
    validate_axes(columns, &request.x_axis, &request.y_axis)?;

    let cell = |record: &Map<String, Value>, key: &str| record.get(key).cloned().unwrap_or(Value::Null);

    let labels: Vec<Value> = records.iter().map(|r| cell(r, &request.x_axis)).collect();
    let data: Vec<Value> = match request.chart_type {
        ChartType::Scatter => records
            .iter()
            .map(|r| json!({ "x": cell(r, &request.x_axis), "y": cell(r, &request.y_axis) }))
            .collect(),
        _ => records.iter().map(|r| cell(r, &request.y_axis)).collect(),
    };

    let background_color = match request.chart_type {
        ChartType::Pie => json!(PALETTE),
        _ => json!(BAR_FILL),
    };

    Ok(ChartData {
        chart_type: request.chart_type,
        labels,
        datasets: vec![Dataset {
            label: request.title.clone().unwrap_or_else(|| request.y_axis.clone()),
            data,
            background_color,
            border_color: BORDER.to_string(),
            border_width: 1,
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sales() -> (Vec<String>, Vec<Map<String, Value>>) {
        let columns = vec!["Category".to_string(), "Sales".to_string()];
        let records = vec![
            json!({"Category": "Electronics", "Sales": 1200}),
            json!({"Category": "Books", "Sales": 340.5}),
            json!({"Category": "Toys", "Sales": 87}),
        ]
        .into_iter()
        .map(|v| serde_json::from_value(v).unwrap())
        .collect();
        (columns, records)
    }

    fn request(chart_type: ChartType, x: &str, y: &str) -> ChartRequest {
        ChartRequest {
            chart_type,
            x_axis: x.to_string(),
            y_axis: y.to_string(),
            title: None,
        }
    }

    #[test]
    fn test_bar_chart_labels_and_values() {
        let (columns, records) = sales();
        let chart = build_chart(&columns, &records, &request(ChartType::Bar, "Category", "Sales")).unwrap();

        assert_eq!(chart.labels, vec![json!("Electronics"), json!("Books"), json!("Toys")]);
        assert_eq!(chart.datasets.len(), 1);
        assert_eq!(chart.datasets[0].label, "Sales");
        assert_eq!(chart.datasets[0].data, vec![json!(1200), json!(340.5), json!(87)]);
    }

    #[test]
    fn test_identical_axes_produce_no_chart() {
        let (columns, records) = sales();
        let err = build_chart(&columns, &records, &request(ChartType::Line, "Sales", "Sales")).unwrap_err();
        assert_eq!(err.public_message(), "X and Y axes must be different");
    }

    #[test]
    fn test_unknown_axis_rejected() {
        let (columns, records) = sales();
        let err = build_chart(&columns, &records, &request(ChartType::Bar, "Region", "Sales")).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_scatter_uses_points() {
        let (columns, records) = sales();
        let chart = build_chart(&columns, &records, &request(ChartType::Scatter, "Category", "Sales")).unwrap();
        assert_eq!(chart.datasets[0].data[1], json!({"x": "Books", "y": 340.5}));
    }

    #[test]
    fn test_pie_gets_palette() {
        let (columns, records) = sales();
        let chart = build_chart(&columns, &records, &request(ChartType::Pie, "Category", "Sales")).unwrap();
        assert_eq!(chart.datasets[0].background_color.as_array().unwrap().len(), PALETTE.len());

        let json = serde_json::to_value(&chart).unwrap();
        assert_eq!(json["chartType"], "pie");
        assert_eq!(json["datasets"][0]["borderWidth"], 1);
    }
}
