use chrono::Utc;
use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::Serialize;
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::{
    config::Config,
    database::{self, MongoDB},
    models::{ChartConfig, SharedItem, ShareLink, StoredSheet, UploadRecord},
    services::chart_service::{self, ChartRequest},
    services::spreadsheet::{self, ParsedSheet},
    utils::AppError,
};

const ALLOWED_EXTENSIONS: [&str; 2] = ["xls", "xlsx"];
const UPLOAD_FAILED: &str = "Failed to process file";

#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub headers: Vec<String>,
    #[schema(value_type = Vec<Vec<Object>>)]
    pub preview: Vec<Vec<Value>>,
    pub row_count: usize,
    pub file_name: String,
    pub original_name: String,
}

/// Extension of an accepted spreadsheet name, with its original casing.
pub fn spreadsheet_extension(original_name: &str) -> Option<&str> {
    let (_, ext) = original_name.rsplit_once('.')?;
    ALLOWED_EXTENSIONS
        .iter()
        .any(|allowed| ext.eq_ignore_ascii_case(allowed))
        .then_some(ext)
}

/// Opens `<millis>-file.<ext>` in `dir`, bumping the timestamp until the
/// name is free. `create_new` makes the claim atomic.
pub async fn create_unique_file(dir: &Path, ext: &str) -> Result<(String, fs::File), AppError> {
    let mut stamp = Utc::now().timestamp_millis();
    loop {
        let name = format!("{}-file.{}", stamp, ext);
        match OpenOptions::new().write(true).create_new(true).open(dir.join(&name)).await {
            Ok(file) => return Ok((name, file)),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => stamp += 1,
            Err(e) => return Err(AppError::io(UPLOAD_FAILED, e)),
        }
    }
}

pub async fn parse_in_background(path: PathBuf) -> Result<ParsedSheet, AppError> {
    tokio::task::spawn_blocking(move || spreadsheet::parse_file(&path))
        .await
        .map_err(|e| AppError::internal("Failed to parse file", e))?
}

async fn remove_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            log::warn!("⚠️ Could not remove {}: {}", path.display(), e);
        }
    }
}

/// Whether `path` exists. An I/O error while checking is reported as such
/// rather than as a missing file.
pub(crate) async fn file_present(path: &Path, failure: &'static str) -> Result<bool, AppError> {
    fs::try_exists(path).await.map_err(|e| AppError::io(failure, e))
}

/// Passes `result` through, removing the file at `path` when it is an error.
pub(crate) async fn discard_on_error<T>(path: &Path, result: Result<T, AppError>) -> Result<T, AppError> {
    if result.is_err() {
        remove_quietly(path).await;
    }
    result
}

/// Stores, parses and records an uploaded spreadsheet for `user_id`.
///
/// Disk is written before the database. If parsing or the record insert
/// fails the stored file (and any persisted parse result) is removed again.
/// Failing to store the parse result only costs a re-parse on retrieval.
pub async fn save_upload(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    original_name: &str,
    bytes: &[u8],
) -> Result<UploadSummary, AppError> {
    let ext = spreadsheet_extension(original_name).ok_or_else(|| {
        AppError::Validation("Only .xls and .xlsx files are allowed".to_string())
    })?;

    if bytes.len() > config.max_file_size {
        return Err(AppError::PayloadTooLarge(format!(
            "File too large. Maximum size is {} bytes",
            config.max_file_size
        )));
    }

    fs::create_dir_all(&config.upload_path)
        .await
        .map_err(|e| AppError::io(UPLOAD_FAILED, e))?;

    let (file_name, mut file) = create_unique_file(&config.upload_path, ext).await?;
    let path = config.upload_path.join(&file_name);

    let written = async {
        file.write_all(bytes).await?;
        file.flush().await
    }
    .await;
    drop(file);
    discard_on_error(&path, written.map_err(|e| AppError::io(UPLOAD_FAILED, e))).await?;

    let sheet = discard_on_error(&path, parse_in_background(path.clone()).await).await?;

    let record = UploadRecord {
        upload_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        file_name: file_name.clone(),
        original_name: original_name.to_string(),
        file_size: bytes.len() as i64,
        chart_configs: Vec::new(),
        uploaded_at: BsonDateTime::now(),
    };

    discard_on_error(&path, persist_upload(db, &record, &sheet).await).await?;

    log::info!(
        "✅ Stored {} as {} ({} rows) for user {}",
        original_name,
        file_name,
        sheet.row_count(),
        user_id
    );

    Ok(UploadSummary {
        preview: sheet.preview(),
        row_count: sheet.row_count(),
        headers: sheet.columns,
        file_name,
        original_name: original_name.to_string(),
    })
}

/// Writes the parse result chunks, replacing any left over for this name.
/// A partial write is cleared so retrieval falls back to the file on disk.
async fn store_sheet(db: &MongoDB, file_name: &str, sheet: &ParsedSheet) -> Result<(), mongodb::error::Error> {
    let sheets = db.collection::<StoredSheet>(database::PARSED_SHEETS);
    sheets.delete_many(doc! { "file_name": file_name }).await?;

    for chunk in StoredSheet::chunks(file_name, sheet) {
        if let Err(e) = sheets.insert_one(chunk).await {
            discard_sheet(db, file_name).await;
            return Err(e);
        }
    }
    Ok(())
}

async fn discard_sheet(db: &MongoDB, file_name: &str) {
    let removed = db
        .collection::<StoredSheet>(database::PARSED_SHEETS)
        .delete_many(doc! { "file_name": file_name })
        .await;
    if let Err(e) = removed {
        log::warn!("⚠️ Could not remove parsed sheet {}: {}", file_name, e);
    }
}

async fn persist_upload(db: &MongoDB, record: &UploadRecord, sheet: &ParsedSheet) -> Result<(), AppError> {
    // The stored parse is a cache over the file; retrieval re-parses without it.
    if let Err(e) = store_sheet(db, &record.file_name, sheet).await {
        log::warn!("⚠️ Could not store parse result for {}: {}", record.file_name, e);
    }

    if let Err(e) = db.collection::<UploadRecord>(database::UPLOADS).insert_one(record).await {
        discard_sheet(db, &record.file_name).await;
        return Err(AppError::database(UPLOAD_FAILED, e));
    }

    Ok(())
}

/// Caller's uploads, newest first.
pub async fn list_files(db: &MongoDB, user_id: &str) -> Result<Vec<UploadRecord>, AppError> {
    db.collection::<UploadRecord>(database::UPLOADS)
        .find(doc! { "user_id": user_id })
        .sort(doc! { "uploaded_at": -1 })
        .await
        .map_err(|e| AppError::database("Failed to fetch files", e))?
        .try_collect()
        .await
        .map_err(|e| AppError::database("Failed to fetch files", e))
}

/// Resolves `file_id` (upload id or on-disk name) among the caller's uploads.
pub async fn find_record(db: &MongoDB, user_id: &str, file_id: &str) -> Result<UploadRecord, AppError> {
    db.collection::<UploadRecord>(database::UPLOADS)
        .find_one(doc! {
            "user_id": user_id,
            "$or": [ { "upload_id": file_id }, { "file_name": file_id } ]
        })
        .await
        .map_err(|e| AppError::database("Failed to parse file", e))?
        .ok_or_else(|| AppError::NotFound("File not found in your uploads".to_string()))
}

/// Parsed contents of one of the caller's uploads.
///
/// Uses the result stored at upload time; a file without one is parsed
/// from disk and the result stored for next time.
pub async fn get_parsed(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    file_id: &str,
) -> Result<ParsedSheet, AppError> {
    let record = find_record(db, user_id, file_id).await?;
    load_sheet(db, config, &record).await
}

async fn load_sheet(db: &MongoDB, config: &Config, record: &UploadRecord) -> Result<ParsedSheet, AppError> {
    let path = config.upload_path.join(&record.file_name);

    if !file_present(&path, "Failed to parse file").await? {
        return Err(AppError::NotFound("File not found on server".to_string()));
    }

    let chunks: Vec<StoredSheet> = db
        .collection::<StoredSheet>(database::PARSED_SHEETS)
        .find(doc! { "file_name": &record.file_name })
        .sort(doc! { "chunk": 1 })
        .await
        .map_err(|e| AppError::database("Failed to parse file", e))?
        .try_collect()
        .await
        .map_err(|e| AppError::database("Failed to parse file", e))?;

    if let Some(sheet) = StoredSheet::assemble(chunks) {
        return Ok(sheet);
    }

    log::info!("🔄 No stored parse for {}, reading from disk", record.file_name);
    let sheet = parse_in_background(path).await?;

    if let Err(e) = store_sheet(db, &record.file_name, &sheet).await {
        log::warn!("⚠️ Could not store parse result for {}: {}", record.file_name, e);
    }

    Ok(sheet)
}

/// Removes the record, its parse result, shares pointing at it and the file.
pub async fn delete_file(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    file_id: &str,
) -> Result<UploadRecord, AppError> {
    let record = find_record(db, user_id, file_id).await?;
    let by_name = doc! { "file_name": &record.file_name };
    let by_item = doc! { "item_id": &record.file_name, "owner_id": user_id };

    db.collection::<UploadRecord>(database::UPLOADS)
        .delete_one(doc! { "upload_id": &record.upload_id })
        .await
        .map_err(|e| AppError::database("Failed to delete file", e))?;
    db.collection::<StoredSheet>(database::PARSED_SHEETS)
        .delete_many(by_name)
        .await
        .map_err(|e| AppError::database("Failed to delete file", e))?;
    db.collection::<SharedItem>(database::SHARED_ITEMS)
        .delete_many(by_item.clone())
        .await
        .map_err(|e| AppError::database("Failed to delete file", e))?;
    db.collection::<ShareLink>(database::SHARE_LINKS)
        .delete_many(by_item)
        .await
        .map_err(|e| AppError::database("Failed to delete file", e))?;

    remove_quietly(&config.upload_path.join(&record.file_name)).await;

    Ok(record)
}

/// Validates the axes against the file's columns and appends the config.
pub async fn add_chart_config(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    file_id: &str,
    request: &ChartRequest,
) -> Result<ChartConfig, AppError> {
    let record = find_record(db, user_id, file_id).await?;
    let sheet = load_sheet(db, config, &record).await?;
    chart_service::validate_axes(&sheet.columns, &request.x_axis, &request.y_axis)?;

    let chart = ChartConfig {
        chart_id: uuid::Uuid::new_v4().to_string(),
        chart_type: request.chart_type,
        x_axis: request.x_axis.clone(),
        y_axis: request.y_axis.clone(),
        title: request.title.clone(),
        created_at: BsonDateTime::now(),
    };

    let chart_doc = mongodb::bson::to_document(&chart)
        .map_err(|e| AppError::internal("Failed to save chart", e))?;

    db.collection::<UploadRecord>(database::UPLOADS)
        .update_one(
            doc! { "upload_id": &record.upload_id },
            doc! { "$push": { "chart_configs": chart_doc } },
        )
        .await
        .map_err(|e| AppError::database("Failed to save chart", e))?;

    Ok(chart)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::spreadsheet::tests::{sales_rows, write_fixture};

    #[test]
    fn test_extension_filter() {
        assert_eq!(spreadsheet_extension("sales.xlsx"), Some("xlsx"));
        assert_eq!(spreadsheet_extension("LEGACY.XLS"), Some("XLS"));
        assert_eq!(spreadsheet_extension("report.final.xlsx"), Some("xlsx"));
        assert_eq!(spreadsheet_extension("notes.csv"), None);
        assert_eq!(spreadsheet_extension("xlsx"), None);
        assert_eq!(spreadsheet_extension("archive.xlsx.zip"), None);
    }

    #[tokio::test]
    async fn test_unique_names_never_collide() {
        let dir = tempfile::tempdir().unwrap();
        let mut names = Vec::new();
        for _ in 0..5 {
            let (name, _file) = create_unique_file(dir.path(), "xlsx").await.unwrap();
            names.push(name);
        }

        let mut deduped = names.clone();
        deduped.sort();
        deduped.dedup();
        assert_eq!(deduped.len(), names.len());
        assert!(names.iter().all(|n| n.ends_with("-file.xlsx")));
    }

    #[tokio::test]
    async fn test_parse_in_background() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sales.xlsx");
        write_fixture(&path, &["Category", "Sales"], &sales_rows());

        let sheet = parse_in_background(path).await.unwrap();
        assert_eq!(sheet.columns, vec!["Category", "Sales"]);
        assert_eq!(sheet.row_count(), 3);
    }

    #[tokio::test]
    async fn test_failed_step_removes_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let kept = dir.path().join("kept.csv");
        let dropped = dir.path().join("dropped.csv");
        std::fs::write(&kept, "a\n").unwrap();
        std::fs::write(&dropped, "a\n").unwrap();

        assert_eq!(discard_on_error(&kept, Ok(7)).await.unwrap(), 7);
        assert!(kept.exists());

        let failed: Result<(), AppError> = Err(AppError::NotFound("gone".to_string()));
        assert!(discard_on_error(&dropped, failed).await.is_err());
        assert!(!dropped.exists());

        let missing: Result<(), AppError> = Err(AppError::NotFound("gone".to_string()));
        assert!(discard_on_error(&dropped, missing).await.is_err());
    }

    #[tokio::test]
    async fn test_existence_check_reports_io_errors() {
        use actix_web::ResponseError;

        let dir = tempfile::tempdir().unwrap();
        let plain = dir.path().join("1700000000000-file.xlsx");
        std::fs::write(&plain, b"x").unwrap();

        assert!(file_present(&plain, "Failed to parse file").await.unwrap());
        assert!(!file_present(&dir.path().join("missing.xlsx"), "Failed to parse file").await.unwrap());

        // A regular file used as a directory is an I/O error, not a missing file.
        let err = file_present(&plain.join("child.xlsx"), "Failed to parse file").await.unwrap_err();
        assert_eq!(err.status_code(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.public_message(), "Failed to parse file");
    }

    async fn test_db() -> MongoDB {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_TEST_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/excel-analytics-test".to_string());
        MongoDB::new(&uri).await.expect("MongoDB must be running")
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_upload_then_retrieve() {
        let db = test_db().await;
        let source = tempfile::tempdir().unwrap();
        let fixture = source.path().join("sales.xlsx");
        write_fixture(&fixture, &["Category", "Sales"], &sales_rows());
        let bytes = std::fs::read(&fixture).unwrap();

        let uploads = tempfile::tempdir().unwrap();
        let config = Config {
            upload_path: uploads.path().to_path_buf(),
            ..Config::default()
        };
        let user_id = mongodb::bson::oid::ObjectId::new().to_hex();

        let summary = save_upload(&db, &config, &user_id, "sales.xlsx", &bytes).await.unwrap();
        assert_eq!(summary.headers, vec!["Category", "Sales"]);
        assert_eq!(summary.preview.len(), 3);
        assert_eq!(summary.row_count, 3);
        assert_eq!(summary.original_name, "sales.xlsx");

        let first = get_parsed(&db, &config, &user_id, &summary.file_name).await.unwrap();
        let second = get_parsed(&db, &config, &user_id, &summary.file_name).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_records().len(), 3);

        let stranger = get_parsed(&db, &config, "someone-else", &summary.file_name).await.unwrap_err();
        assert_eq!(stranger.public_message(), "File not found in your uploads");

        std::fs::remove_file(uploads.path().join(&summary.file_name)).unwrap();
        let gone = get_parsed(&db, &config, &user_id, &summary.file_name).await.unwrap_err();
        assert_eq!(gone.public_message(), "File not found on server");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_large_upload_is_stored_in_chunks() {
        let db = test_db().await;
        let source = tempfile::tempdir().unwrap();
        let fixture = source.path().join("orders.xlsx");
        let rows: Vec<Vec<Value>> = (0..300_000)
            .map(|i| {
                vec![
                    serde_json::json!(i),
                    serde_json::json!(format!("Region {}", i % 17)),
                    serde_json::json!(format!("Product {}", i % 301)),
                    serde_json::json!(i % 50),
                    serde_json::json!(i as f64 * 1.25),
                ]
            })
            .collect();
        write_fixture(&fixture, &["Id", "Region", "Product", "Units", "Revenue"], &rows);
        let bytes = std::fs::read(&fixture).unwrap();

        let uploads = tempfile::tempdir().unwrap();
        let config = Config {
            upload_path: uploads.path().to_path_buf(),
            ..Config::default()
        };
        assert!(bytes.len() <= config.max_file_size);
        let user_id = mongodb::bson::oid::ObjectId::new().to_hex();

        let summary = save_upload(&db, &config, &user_id, "orders.xlsx", &bytes).await.unwrap();
        assert_eq!(summary.row_count, 300_000);

        let stored = db
            .collection::<StoredSheet>(database::PARSED_SHEETS)
            .count_documents(doc! { "file_name": &summary.file_name })
            .await
            .unwrap();
        assert!(stored > 1);

        let sheet = get_parsed(&db, &config, &user_id, &summary.file_name).await.unwrap();
        assert_eq!(sheet.row_count(), 300_000);
        assert_eq!(sheet.rows[299_999][0], serde_json::json!(299_999));

        delete_file(&db, &config, &user_id, &summary.file_name).await.unwrap();
        let left = db
            .collection::<StoredSheet>(database::PARSED_SHEETS)
            .count_documents(doc! { "file_name": &summary.file_name })
            .await
            .unwrap();
        assert_eq!(left, 0);
    }
}
