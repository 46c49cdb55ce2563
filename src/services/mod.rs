pub mod auth_service;
pub mod chart_service;
pub mod collaboration_service;
pub mod export_service;
pub mod spreadsheet;
pub mod upload_service;
