pub mod auth;
pub mod collaboration;
pub mod export_reporting;
pub mod health;
pub mod placeholders;
pub mod swagger;
pub mod upload;
