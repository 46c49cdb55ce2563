use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Excel Analytics API",
        version = "1.0.0",
        description = "Upload Excel spreadsheets, browse their parsed contents and build charts from them.\n\n**Authentication:** Every endpoint except `/health`, register, login and public share links requires a JWT Bearer token."
    ),
    paths(
        // Auth
        crate::api::auth::register,
        crate::api::auth::login,
        crate::api::auth::get_profile,
        crate::api::auth::update_profile,
        crate::api::auth::change_password,
        crate::api::auth::list_users,
        crate::api::auth::update_user_role,
        crate::api::auth::update_user_status,

        // Health
        crate::api::health::health_check,

        // Upload
        crate::api::upload::upload_file,
        crate::api::upload::list_files,
        crate::api::upload::delete_file,
        crate::api::upload::get_parsed_file,
        crate::api::upload::build_chart,
        crate::api::upload::save_chart_config,

        // Collaboration
        crate::api::collaboration::share_item,
        crate::api::collaboration::list_shared_items,
        crate::api::collaboration::generate_link,
        crate::api::collaboration::revoke_access,
        crate::api::collaboration::create_team,
        crate::api::collaboration::list_teams,
        crate::api::collaboration::invite_to_team,
        crate::api::collaboration::get_shared_item,

        // Export & reporting
        crate::api::export_reporting::export_chart,
        crate::api::export_reporting::export_data,
        crate::api::export_reporting::download,
        crate::api::export_reporting::generate_report,
        crate::api::export_reporting::export_history,
    ),
    components(
        schemas(
            crate::services::auth_service::RegisterRequest,
            crate::services::auth_service::LoginRequest,
            crate::services::auth_service::UpdateProfileRequest,
            crate::services::auth_service::ChangePasswordRequest,
            crate::services::auth_service::UpdateRoleRequest,
            crate::services::auth_service::UpdateStatusRequest,
            crate::services::auth_service::AuthResponse,
            crate::services::auth_service::AuthData,
            crate::models::UserProfile,
            crate::models::Role,
            crate::models::ChartType,
            crate::api::health::HealthResponse,
            crate::services::upload_service::UploadSummary,
            crate::services::chart_service::ChartRequest,
            crate::services::collaboration_service::ShareRequest,
            crate::services::collaboration_service::LinkRequest,
            crate::services::collaboration_service::CreateTeamRequest,
            crate::services::collaboration_service::InviteRequest,
            crate::services::export_service::ExportChartRequest,
            crate::services::export_service::ExportDataRequest,
            crate::services::export_service::ReportRequest,
        )
    ),
    tags(
        (name = "Auth", description = "Registration, login and profile management."),
        (name = "Admin", description = "User administration. Requires the admin role."),
        (name = "Health", description = "Liveness check."),
        (name = "Upload", description = "Spreadsheet upload, parsed data retrieval and chart building."),
        (name = "Collaboration", description = "Sharing uploads with users, public links and team workspaces."),
        (name = "Export", description = "Data exports, downloads and generated reports."),
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some("Token returned by register or login"))
                        .build(),
                ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_core_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();
        for expected in ["/api/upload", "/api/upload/parsed/{file_id}", "/api/auth/login", "/health"] {
            assert!(paths.iter().any(|p| p.as_str() == expected), "missing {}", expected);
        }
    }
}
