mod api;
mod config;
mod database;
mod middleware;
mod models;
mod services;
mod utils;

use actix_cors::Cors;
use actix_web::{middleware::Logger, web, App, HttpServer};
use dotenv::dotenv;
use std::time::Duration;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::middleware::{AuthMiddleware, RateLimit};
use crate::utils::AppError;

/// Register and login share this budget per client.
const AUTH_ATTEMPTS: u32 = 5;
const AUTH_WINDOW: Duration = Duration::from_secs(15 * 60);
const JSON_LIMIT: usize = 10 * 1024 * 1024;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // Load environment variables
    dotenv().ok();

    // Initialize logger
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    let config = config::Config::from_env();

    log::info!("🚀 Starting Excel Analytics API ({})...", config.environment);
    log::info!("📊 Database: {}", config.mongodb_uri);

    std::fs::create_dir_all(&config.upload_path)?;
    log::info!("📁 Upload directory: {}", config.upload_path.display());

    // Initialize MongoDB connection
    let db = match database::MongoDB::new(&config.mongodb_uri).await {
        Ok(db) => db,
        Err(e) => {
            log::error!("❌ Failed to connect to MongoDB: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    log::info!("✅ MongoDB connected successfully");

    let db_data = web::Data::new(db);
    let config_data = web::Data::new(config.clone());

    log::info!("🌐 Server starting on {}:{}", config.host, config.port);
    log::info!("📚 Swagger UI available at: http://{}:{}/swagger-ui/", config.host, config.port);
    log::info!("📄 OpenAPI spec at: http://{}:{}/api-docs/openapi.json", config.host, config.port);

    let bind_addr = (config.host.clone(), config.port);

    // Start HTTP server
    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&config.frontend_url)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![
                actix_web::http::header::AUTHORIZATION,
                actix_web::http::header::CONTENT_TYPE,
                actix_web::http::header::ACCEPT,
            ])
            .expose_headers(vec![
                actix_web::http::header::CONTENT_DISPOSITION,
            ])
            .supports_credentials()
            .max_age(3600);

        let json_config = web::JsonConfig::default()
            .limit(JSON_LIMIT)
            .error_handler(|err, _req| AppError::Validation(err.to_string()).into());

        let global_limit = RateLimit::new(
            "global",
            config.rate_limit_max_requests,
            Duration::from_secs(config.rate_limit_window_secs),
        );

        // Generate OpenAPI specification
        let openapi = api::swagger::ApiDoc::openapi();

        App::new()
            .app_data(db_data.clone())
            .app_data(config_data.clone())
            .app_data(json_config)
            .wrap(global_limit)
            .wrap(cors)
            .wrap(middleware::SecurityHeaders)
            .wrap(Logger::default())
            .service(
                SwaggerUi::new("/swagger-ui/{_:.*}")
                    .url("/api-docs/openapi.json", openapi)
            )
            // Health check
            .route("/health", web::get().to(api::health::health_check))

            // Auth: public register/login, protected profile, admin user management
            .service(
                web::scope("/api/auth")
                    .service(
                        web::resource("/register")
                            .wrap(RateLimit::new("auth", AUTH_ATTEMPTS, AUTH_WINDOW))
                            .route(web::post().to(api::auth::register))
                    )
                    .service(
                        web::resource("/login")
                            .wrap(RateLimit::new("auth", AUTH_ATTEMPTS, AUTH_WINDOW))
                            .route(web::post().to(api::auth::login))
                    )
                    .service(
                        web::resource("/profile")
                            .wrap(AuthMiddleware::user())
                            .route(web::get().to(api::auth::get_profile))
                            .route(web::put().to(api::auth::update_profile))
                    )
                    .service(
                        web::resource("/change-password")
                            .wrap(AuthMiddleware::user())
                            .route(web::put().to(api::auth::change_password))
                    )
                    .service(
                        web::scope("/users")
                            .wrap(AuthMiddleware::admin())
                            .route("", web::get().to(api::auth::list_users))
                            .route("/{user_id}/role", web::put().to(api::auth::update_user_role))
                            .route("/{user_id}/status", web::put().to(api::auth::update_user_status))
                    )
            )

            // Upload: storage, parsed data and charts
            .service(
                web::scope("/api/upload")
                    .wrap(AuthMiddleware::user())
                    .route("", web::post().to(api::upload::upload_file))
                    .route("/files", web::get().to(api::upload::list_files))
                    .route("/files/{file_id}", web::delete().to(api::upload::delete_file))
                    .route("/files/{file_id}/charts", web::post().to(api::upload::save_chart_config))
                    .route("/parsed/{file_id}", web::get().to(api::upload::get_parsed_file))
                    .route("/parsed/{file_id}/chart", web::post().to(api::upload::build_chart))
            )

            // Collaboration: public share links first, everything else needs a token
            .service(
                web::scope("/api/collaboration/shared")
                    .route("/{token}", web::get().to(api::collaboration::get_shared_item))
            )
            .service(
                web::scope("/api/collaboration")
                    .wrap(AuthMiddleware::user())
                    .route("/share", web::post().to(api::collaboration::share_item))
                    .route("/shared-items", web::get().to(api::collaboration::list_shared_items))
                    .route("/shared-items/{share_id}", web::delete().to(api::collaboration::revoke_access))
                    .route("/generate-link", web::post().to(api::collaboration::generate_link))
                    .route("/teams", web::post().to(api::collaboration::create_team))
                    .route("/teams", web::get().to(api::collaboration::list_teams))
                    .route("/teams/{team_id}/invite", web::post().to(api::collaboration::invite_to_team))
            )

            // Export & reporting
            .service(
                web::scope("/api/export-reporting")
                    .wrap(AuthMiddleware::user())
                    .route("/export-chart", web::post().to(api::export_reporting::export_chart))
                    .route("/export-data", web::post().to(api::export_reporting::export_data))
                    .route("/download/{filename}", web::get().to(api::export_reporting::download))
                    .route("/generate-report", web::post().to(api::export_reporting::generate_report))
                    .route("/export-history", web::get().to(api::export_reporting::export_history))
            )

            // Stub feature namespaces
            .configure(api::placeholders::configure)

            .default_service(web::to(api::health::not_found))
    })
    .bind(bind_addr)?
    .run()
    .await
}
