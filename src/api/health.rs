use actix_web::{web, HttpRequest, HttpResponse, Responder};
use serde::{Deserialize, Serialize};

use crate::config::Config;

#[derive(Serialize, Deserialize, utoipa::ToSchema)]
pub struct HealthResponse {
    pub success: bool,
    pub message: String,
    pub timestamp: String,
    pub environment: String,
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(config: web::Data<Config>) -> impl Responder {
    HttpResponse::Ok().json(HealthResponse {
        success: true,
        message: "Excel Analytics API is running".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
        environment: config.environment.clone(),
    })
}

/// Fallback for unmatched routes.
pub async fn not_found(req: HttpRequest) -> HttpResponse {
    HttpResponse::NotFound().json(serde_json::json!({
        "success": false,
        "message": format!("Route {} not found", req.path())
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test, App};

    #[actix_rt::test]
    async fn test_health_reports_environment() {
        let config = Config {
            environment: "test".to_string(),
            ..Config::default()
        };
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .route("/health", web::get().to(health_check)),
        )
        .await;

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: HealthResponse = test::call_and_read_body_json(&app, req).await;
        assert!(body.success);
        assert_eq!(body.environment, "test");
    }

    #[actix_rt::test]
    async fn test_unknown_route_message() {
        let app = test::init_service(App::new().default_service(web::to(not_found))).await;

        let req = test::TestRequest::get().uri("/api/nope").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        let body: serde_json::Value = test::read_body_json(resp).await;
        assert_eq!(body["message"], "Route /api/nope not found");
    }
}
