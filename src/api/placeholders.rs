use actix_web::{web, HttpResponse};

use crate::middleware::{AuthMiddleware, Claims};

/// Feature namespaces that only expose a stub endpoint so far.
pub const NAMESPACES: [(&str, &str); 9] = [
    ("data-cleaning", "Data cleaning"),
    ("advanced-analytics", "Advanced analytics"),
    ("ai-features", "AI features"),
    ("notifications", "Notifications"),
    ("security-compliance", "Security & compliance"),
    ("performance", "Performance"),
    ("data-integration", "Data integration"),
    ("user-experience", "User experience"),
    ("settings", "Settings"),
];

async fn placeholder(namespace: &'static str, feature: &'static str, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("🚧 GET /{}/placeholder - user: {}", namespace, claims.user_id);

    HttpResponse::Ok().json(serde_json::json!({
        "success": true,
        "feature": namespace,
        "message": format!("{} feature coming soon", feature),
        "data": []
    }))
}

/// Mounts `GET /api/<namespace>/placeholder` for every stub namespace.
pub fn configure(cfg: &mut web::ServiceConfig) {
    for (namespace, feature) in NAMESPACES {
        cfg.service(
            web::scope(&format!("/api/{}", namespace))
                .wrap(AuthMiddleware::user())
                .route(
                    "/placeholder",
                    web::get().to(move |claims: web::ReqData<Claims>| placeholder(namespace, feature, claims)),
                ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::models::Role;
    use crate::services::auth_service;
    use actix_web::{http::StatusCode, test, App};

    #[actix_rt::test]
    async fn test_every_namespace_requires_auth_and_answers() {
        let config = Config::default();
        let token = auth_service::generate_token("507f1f77bcf86cd799439011", Role::User, &config).unwrap();
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .configure(configure),
        )
        .await;

        for (namespace, _) in NAMESPACES {
            let uri = format!("/api/{}/placeholder", namespace);

            let anonymous = test::TestRequest::get().uri(&uri).to_request();
            let err = test::try_call_service(&app, anonymous).await.unwrap_err();
            assert_eq!(err.as_response_error().status_code(), StatusCode::UNAUTHORIZED);

            let req = test::TestRequest::get()
                .uri(&uri)
                .insert_header(("Authorization", format!("Bearer {}", token)))
                .to_request();
            let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
            assert_eq!(body["success"], true);
            assert_eq!(body["feature"], namespace);
        }
    }
}
