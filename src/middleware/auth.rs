use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    http::header::{HeaderMap, AUTHORIZATION},
    web, Error, HttpMessage,
};
use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};
use std::future::{ready, Ready};

use crate::config::Config;
use crate::models::Role;
use crate::services::auth_service;
use crate::utils::AppError;

/// JWT payload; also attached to authenticated requests.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    pub user_id: String,
    pub role: Role,
    pub iat: usize,
    pub exp: usize,
}

/// Rejects requests without a valid bearer token (401) and, for the admin
/// variant, tokens whose role is not `admin` (403).
pub struct AuthMiddleware {
    require_admin: bool,
}

impl AuthMiddleware {
    pub fn user() -> Self {
        AuthMiddleware { require_admin: false }
    }

    pub fn admin() -> Self {
        AuthMiddleware { require_admin: true }
    }
}

impl<S, B> Transform<S, ServiceRequest> for AuthMiddleware
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = AuthMiddlewareService<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(AuthMiddlewareService {
            service,
            require_admin: self.require_admin,
        }))
    }
}

pub struct AuthMiddlewareService<S> {
    service: S,
    require_admin: bool,
}

impl<S, B> Service<ServiceRequest> for AuthMiddlewareService<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        match authorize(&req, self.require_admin) {
            Ok(claims) => {
                req.extensions_mut().insert(claims);
                let fut = self.service.call(req);
                Box::pin(async move { fut.await })
            }
            Err(e) => {
                log::warn!("🔒 {} {} rejected: {}", req.method(), req.path(), e);
                Box::pin(async move { Err(e.into()) })
            }
        }
    }
}

fn authorize(req: &ServiceRequest, require_admin: bool) -> Result<Claims, AppError> {
    let config = req
        .app_data::<web::Data<Config>>()
        .ok_or_else(|| AppError::internal("Server configuration error", "Config missing from app data"))?;

    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthorized("Access token required".to_string()))?;

    let claims = auth_service::verify_token(token, &config.jwt_secret)
        .map_err(|_| AppError::Unauthorized("Invalid or expired token".to_string()))?;

    if require_admin && claims.role != Role::Admin {
        return Err(AppError::Forbidden("Admin access required".to_string()));
    }

    Ok(claims)
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test as actix_test, App, HttpResponse};

    async fn whoami(claims: web::ReqData<Claims>) -> HttpResponse {
        HttpResponse::Ok().json(serde_json::json!({ "userId": claims.user_id }))
    }

    fn test_config() -> Config {
        Config {
            jwt_secret: "middleware-test-secret".to_string(),
            ..Config::default()
        }
    }

    fn token_for(role: Role, config: &Config) -> String {
        auth_service::generate_token("507f1f77bcf86cd799439011", role, config).unwrap()
    }

    async fn status_of<S, R, B>(app: &S, req: R) -> StatusCode
    where
        S: Service<R, Response = ServiceResponse<B>, Error = Error>,
    {
        match actix_test::try_call_service(app, req).await {
            Ok(resp) => resp.status(),
            Err(e) => e.as_response_error().status_code(),
        }
    }

    #[actix_rt::test]
    async fn test_user_and_admin_gates() {
        let config = test_config();
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(config.clone()))
                .service(web::scope("/me").wrap(AuthMiddleware::user()).route("", web::get().to(whoami)))
                .service(web::scope("/admin").wrap(AuthMiddleware::admin()).route("", web::get().to(whoami))),
        )
        .await;

        let user_token = token_for(Role::User, &config);
        let admin_token = token_for(Role::Admin, &config);
        let bearer = |t: &str| ("Authorization", format!("Bearer {}", t));

        assert_eq!(status_of(&app, actix_test::TestRequest::get().uri("/me").to_request()).await, StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(&app, actix_test::TestRequest::get().uri("/me").insert_header(bearer("garbage")).to_request()).await,
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(&app, actix_test::TestRequest::get().uri("/me").insert_header(bearer(&user_token)).to_request()).await,
            StatusCode::OK
        );
        assert_eq!(
            status_of(&app, actix_test::TestRequest::get().uri("/admin").insert_header(bearer(&user_token)).to_request()).await,
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(&app, actix_test::TestRequest::get().uri("/admin").insert_header(bearer(&admin_token)).to_request()).await,
            StatusCode::OK
        );
    }

    #[actix_rt::test]
    async fn test_token_signed_with_other_secret_is_rejected() {
        let config = test_config();
        let other = Config {
            jwt_secret: "someone-else".to_string(),
            ..Config::default()
        };
        let app = actix_test::init_service(
            App::new()
                .app_data(web::Data::new(config))
                .service(web::scope("/me").wrap(AuthMiddleware::user()).route("", web::get().to(whoami))),
        )
        .await;

        let forged = token_for(Role::Admin, &other);
        let req = actix_test::TestRequest::get()
            .uri("/me")
            .insert_header(("Authorization", format!("Bearer {}", forged)))
            .to_request();
        assert_eq!(status_of(&app, req).await, StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Basic abc".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer ".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);

        headers.insert(AUTHORIZATION, "Bearer abc.def.ghi".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
    }
}
