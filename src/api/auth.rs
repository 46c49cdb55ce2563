use actix_web::{web, HttpResponse, ResponseError};

use crate::config::Config;
use crate::middleware::Claims;
use crate::services::auth_service::{
    self, AuthResponse, ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest,
    UpdateRoleRequest, UpdateStatusRequest,
};
use crate::{database::MongoDB, models::UserProfile};

#[utoipa::path(
    post,
    path = "/api/auth/register",
    tag = "Auth",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Registration successful", body = AuthResponse),
        (status = 400, description = "Missing fields, invalid role or user already exists"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn register(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    request: web::Json<RegisterRequest>,
) -> HttpResponse {
    let email_str = request.email.as_deref().unwrap_or("N/A");
    log::info!("📝 POST /auth/register - email: {}", email_str);

    match auth_service::register(&db, &config, &request).await {
        Ok(response) => {
            log::info!("✅ Registration successful: {}", email_str);
            HttpResponse::Created().json(response)
        }
        Err(e) => {
            log::warn!("❌ Registration failed: {} - {}", email_str, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "Auth",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 401, description = "Invalid credentials or deactivated account"),
        (status = 429, description = "Too many attempts")
    )
)]
pub async fn login(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    request: web::Json<LoginRequest>,
) -> HttpResponse {
    log::info!("🔐 POST /auth/login - email: {}", request.email);

    match auth_service::login(&db, &config, &request).await {
        Ok(response) => {
            log::info!("✅ Login successful: {}", request.email);
            HttpResponse::Ok().json(response)
        }
        Err(e) => {
            log::warn!("❌ Login failed: {} - {}", request.email, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/profile",
    tag = "Auth",
    responses(
        (status = 200, description = "Current user profile", body = UserProfile),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_profile(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("👤 GET /auth/profile - user: {}", claims.user_id);

    match auth_service::get_profile(&db, &claims.user_id).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": { "user": user }
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/profile",
    tag = "Auth",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Profile updated", body = UserProfile),
        (status = 400, description = "Email or username already in use")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<UpdateProfileRequest>,
) -> HttpResponse {
    log::info!("✏️ PUT /auth/profile - user: {}", claims.user_id);

    match auth_service::update_profile(&db, &claims.user_id, &request).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Profile updated successfully",
            "data": { "user": user }
        })),
        Err(e) => {
            log::warn!("❌ Profile update failed: {} - {}", claims.user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    tag = "Auth",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Current password is incorrect")
    ),
    security(("bearer_auth" = []))
)]
pub async fn change_password(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    request: web::Json<ChangePasswordRequest>,
) -> HttpResponse {
    log::info!("🔑 PUT /auth/change-password - user: {}", claims.user_id);

    match auth_service::change_password(&db, &config, &claims.user_id, &request).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Password changed successfully"
        })),
        Err(e) => {
            log::warn!("❌ Password change failed: {} - {}", claims.user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/auth/users",
    tag = "Admin",
    responses(
        (status = 200, description = "All users", body = [UserProfile]),
        (status = 403, description = "Admin access required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📋 GET /auth/users - admin: {}", claims.user_id);

    match auth_service::list_users(&db).await {
        Ok(users) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "count": users.len(),
            "data": { "users": users }
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/users/{user_id}/role",
    tag = "Admin",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = UserProfile),
        (status = 400, description = "Invalid role"),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_role(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateRoleRequest>,
) -> HttpResponse {
    let user_id = path.into_inner();
    log::info!("🛡️ PUT /auth/users/{}/role -> {} (by {})", user_id, request.role, claims.user_id);

    match auth_service::update_user_role(&db, &user_id, &request.role).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "User role updated successfully",
            "data": { "user": user }
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    put,
    path = "/api/auth/users/{user_id}/status",
    tag = "Admin",
    params(("user_id" = String, Path, description = "User ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = UserProfile),
        (status = 404, description = "User not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user_status(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<UpdateStatusRequest>,
) -> HttpResponse {
    let user_id = path.into_inner();
    log::info!(
        "🛡️ PUT /auth/users/{}/status -> active={} (by {})",
        user_id,
        request.is_active,
        claims.user_id
    );

    let message = if request.is_active {
        "User activated successfully"
    } else {
        "User deactivated successfully"
    };

    match auth_service::set_user_status(&db, &user_id, request.is_active).await {
        Ok(user) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": message,
            "data": { "user": user }
        })),
        Err(e) => e.error_response(),
    }
}
