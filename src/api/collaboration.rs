use actix_web::{web, HttpResponse, ResponseError};

use crate::config::Config;
use crate::database::MongoDB;
use crate::middleware::Claims;
use crate::services::collaboration_service::{
    self, CreateTeamRequest, InviteRequest, LinkRequest, ShareRequest,
};

#[utoipa::path(
    post,
    path = "/api/collaboration/share",
    tag = "Collaboration",
    request_body = ShareRequest,
    responses(
        (status = 200, description = "Item shared"),
        (status = 400, description = "Missing required fields"),
        (status = 404, description = "Recipient or item not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn share_item(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<ShareRequest>,
) -> HttpResponse {
    log::info!("🤝 POST /collaboration/share - user: {}", claims.user_id);

    match collaboration_service::share_item(&db, &claims.user_id, &request).await {
        Ok(receipt) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Item shared successfully",
            "data": receipt
        })),
        Err(e) => {
            log::warn!("❌ Share failed for {}: {}", claims.user_id, e);
            e.error_response()
        }
    }
}

#[utoipa::path(
    get,
    path = "/api/collaboration/shared-items",
    tag = "Collaboration",
    responses((status = 200, description = "Items shared by and with the caller")),
    security(("bearer_auth" = []))
)]
pub async fn list_shared_items(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("📋 GET /collaboration/shared-items - user: {}", claims.user_id);

    match collaboration_service::list_shared_items(&db, &claims.user_id).await {
        Ok(items) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": items
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/collaboration/generate-link",
    tag = "Collaboration",
    request_body = LinkRequest,
    responses(
        (status = 200, description = "Shareable link generated"),
        (status = 404, description = "Item not found in your uploads")
    ),
    security(("bearer_auth" = []))
)]
pub async fn generate_link(
    db: web::Data<MongoDB>,
    config: web::Data<Config>,
    claims: web::ReqData<Claims>,
    request: web::Json<LinkRequest>,
) -> HttpResponse {
    log::info!("🔗 POST /collaboration/generate-link - user: {}", claims.user_id);

    match collaboration_service::generate_link(&db, &config, &claims.user_id, &request).await {
        Ok(link) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Shareable link generated",
            "data": link
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/api/collaboration/shared-items/{share_id}",
    tag = "Collaboration",
    params(("share_id" = String, Path, description = "Share ID")),
    responses(
        (status = 200, description = "Access revoked"),
        (status = 404, description = "Shared item not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn revoke_access(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
) -> HttpResponse {
    let share_id = path.into_inner();
    log::info!("🚫 DELETE /collaboration/shared-items/{} - user: {}", share_id, claims.user_id);

    match collaboration_service::revoke_access(&db, &claims.user_id, &share_id).await {
        Ok(()) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Access revoked successfully"
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/collaboration/teams",
    tag = "Collaboration",
    request_body = CreateTeamRequest,
    responses(
        (status = 200, description = "Team created"),
        (status = 400, description = "Team name and description are required")
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_team(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    request: web::Json<CreateTeamRequest>,
) -> HttpResponse {
    log::info!("👥 POST /collaboration/teams - user: {}", claims.user_id);

    match collaboration_service::create_team(&db, &claims.user_id, &request).await {
        Ok(team) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Team created successfully",
            "data": {
                "teamId": team.id,
                "name": team.name,
                "description": team.description,
                "memberCount": team.member_count
            }
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/collaboration/teams",
    tag = "Collaboration",
    responses((status = 200, description = "Teams the caller owns or belongs to")),
    security(("bearer_auth" = []))
)]
pub async fn list_teams(db: web::Data<MongoDB>, claims: web::ReqData<Claims>) -> HttpResponse {
    log::info!("👥 GET /collaboration/teams - user: {}", claims.user_id);

    match collaboration_service::list_teams(&db, &claims.user_id).await {
        Ok(teams) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": teams
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    post,
    path = "/api/collaboration/teams/{team_id}/invite",
    tag = "Collaboration",
    params(("team_id" = String, Path, description = "Team ID")),
    request_body = InviteRequest,
    responses(
        (status = 200, description = "Invitation sent"),
        (status = 400, description = "Email missing or already a member"),
        (status = 403, description = "Only team owner can invite members"),
        (status = 404, description = "Team not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn invite_to_team(
    db: web::Data<MongoDB>,
    claims: web::ReqData<Claims>,
    path: web::Path<String>,
    request: web::Json<InviteRequest>,
) -> HttpResponse {
    let team_id = path.into_inner();
    log::info!("📨 POST /collaboration/teams/{}/invite - user: {}", team_id, claims.user_id);

    match collaboration_service::invite_to_team(&db, &claims.user_id, &team_id, &request).await {
        Ok(receipt) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "message": "Invitation sent successfully",
            "data": receipt
        })),
        Err(e) => e.error_response(),
    }
}

#[utoipa::path(
    get,
    path = "/api/collaboration/shared/{token}",
    tag = "Collaboration",
    params(("token" = String, Path, description = "Share link token")),
    responses(
        (status = 200, description = "Shared item"),
        (status = 404, description = "Link unknown, expired, or item gone")
    )
)]
pub async fn get_shared_item(db: web::Data<MongoDB>, path: web::Path<String>) -> HttpResponse {
    let token = path.into_inner();
    log::info!("🔓 GET /collaboration/shared/{}…", token.chars().take(8).collect::<String>());

    match collaboration_service::get_shared_item(&db, &token).await {
        Ok(shared) => HttpResponse::Ok().json(serde_json::json!({
            "success": true,
            "data": shared
        })),
        Err(e) => e.error_response(),
    }
}
