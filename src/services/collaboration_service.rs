use futures::stream::TryStreamExt;
use mongodb::bson::{doc, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    database::{self, MongoDB},
    models::{
        SharedItem, SharedItemResponse, ShareDirection, ShareLink, Team, TeamSummary,
        UploadRecord, UploadRecordResponse, User, LINK_TTL_DAYS, SHARE_TTL_DAYS,
    },
    services::auth_service::normalize_email,
    utils::{ids::random_hex, time, AppError},
};

const SHARE_ID_BYTES: usize = 16;
const TEAM_ID_BYTES: usize = 16;
const LINK_TOKEN_BYTES: usize = 32;

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ShareRequest {
    pub item_id: Option<String>,
    pub item_type: Option<String>,
    pub recipient_email: Option<String>,
    pub message: Option<String>,
    pub permissions: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub item_id: Option<String>,
    pub item_type: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct CreateTeamRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub members: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct InviteRequest {
    pub email: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareReceipt {
    pub share_id: String,
    pub recipient_email: String,
    pub permissions: String,
    pub expires_at: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedLink {
    pub link: String,
    pub expires_at: String,
    pub token: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteReceipt {
    pub team_id: String,
    pub email: String,
    pub member_count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicShare {
    pub item: UploadRecordResponse,
    pub shared_by: String,
    pub expires_at: String,
}

fn required(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn missing_fields() -> AppError {
    AppError::Validation("Missing required fields".to_string())
}

async fn owned_upload(db: &MongoDB, owner_id: &str, file_name: &str) -> Result<UploadRecord, AppError> {
    db.collection::<UploadRecord>(database::UPLOADS)
        .find_one(doc! { "user_id": owner_id, "file_name": file_name })
        .await
        .map_err(|e| AppError::database("Failed to share item", e))?
        .ok_or_else(|| AppError::NotFound("Item not found in your uploads".to_string()))
}

async fn user_by_id(db: &MongoDB, user_id: &str) -> Result<Option<User>, AppError> {
    db.collection::<User>(database::USERS)
        .find_one(doc! { "user_id": user_id })
        .await
        .map_err(|e| AppError::database("Failed to load user", e))
}

pub async fn share_item(db: &MongoDB, owner_id: &str, request: &ShareRequest) -> Result<ShareReceipt, AppError> {
    let (item_id, item_type, recipient_email) = match (
        required(&request.item_id),
        required(&request.item_type),
        required(&request.recipient_email),
    ) {
        (Some(i), Some(t), Some(r)) => (i, t, r),
        _ => return Err(missing_fields()),
    };

    let recipient = db
        .collection::<User>(database::USERS)
        .find_one(doc! { "email": normalize_email(recipient_email) })
        .await
        .map_err(|e| AppError::database("Failed to share item", e))?
        .ok_or_else(|| AppError::NotFound("Recipient user not found".to_string()))?;

    owned_upload(db, owner_id, item_id).await?;

    let item = SharedItem {
        share_id: random_hex(SHARE_ID_BYTES),
        item_id: item_id.to_string(),
        item_type: item_type.to_string(),
        owner_id: owner_id.to_string(),
        recipient_id: recipient.user_id.clone(),
        recipient_email: recipient.email.clone(),
        message: request.message.clone(),
        permissions: required(&request.permissions).unwrap_or("view").to_string(),
        shared_at: BsonDateTime::now(),
        expires_at: time::days_from_now(SHARE_TTL_DAYS),
    };

    db.collection::<SharedItem>(database::SHARED_ITEMS)
        .insert_one(&item)
        .await
        .map_err(|e| AppError::database("Failed to share item", e))?;

    log::info!("🤝 {} shared {} with {}", owner_id, item.item_id, item.recipient_email);

    Ok(ShareReceipt {
        share_id: item.share_id,
        recipient_email: item.recipient_email,
        permissions: item.permissions,
        expires_at: time::to_rfc3339(item.expires_at),
    })
}

/// Display name of a shared file: its original upload name.
fn item_name(uploads: &[UploadRecord], item_id: &str) -> String {
    uploads
        .iter()
        .find(|u| u.file_name == item_id)
        .map(|u| u.original_name.clone())
        .unwrap_or_else(|| "Unknown Item".to_string())
}

/// Items the caller shared, followed by unexpired items shared with them.
pub async fn list_shared_items(db: &MongoDB, user_id: &str) -> Result<Vec<SharedItemResponse>, AppError> {
    let failed = |e| AppError::database("Failed to get shared items", e);
    let shares = db.collection::<SharedItem>(database::SHARED_ITEMS);

    let by_me: Vec<SharedItem> = shares
        .find(doc! { "owner_id": user_id })
        .sort(doc! { "shared_at": -1 })
        .await
        .map_err(failed)?
        .try_collect()
        .await
        .map_err(failed)?;

    let with_me: Vec<SharedItem> = shares
        .find(doc! { "recipient_id": user_id, "expires_at": { "$gte": BsonDateTime::now() } })
        .sort(doc! { "shared_at": -1 })
        .await
        .map_err(failed)?
        .try_collect()
        .await
        .map_err(failed)?;

    let item_ids: Vec<&str> = by_me.iter().chain(with_me.iter()).map(|s| s.item_id.as_str()).collect();
    let uploads: Vec<UploadRecord> = db
        .collection::<UploadRecord>(database::UPLOADS)
        .find(doc! { "file_name": { "$in": item_ids } })
        .await
        .map_err(failed)?
        .try_collect()
        .await
        .map_err(failed)?;

    let mut items: Vec<SharedItemResponse> = by_me
        .iter()
        .map(|s| SharedItemResponse::new(s, item_name(&uploads, &s.item_id), ShareDirection::SharedByMe))
        .collect();
    items.extend(
        with_me
            .iter()
            .map(|s| SharedItemResponse::new(s, item_name(&uploads, &s.item_id), ShareDirection::SharedWithMe)),
    );

    Ok(items)
}

pub async fn generate_link(
    db: &MongoDB,
    config: &Config,
    owner_id: &str,
    request: &LinkRequest,
) -> Result<GeneratedLink, AppError> {
    let (item_id, item_type) = match (required(&request.item_id), required(&request.item_type)) {
        (Some(i), Some(t)) => (i, t),
        _ => return Err(missing_fields()),
    };

    owned_upload(db, owner_id, item_id).await?;

    let now = BsonDateTime::now();
    let link = ShareLink {
        token: random_hex(LINK_TOKEN_BYTES),
        item_id: item_id.to_string(),
        item_type: item_type.to_string(),
        owner_id: owner_id.to_string(),
        expires_at: time::days_from_now(LINK_TTL_DAYS),
        created_at: now,
    };

    db.collection::<ShareLink>(database::SHARE_LINKS)
        .insert_one(&link)
        .await
        .map_err(|e| AppError::database("Failed to generate shareable link", e))?;

    Ok(GeneratedLink {
        link: format!("{}/shared/{}", config.frontend_url.trim_end_matches('/'), link.token),
        expires_at: time::to_rfc3339(link.expires_at),
        token: link.token,
    })
}

pub async fn revoke_access(db: &MongoDB, owner_id: &str, share_id: &str) -> Result<(), AppError> {
    let result = db
        .collection::<SharedItem>(database::SHARED_ITEMS)
        .delete_one(doc! { "share_id": share_id, "owner_id": owner_id })
        .await
        .map_err(|e| AppError::database("Failed to revoke access", e))?;

    if result.deleted_count == 0 {
        return Err(AppError::NotFound("Shared item not found".to_string()));
    }

    Ok(())
}

pub async fn create_team(
    db: &MongoDB,
    owner_id: &str,
    request: &CreateTeamRequest,
) -> Result<TeamSummary, AppError> {
    let (name, description) = match (required(&request.name), required(&request.description)) {
        (Some(n), Some(d)) => (n, d),
        _ => {
            return Err(AppError::Validation(
                "Team name and description are required".to_string(),
            ))
        }
    };

    let owner = user_by_id(db, owner_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

    let members = match &request.members {
        Some(members) if !members.is_empty() => {
            let mut normalized: Vec<String> = Vec::with_capacity(members.len());
            for email in members.iter().map(|m| normalize_email(m)).filter(|m| !m.is_empty()) {
                if !normalized.contains(&email) {
                    normalized.push(email);
                }
            }
            normalized
        }
        _ => vec![owner.email.clone()],
    };

    let now = BsonDateTime::now();
    let team = Team {
        team_id: random_hex(TEAM_ID_BYTES),
        name: name.to_string(),
        description: description.to_string(),
        owner_id: owner_id.to_string(),
        members,
        created_at: now,
        updated_at: now,
    };

    db.collection::<Team>(database::TEAMS)
        .insert_one(&team)
        .await
        .map_err(|e| AppError::database("Failed to create team", e))?;

    log::info!("👥 Team '{}' created by {}", team.name, owner_id);

    Ok(TeamSummary::from(&team))
}

/// Teams the caller owns or belongs to.
pub async fn list_teams(db: &MongoDB, user_id: &str) -> Result<Vec<TeamSummary>, AppError> {
    let failed = |e| AppError::database("Failed to get teams", e);

    let mut filter = vec![doc! { "owner_id": user_id }];
    if let Some(user) = user_by_id(db, user_id).await? {
        filter.push(doc! { "members": user.email });
    }

    let teams: Vec<Team> = db
        .collection::<Team>(database::TEAMS)
        .find(doc! { "$or": filter })
        .sort(doc! { "created_at": -1 })
        .await
        .map_err(failed)?
        .try_collect()
        .await
        .map_err(failed)?;

    Ok(teams.iter().map(TeamSummary::from).collect())
}

pub async fn invite_to_team(
    db: &MongoDB,
    user_id: &str,
    team_id: &str,
    request: &InviteRequest,
) -> Result<InviteReceipt, AppError> {
    let email = required(&request.email)
        .map(normalize_email)
        .ok_or_else(|| AppError::Validation("Email is required".to_string()))?;

    let teams = db.collection::<Team>(database::TEAMS);
    let team = teams
        .find_one(doc! { "team_id": team_id })
        .await
        .map_err(|e| AppError::database("Failed to send invitation", e))?
        .ok_or_else(|| AppError::NotFound("Team not found".to_string()))?;

    if team.owner_id != user_id {
        return Err(AppError::Forbidden("Only team owner can invite members".to_string()));
    }

    if team.members.contains(&email) {
        return Err(AppError::Validation("User is already a team member".to_string()));
    }

    // $addToSet keeps a concurrent duplicate invite from adding the member twice.
    teams
        .update_one(
            doc! { "team_id": team_id },
            doc! {
                "$addToSet": { "members": &email },
                "$set": { "updated_at": BsonDateTime::now() }
            },
        )
        .await
        .map_err(|e| AppError::database("Failed to send invitation", e))?;

    log::info!("📨 Invitation sent to {} for team {}", email, team.name);

    Ok(InviteReceipt {
        team_id: team.team_id,
        member_count: team.members.len() + 1,
        email,
    })
}

/// Public lookup of a share link; no authentication.
pub async fn get_shared_item(db: &MongoDB, token: &str) -> Result<PublicShare, AppError> {
    let link = db
        .collection::<ShareLink>(database::SHARE_LINKS)
        .find_one(doc! { "token": token })
        .await
        .map_err(|e| AppError::database("Failed to get shared item", e))?
        .ok_or_else(|| AppError::NotFound("Share link not found or expired".to_string()))?;

    if link.is_expired(BsonDateTime::now()) {
        return Err(AppError::NotFound("Share link expired".to_string()));
    }

    let item = db
        .collection::<UploadRecord>(database::UPLOADS)
        .find_one(doc! { "user_id": &link.owner_id, "file_name": &link.item_id })
        .await
        .map_err(|e| AppError::database("Failed to get shared item", e))?
        .ok_or_else(|| AppError::NotFound("Shared item not found".to_string()))?;

    let shared_by = user_by_id(db, &link.owner_id)
        .await?
        .map(|u| u.username)
        .unwrap_or_default();

    Ok(PublicShare {
        item: UploadRecordResponse::from(&item),
        shared_by,
        expires_at: time::to_rfc3339(link.expires_at),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upload(file_name: &str, original_name: &str) -> UploadRecord {
        UploadRecord {
            upload_id: file_name.to_string(),
            user_id: "owner".to_string(),
            file_name: file_name.to_string(),
            original_name: original_name.to_string(),
            file_size: 1,
            chart_configs: vec![],
            uploaded_at: BsonDateTime::from_millis(0),
        }
    }

    #[test]
    fn test_item_name_falls_back() {
        let uploads = vec![upload("1-file.xlsx", "sales.xlsx")];
        assert_eq!(item_name(&uploads, "1-file.xlsx"), "sales.xlsx");
        assert_eq!(item_name(&uploads, "2-file.xlsx"), "Unknown Item");
    }

    #[test]
    fn test_required_trims_blank_values() {
        assert_eq!(required(&Some("  ".to_string())), None);
        assert_eq!(required(&None), None);
        assert_eq!(required(&Some(" file ".to_string())), Some("file"));
    }

    async fn test_db() -> MongoDB {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_TEST_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/excel-analytics-test".to_string());
        MongoDB::new(&uri).await.expect("MongoDB must be running")
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_invite_rules() {
        let db = test_db().await;
        let owner = mongodb::bson::oid::ObjectId::new().to_hex();
        let team = Team {
            team_id: random_hex(TEAM_ID_BYTES),
            name: "Analysts".to_string(),
            description: "Q3 numbers".to_string(),
            owner_id: owner.clone(),
            members: vec!["owner@example.com".to_string()],
            created_at: BsonDateTime::now(),
            updated_at: BsonDateTime::now(),
        };
        db.collection::<Team>(database::TEAMS).insert_one(&team).await.unwrap();

        let invite = |email: Option<&str>| InviteRequest { email: email.map(String::from) };

        let missing = invite_to_team(&db, &owner, &team.team_id, &invite(None)).await.unwrap_err();
        assert!(matches!(missing, AppError::Validation(_)));

        let unknown = invite_to_team(&db, &owner, "nope", &invite(Some("a@b.com"))).await.unwrap_err();
        assert!(matches!(unknown, AppError::NotFound(_)));

        let stranger = invite_to_team(&db, "intruder", &team.team_id, &invite(Some("a@b.com")))
            .await
            .unwrap_err();
        assert!(matches!(stranger, AppError::Forbidden(_)));

        let receipt = invite_to_team(&db, &owner, &team.team_id, &invite(Some("New@Example.com")))
            .await
            .unwrap();
        assert_eq!(receipt.email, "new@example.com");
        assert_eq!(receipt.member_count, 2);

        let again = invite_to_team(&db, &owner, &team.team_id, &invite(Some("new@example.com")))
            .await
            .unwrap_err();
        assert_eq!(again.public_message(), "User is already a team member");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_expired_link_is_rejected() {
        let db = test_db().await;
        let link = ShareLink {
            token: random_hex(LINK_TOKEN_BYTES),
            item_id: "1-file.xlsx".to_string(),
            item_type: "file".to_string(),
            owner_id: "owner".to_string(),
            expires_at: BsonDateTime::from_millis(1_000),
            created_at: BsonDateTime::from_millis(0),
        };
        db.collection::<ShareLink>(database::SHARE_LINKS).insert_one(&link).await.unwrap();

        let err = get_shared_item(&db, &link.token).await.unwrap_err();
        assert_eq!(err.public_message(), "Share link expired");

        let missing = get_shared_item(&db, "does-not-exist").await.unwrap_err();
        assert!(matches!(missing, AppError::NotFound(_)));
    }
}
