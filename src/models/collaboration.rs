use mongodb::bson::DateTime as BsonDateTime;
use serde::{Deserialize, Serialize};

use crate::utils::time::to_rfc3339;

/// Days a direct share stays valid.
pub const SHARE_TTL_DAYS: i64 = 30;
/// Days a public link stays valid.
pub const LINK_TTL_DAYS: i64 = 7;

/// An item shared directly with another registered user (`shared_items`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedItem {
    pub share_id: String,
    /// `file_name` of one of the owner's uploads
    pub item_id: String,
    pub item_type: String,
    pub owner_id: String,
    pub recipient_id: String,
    pub recipient_email: String,
    pub message: Option<String>,
    pub permissions: String,
    pub shared_at: BsonDateTime,
    pub expires_at: BsonDateTime,
}

/// Public, token-addressed link to an upload (`share_links`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShareLink {
    pub token: String,
    pub item_id: String,
    pub item_type: String,
    pub owner_id: String,
    pub expires_at: BsonDateTime,
    pub created_at: BsonDateTime,
}

impl ShareLink {
    pub fn is_expired(&self, now: BsonDateTime) -> bool {
        self.expires_at.timestamp_millis() < now.timestamp_millis()
    }
}

/// Team workspace (`teams`). Members are tracked by email.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub team_id: String,
    pub name: String,
    pub description: String,
    pub owner_id: String,
    pub members: Vec<String>,
    pub created_at: BsonDateTime,
    pub updated_at: BsonDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ShareDirection {
    SharedByMe,
    SharedWithMe,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedItemResponse {
    pub id: String,
    pub item_id: String,
    pub item_type: String,
    pub item_name: String,
    pub owner_id: String,
    pub recipient_email: String,
    pub message: Option<String>,
    pub permissions: String,
    pub shared_at: String,
    pub expires_at: String,
    #[serde(rename = "type")]
    pub direction: ShareDirection,
}

impl SharedItemResponse {
    pub fn new(item: &SharedItem, item_name: String, direction: ShareDirection) -> Self {
        SharedItemResponse {
            id: item.share_id.clone(),
            item_id: item.item_id.clone(),
            item_type: item.item_type.clone(),
            item_name,
            owner_id: item.owner_id.clone(),
            recipient_email: item.recipient_email.clone(),
            message: item.message.clone(),
            permissions: item.permissions.clone(),
            shared_at: to_rfc3339(item.shared_at),
            expires_at: to_rfc3339(item.expires_at),
            direction,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub id: String,
    pub name: String,
    pub description: String,
    pub member_count: usize,
    pub created_at: String,
}

impl From<&Team> for TeamSummary {
    fn from(team: &Team) -> Self {
        TeamSummary {
            id: team.team_id.clone(),
            name: team.name.clone(),
            description: team.description.clone(),
            member_count: team.members.len(),
            created_at: to_rfc3339(team.created_at),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_expiry() {
        let link = ShareLink {
            token: "t".to_string(),
            item_id: "1700000000000-file.xlsx".to_string(),
            item_type: "file".to_string(),
            owner_id: "owner".to_string(),
            expires_at: BsonDateTime::from_millis(1_000),
            created_at: BsonDateTime::from_millis(0),
        };
        assert!(!link.is_expired(BsonDateTime::from_millis(999)));
        assert!(!link.is_expired(BsonDateTime::from_millis(1_000)));
        assert!(link.is_expired(BsonDateTime::from_millis(1_001)));
    }

    #[test]
    fn test_shared_item_direction_tag() {
        let item = SharedItem {
            share_id: "abc".to_string(),
            item_id: "f.xlsx".to_string(),
            item_type: "file".to_string(),
            owner_id: "owner".to_string(),
            recipient_id: "rcpt".to_string(),
            recipient_email: "bob@example.com".to_string(),
            message: None,
            permissions: "view".to_string(),
            shared_at: BsonDateTime::from_millis(0),
            expires_at: BsonDateTime::from_millis(0),
        };
        let json = serde_json::to_value(SharedItemResponse::new(
            &item,
            "sales.xlsx".to_string(),
            ShareDirection::SharedByMe,
        ))
        .unwrap();
        assert_eq!(json["type"], "shared_by_me");
        assert_eq!(json["itemName"], "sales.xlsx");
    }
}
