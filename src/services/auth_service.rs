use bcrypt::{hash, verify};
use chrono::{Duration, Utc};
use futures::stream::TryStreamExt;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::{
    config::Config,
    database::{self, MongoDB},
    middleware::auth::Claims,
    models::{Role, User, UserProfile},
    utils::AppError,
};

const INVALID_CREDENTIALS: &str = "Invalid email or password";

// Request/Response structures
#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateProfileRequest {
    pub username: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[derive(Debug, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusRequest {
    pub is_active: bool,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthData {
    pub user: UserProfile,
    pub token: String,
}

#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    pub message: String,
    pub data: AuthData,
}

/// Registration input after validation and normalization.
#[derive(Debug, PartialEq)]
pub struct NewAccount {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub fn validate_registration(request: &RegisterRequest) -> Result<NewAccount, AppError> {
    let required = |value: &Option<String>| {
        value
            .as_deref()
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
    };

    let (username, email, password) = match (
        required(&request.username),
        required(&request.email),
        request.password.clone().filter(|p| !p.is_empty()),
    ) {
        (Some(u), Some(e), Some(p)) => (u, e, p),
        _ => {
            return Err(AppError::Validation(
                "Username, email and password are required".to_string(),
            ))
        }
    };

    let role = match request.role.as_deref() {
        None => Role::User,
        Some(role) => role.parse::<Role>().map_err(AppError::Validation)?,
    };

    Ok(NewAccount {
        username,
        email: normalize_email(&email),
        password,
        role,
    })
}

// Generate JWT token
pub fn generate_token(user_id: &str, role: Role, config: &Config) -> Result<String, AppError> {
    let now = Utc::now();
    let claims = Claims {
        user_id: user_id.to_string(),
        role,
        iat: now.timestamp() as usize,
        exp: (now + Duration::days(config.jwt_expires_days)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(config.jwt_secret.as_ref()),
    )
    .map_err(|e| AppError::internal("Failed to generate token", e))
}

// Verify JWT token
pub fn verify_token(token: &str, secret: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_ref()),
        &Validation::new(Algorithm::HS256),
    )
    .map(|data| data.claims)
}

async fn hash_password(password: String, cost: u32) -> Result<String, AppError> {
    tokio::task::spawn_blocking(move || hash(password, cost))
        .await
        .map_err(|e| AppError::internal("Failed to hash password", e))?
        .map_err(|e| AppError::internal("Failed to hash password", e))
}

async fn verify_password(password: String, hashed: String) -> Result<bool, AppError> {
    tokio::task::spawn_blocking(move || verify(password, &hashed))
        .await
        .map_err(|e| AppError::internal("Password verification failed", e))?
        .map_err(|e| AppError::internal("Password verification failed", e))
}

async fn find_user(db: &MongoDB, user_id: &str) -> Result<User, AppError> {
    db.collection::<User>(database::USERS)
        .find_one(doc! { "user_id": user_id })
        .await
        .map_err(|e| AppError::database("Failed to load user", e))?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))
}

// User registration
pub async fn register(
    db: &MongoDB,
    config: &Config,
    request: &RegisterRequest,
) -> Result<AuthResponse, AppError> {
    let account = validate_registration(request)?;
    let collection = db.collection::<User>(database::USERS);

    let existing = collection
        .find_one(doc! {
            "$or": [
                { "email": &account.email },
                { "username": &account.username }
            ]
        })
        .await
        .map_err(|e| AppError::database("Registration failed", e))?;

    if let Some(existing) = existing {
        return Err(AppError::Validation(if existing.email == account.email {
            "Email already registered".to_string()
        } else {
            "Username already taken".to_string()
        }));
    }

    let hashed_password = hash_password(account.password, config.bcrypt_cost).await?;
    let now = BsonDateTime::now();

    let new_user = User {
        _id: None,
        user_id: ObjectId::new().to_hex(),
        username: account.username,
        email: account.email,
        password: hashed_password,
        role: account.role,
        is_active: true,
        last_login: None,
        created_at: now,
        updated_at: now,
    };

    // The unique indexes catch a concurrent registration that slipped past the lookup.
    collection.insert_one(&new_user).await.map_err(|e| {
        if database::is_duplicate_key(&e) {
            AppError::Validation("Email already registered".to_string())
        } else {
            AppError::database("Registration failed", e)
        }
    })?;

    let token = generate_token(&new_user.user_id, new_user.role, config)?;

    log::info!("✅ User registered successfully: {}", new_user.email);

    Ok(AuthResponse {
        success: true,
        message: "User registered successfully".to_string(),
        data: AuthData {
            user: UserProfile::from(&new_user),
            token,
        },
    })
}

// User login
pub async fn login(
    db: &MongoDB,
    config: &Config,
    request: &LoginRequest,
) -> Result<AuthResponse, AppError> {
    let collection = db.collection::<User>(database::USERS);

    let mut user = collection
        .find_one(doc! { "email": normalize_email(&request.email) })
        .await
        .map_err(|e| AppError::database("Login failed", e))?
        .ok_or_else(|| AppError::Unauthorized(INVALID_CREDENTIALS.to_string()))?;

    // Password first, so a deactivated account is only revealed to its owner.
    if !verify_password(request.password.clone(), user.password.clone()).await? {
        return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
    }

    if !user.is_active {
        return Err(AppError::Unauthorized("Account is deactivated".to_string()));
    }

    let now = BsonDateTime::now();
    collection
        .update_one(
            doc! { "user_id": &user.user_id },
            doc! { "$set": { "last_login": now } },
        )
        .await
        .map_err(|e| AppError::database("Login failed", e))?;
    user.last_login = Some(now);

    let token = generate_token(&user.user_id, user.role, config)?;

    Ok(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        data: AuthData {
            user: UserProfile::from(&user),
            token,
        },
    })
}

// Get current user
pub async fn get_profile(db: &MongoDB, user_id: &str) -> Result<UserProfile, AppError> {
    let user = find_user(db, user_id).await?;
    Ok(UserProfile::from(&user))
}

pub async fn update_profile(
    db: &MongoDB,
    user_id: &str,
    request: &UpdateProfileRequest,
) -> Result<UserProfile, AppError> {
    let collection = db.collection::<User>(database::USERS);
    let mut set = doc! { "updated_at": BsonDateTime::now() };

    if let Some(email) = request.email.as_deref().filter(|e| !e.trim().is_empty()) {
        let email = normalize_email(email);
        let taken = collection
            .find_one(doc! { "email": &email, "user_id": { "$ne": user_id } })
            .await
            .map_err(|e| AppError::database("Failed to update profile", e))?;
        if taken.is_some() {
            return Err(AppError::Validation("Email already registered".to_string()));
        }
        set.insert("email", email);
    }

    if let Some(username) = request.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
        let taken = collection
            .find_one(doc! { "username": username, "user_id": { "$ne": user_id } })
            .await
            .map_err(|e| AppError::database("Failed to update profile", e))?;
        if taken.is_some() {
            return Err(AppError::Validation("Username already taken".to_string()));
        }
        set.insert("username", username);
    }

    let result = collection
        .update_one(doc! { "user_id": user_id }, doc! { "$set": set })
        .await
        .map_err(|e| AppError::database("Failed to update profile", e))?;

    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    get_profile(db, user_id).await
}

pub async fn change_password(
    db: &MongoDB,
    config: &Config,
    user_id: &str,
    request: &ChangePasswordRequest,
) -> Result<(), AppError> {
    if request.new_password.is_empty() {
        return Err(AppError::Validation("New password is required".to_string()));
    }

    let user = find_user(db, user_id).await?;

    if !verify_password(request.current_password.clone(), user.password).await? {
        return Err(AppError::Validation("Current password is incorrect".to_string()));
    }

    let hashed = hash_password(request.new_password.clone(), config.bcrypt_cost).await?;

    db.collection::<User>(database::USERS)
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$set": { "password": hashed, "updated_at": BsonDateTime::now() } },
        )
        .await
        .map_err(|e| AppError::database("Failed to change password", e))?;

    Ok(())
}

// Admin: all users, newest first
pub async fn list_users(db: &MongoDB) -> Result<Vec<UserProfile>, AppError> {
    let users: Vec<User> = db
        .collection::<User>(database::USERS)
        .find(doc! {})
        .sort(doc! { "created_at": -1 })
        .await
        .map_err(|e| AppError::database("Failed to get users", e))?
        .try_collect()
        .await
        .map_err(|e| AppError::database("Failed to get users", e))?;

    Ok(users.iter().map(UserProfile::from).collect())
}

pub async fn update_user_role(
    db: &MongoDB,
    user_id: &str,
    role: &str,
) -> Result<UserProfile, AppError> {
    let role: Role = role.parse().map_err(AppError::Validation)?;

    let result = db
        .collection::<User>(database::USERS)
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$set": { "role": role.to_string(), "updated_at": BsonDateTime::now() } },
        )
        .await
        .map_err(|e| AppError::database("Failed to update user role", e))?;

    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    get_profile(db, user_id).await
}

pub async fn set_user_status(
    db: &MongoDB,
    user_id: &str,
    is_active: bool,
) -> Result<UserProfile, AppError> {
    let result = db
        .collection::<User>(database::USERS)
        .update_one(
            doc! { "user_id": user_id },
            doc! { "$set": { "is_active": is_active, "updated_at": BsonDateTime::now() } },
        )
        .await
        .map_err(|e| AppError::database("Failed to update user status", e))?;

    if result.matched_count == 0 {
        return Err(AppError::NotFound("User not found".to_string()));
    }

    get_profile(db, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(username: &str, email: &str, password: &str, role: Option<&str>) -> RegisterRequest {
        RegisterRequest {
            username: Some(username.to_string()),
            email: Some(email.to_string()),
            password: Some(password.to_string()),
            role: role.map(String::from),
        }
    }

    #[test]
    fn test_registration_normalizes_email() {
        let account = validate_registration(&request("ana", "  USER@X.com ", "pw123456", None)).unwrap();
        assert_eq!(account.email, "user@x.com");
        assert_eq!(account.role, Role::User);
    }

    #[test]
    fn test_registration_requires_fields() {
        let err = validate_registration(&request("", "a@b.com", "pw", None)).unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let missing = RegisterRequest {
            username: Some("ana".to_string()),
            email: None,
            password: Some("pw".to_string()),
            role: None,
        };
        assert!(validate_registration(&missing).is_err());
    }

    #[test]
    fn test_registration_rejects_unknown_role() {
        let err = validate_registration(&request("ana", "a@b.com", "pw", Some("root"))).unwrap_err();
        assert_eq!(err.public_message(), "Invalid role. Must be \"user\" or \"admin\"");

        let admin = validate_registration(&request("ana", "a@b.com", "pw", Some("admin"))).unwrap();
        assert_eq!(admin.role, Role::Admin);
    }

    #[test]
    fn test_token_roundtrip() {
        let config = Config {
            jwt_secret: "unit-test-secret".to_string(),
            ..Config::default()
        };
        let token = generate_token("abc123", Role::Admin, &config).unwrap();
        let claims = verify_token(&token, "unit-test-secret").unwrap();
        assert_eq!(claims.user_id, "abc123");
        assert_eq!(claims.role, Role::Admin);

        let seven_days = 7 * 24 * 60 * 60;
        assert_eq!(claims.exp - claims.iat, seven_days);

        assert!(verify_token(&token, "wrong-secret").is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let config = Config {
            jwt_secret: "unit-test-secret".to_string(),
            jwt_expires_days: -1,
            ..Config::default()
        };
        let token = generate_token("abc123", Role::User, &config).unwrap();
        assert!(verify_token(&token, "unit-test-secret").is_err());
    }

    #[tokio::test]
    async fn test_password_hash_and_verify() {
        let hashed = hash_password("s3cret".to_string(), 4).await.unwrap();
        assert!(verify_password("s3cret".to_string(), hashed.clone()).await.unwrap());
        assert!(!verify_password("wrong".to_string(), hashed).await.unwrap());
    }

    async fn test_db() -> MongoDB {
        dotenv::dotenv().ok();
        let uri = std::env::var("MONGODB_TEST_URI")
            .unwrap_or_else(|_| "mongodb://localhost:27017/excel-analytics-test".to_string());
        MongoDB::new(&uri).await.expect("MongoDB must be running")
    }

    fn fast_config() -> Config {
        Config {
            bcrypt_cost: 4,
            ..Config::default()
        }
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_duplicate_email_is_case_insensitive() {
        let db = test_db().await;
        let config = fast_config();
        let suffix = ObjectId::new().to_hex();
        let email = format!("user-{}@x.com", suffix);

        register(&db, &config, &request(&format!("first-{}", suffix), &email, "pw", None))
            .await
            .unwrap();

        let err = register(
            &db,
            &config,
            &request(&format!("second-{}", suffix), &email.to_uppercase(), "pw", None),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert_eq!(err.public_message(), "Email already registered");
    }

    #[tokio::test]
    #[ignore] // Requires MongoDB to be running
    async fn test_wrong_password_is_generic() {
        let db = test_db().await;
        let config = fast_config();
        let suffix = ObjectId::new().to_hex();
        let email = format!("login-{}@x.com", suffix);

        register(&db, &config, &request(&format!("login-{}", suffix), &email, "right", None))
            .await
            .unwrap();

        let wrong = login(&db, &config, &LoginRequest { email: email.clone(), password: "wrong".into() })
            .await
            .unwrap_err();
        let unknown = login(
            &db,
            &config,
            &LoginRequest { email: format!("nobody-{}@x.com", suffix), password: "right".into() },
        )
        .await
        .unwrap_err();

        assert!(matches!(wrong, AppError::Unauthorized(_)));
        assert_eq!(wrong.public_message(), "Invalid email or password");
        assert_eq!(unknown.public_message(), wrong.public_message());

        let ok = login(&db, &config, &LoginRequest { email: email.to_uppercase(), password: "right".into() })
            .await
            .unwrap();
        assert!(ok.data.user.last_login.is_some());
    }
}
