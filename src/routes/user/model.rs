use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::models::User;
use crate::store::Store;
use crate::utils::{hash_password, verify_password};

pub const MIN_PASSWORD_LEN: usize = 6;

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SignupRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub fullname: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub user_id: i64,
    pub fullname: String,
}

impl From<User> for AuthResponse {
    fn from(user: User) -> Self {
        Self {
            message: None,
            user_id: user.id,
            fullname: user.fullname,
        }
    }
}

fn required(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

impl User {
    pub async fn signup(
        store: &dyn Store,
        bcrypt_cost: u32,
        req: SignupRequest,
    ) -> Result<Self, AppError> {
        let (Some(email), Some(password), Some(fullname)) = (
            required(req.email),
            req.password.filter(|p| !p.is_empty()),
            required(req.fullname),
        ) else {
            return Err(AppError::Validation(
                "Email, password, and fullname are required".into(),
            ));
        };

        let email = email.to_lowercase();
        if !email.contains('@') {
            return Err(AppError::Validation("Invalid email address".into()));
        }
        if password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AppError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        // 提前检查，避免为重复邮箱白白计算哈希
        if store.find_user_by_email(&email).await?.is_some() {
            return Err(AppError::Conflict("Email already exists".into()));
        }

        let password_hash = tokio::task::spawn_blocking(move || hash_password(&password, bcrypt_cost))
            .await
            .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {e}")))?;

        // 并发注册同一邮箱时由唯一约束兜底
        let user = store
            .create_user(&email, &fullname, &password_hash)
            .await?
            .ok_or_else(|| AppError::Conflict("Email already exists".into()))?;

        tracing::info!(user_id = user.id, "user signed up");
        Ok(user)
    }

    pub async fn login(store: &dyn Store, req: LoginRequest) -> Result<Self, AppError> {
        let (Some(email), Some(password)) = (required(req.email), req.password) else {
            return Err(AppError::Validation("Email and password are required".into()));
        };

        let invalid = || AppError::Unauthorized("Invalid email or password".into());
        let user = store
            .find_user_by_email(&email.to_lowercase())
            .await?
            .ok_or_else(invalid)?;

        let hash = user.password_hash.clone();
        let matched = tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("hash task failed: {e}")))?
            // 存储中的哈希损坏按密码错误处理
            .unwrap_or(false);

        if !matched {
            return Err(invalid());
        }
        Ok(user)
    }
}
