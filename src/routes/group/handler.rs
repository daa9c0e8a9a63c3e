use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};

use crate::{
    AppState,
    error::AppError,
    extract::{ApiJson, ApiQuery},
    models::{Group, GroupSummary, JoinedGroup},
    routes::MessageResponse,
    utils::is_valid_join_code,
};

use super::model::{
    CreateGroupRequest, CreateGroupResponse, GroupRequest, JoinGroupRequest, JoinGroupResponse,
    LeaveGroupResponse, UserQuery,
};

fn require_ids(req: GroupRequest) -> Result<(i64, i64), AppError> {
    match (req.user_id, req.group_id) {
        (Some(user_id), Some(group_id)) => Ok((user_id, group_id)),
        _ => Err(AppError::Validation("User ID and group ID are required".into())),
    }
}

fn require_user(query: UserQuery) -> Result<i64, AppError> {
    query
        .user_id
        .ok_or_else(|| AppError::Validation("User ID is required".into()))
}

#[axum::debug_handler]
pub async fn create_group(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    let group_name = req.group_name.as_deref().map(str::trim).unwrap_or_default();
    let Some(user_id) = req.user_id.filter(|_| !group_name.is_empty()) else {
        return Err(AppError::Validation("User ID and group name are required".into()));
    };

    let join_code = req
        .join_code
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty());
    if let Some(code) = &join_code {
        if !is_valid_join_code(code) {
            return Err(AppError::Validation("Join code must be 6 digits".into()));
        }
    }

    let group = Group::create(state.store.as_ref(), user_id, group_name, join_code).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateGroupResponse {
            message: "Group created".into(),
            group_id: group.id,
            join_code: group.join_code,
        }),
    ))
}

#[axum::debug_handler]
pub async fn join_group(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<JoinGroupRequest>,
) -> Result<Json<JoinGroupResponse>, AppError> {
    let join_code = req.join_code.as_deref().map(str::trim).unwrap_or_default();
    let Some(user_id) = req.user_id.filter(|_| !join_code.is_empty()) else {
        return Err(AppError::Validation("User ID and join code are required".into()));
    };

    let group = Group::join(state.store.as_ref(), user_id, join_code).await?;
    Ok(Json(JoinGroupResponse {
        message: "Joined group successfully".into(),
        group_id: group.id,
        group_name: group.group_name,
    }))
}

#[axum::debug_handler]
pub async fn get_members(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<Vec<JoinedGroup>>, AppError> {
    let user_id = require_user(query)?;
    Ok(Json(Group::list_joined(state.store.as_ref(), user_id).await?))
}

#[axum::debug_handler]
pub async fn get_created(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<UserQuery>,
) -> Result<Json<Vec<GroupSummary>>, AppError> {
    let user_id = require_user(query)?;
    Ok(Json(Group::list_created(state.store.as_ref(), user_id).await?))
}

#[axum::debug_handler]
pub async fn delete_group(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GroupRequest>,
) -> Result<Json<MessageResponse>, AppError> {
    let (user_id, group_id) = require_ids(req)?;
    Group::delete(state.store.as_ref(), user_id, group_id).await?;
    Ok(Json(MessageResponse::new("Group deleted successfully")))
}

#[axum::debug_handler]
pub async fn leave_group(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<GroupRequest>,
) -> Result<Json<LeaveGroupResponse>, AppError> {
    let (user_id, group_id) = require_ids(req)?;
    let group_deleted = Group::leave(state.store.as_ref(), user_id, group_id).await?;
    Ok(Json(LeaveGroupResponse {
        message: "Left group successfully".into(),
        group_deleted,
    }))
}
