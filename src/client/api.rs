use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{ClientError, HistorySource, LocationSink};
use crate::error::ErrorResponse;
use crate::models::{ChatMessage, GroupSummary, JoinedGroup};
use crate::routes::group::{
    CreateGroupRequest, CreateGroupResponse, GroupRequest, JoinGroupRequest, JoinGroupResponse,
    LeaveGroupResponse,
};
use crate::routes::location::{UpdateLocationRequest, UpdateLocationResponse};
use crate::routes::notification::RegisterTokenRequest;
use crate::routes::user::{AuthResponse, LoginRequest, SignupRequest};

/// REST 接口客户端，`base_url` 含接口前缀，例如 `http://localhost:5000/api`
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = match response.json::<ErrorResponse>().await {
                Ok(body) => body.message,
                Err(_) => status.to_string(),
            };
            return Err(ClientError::Api {
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ClientError::Decode(e.to_string()))
    }

    pub async fn signup(
        &self,
        email: &str,
        password: &str,
        fullname: &str,
    ) -> Result<AuthResponse, ClientError> {
        let body = SignupRequest {
            email: Some(email.into()),
            password: Some(password.into()),
            fullname: Some(fullname.into()),
        };
        self.send(self.http.post(self.url("/auth/signup")).json(&body))
            .await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<AuthResponse, ClientError> {
        let body = LoginRequest {
            email: Some(email.into()),
            password: Some(password.into()),
        };
        self.send(self.http.post(self.url("/auth/login")).json(&body))
            .await
    }

    /// `join_code` 为空时由服务端生成
    pub async fn create_group(
        &self,
        user_id: i64,
        group_name: &str,
        join_code: Option<&str>,
    ) -> Result<CreateGroupResponse, ClientError> {
        let body = CreateGroupRequest {
            user_id: Some(user_id),
            join_code: join_code.map(str::to_string),
            group_name: Some(group_name.into()),
        };
        self.send(self.http.post(self.url("/groups/create")).json(&body))
            .await
    }

    pub async fn join_group(
        &self,
        user_id: i64,
        join_code: &str,
    ) -> Result<JoinGroupResponse, ClientError> {
        let body = JoinGroupRequest {
            user_id: Some(user_id),
            join_code: Some(join_code.into()),
        };
        self.send(self.http.post(self.url("/groups/join")).json(&body))
            .await
    }

    pub async fn joined_groups(&self, user_id: i64) -> Result<Vec<JoinedGroup>, ClientError> {
        self.send(
            self.http
                .get(self.url("/groups/members"))
                .query(&[("userId", user_id)]),
        )
        .await
    }

    pub async fn created_groups(&self, user_id: i64) -> Result<Vec<GroupSummary>, ClientError> {
        self.send(
            self.http
                .get(self.url("/groups/created"))
                .query(&[("userId", user_id)]),
        )
        .await
    }

    pub async fn delete_group(&self, user_id: i64, group_id: i64) -> Result<(), ClientError> {
        let body = GroupRequest {
            user_id: Some(user_id),
            group_id: Some(group_id),
        };
        let _: Value = self
            .send(self.http.delete(self.url("/groups/delete")).json(&body))
            .await?;
        Ok(())
    }

    pub async fn leave_group(
        &self,
        user_id: i64,
        group_id: i64,
    ) -> Result<LeaveGroupResponse, ClientError> {
        let body = GroupRequest {
            user_id: Some(user_id),
            group_id: Some(group_id),
        };
        self.send(self.http.delete(self.url("/groups/leave")).json(&body))
            .await
    }

    pub async fn update_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<UpdateLocationResponse, ClientError> {
        let body = UpdateLocationRequest {
            user_id: Some(user_id),
            latitude: Some(latitude),
            longitude: Some(longitude),
        };
        self.send(self.http.post(self.url("/locations/update")).json(&body))
            .await
    }

    pub async fn messages(&self, group_id: i64) -> Result<Vec<ChatMessage>, ClientError> {
        self.send(
            self.http
                .get(self.url("/chat/messages"))
                .query(&[("groupId", group_id)]),
        )
        .await
    }

    pub async fn register_push_token(&self, user_id: i64, token: &str) -> Result<(), ClientError> {
        let body = RegisterTokenRequest {
            user_id: Some(user_id),
            fcm_token: Some(token.into()),
        };
        let _: Value = self
            .send(self.http.post(self.url("/notifications/register")).json(&body))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl LocationSink for ApiClient {
    async fn push_location(
        &self,
        user_id: i64,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), ClientError> {
        self.update_location(user_id, latitude, longitude)
            .await
            .map(|_| ())
    }
}

#[async_trait]
impl HistorySource for ApiClient {
    async fn messages(&self, group_id: i64) -> Result<Vec<ChatMessage>, ClientError> {
        ApiClient::messages(self, group_id).await
    }
}
