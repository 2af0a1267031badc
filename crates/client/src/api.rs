//! Auth API seam and its HTTP implementation.

use std::time::Duration;

use async_trait::async_trait;
use gatehouse_core::ProfileId;
use serde::de::DeserializeOwned;

use crate::types::{Credentials, LoginResponse, ProfileSnapshot, RefreshResponse};

const LOGIN_PATH: &str = "/auth/login";
const ME_PATH: &str = "/auth/me";
const REFRESH_PATH: &str = "/auth/refresh";
const LOGOUT_PATH: &str = "/auth/logout";

#[derive(Debug, Clone, thiserror::Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unauthorized")]
    Unauthorized,
    #[error("API error ({0}): {1}")]
    Api(u16, String),
    #[error("parse error: {0}")]
    Parse(String),
}

impl ApiError {
    /// Transport-level failure (the server was never heard from).
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

/// Remote Auth API, consumed by the coordinator.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError>;

    async fn who_am_i(&self, token: &str) -> Result<ProfileSnapshot, ApiError>;

    async fn change_profile(&self, token: &str, profile: &ProfileId) -> Result<ProfileSnapshot, ApiError>;

    async fn refresh(&self, token: &str) -> Result<RefreshResponse, ApiError>;

    async fn logout(&self, token: &str) -> Result<(), ApiError>;
}

/// `reqwest`-backed [`AuthApi`].
#[derive(Debug, Clone)]
pub struct HttpAuthApi {
    api_url: String,
    client: reqwest::Client,
}

impl HttpAuthApi {
    pub fn new(api_url: impl Into<String>, timeout: Duration) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiError::Network(e.to_string()))?;

        Ok(Self {
            api_url: api_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn authenticate(&self, credentials: &Credentials) -> Result<LoginResponse, ApiError> {
        let req = self.client.post(self.url(LOGIN_PATH)).json(credentials);
        send_json(req).await
    }

    async fn who_am_i(&self, token: &str) -> Result<ProfileSnapshot, ApiError> {
        let req = self.client.get(self.url(ME_PATH)).bearer_auth(token);
        send_json(req).await
    }

    async fn change_profile(&self, token: &str, profile: &ProfileId) -> Result<ProfileSnapshot, ApiError> {
        let req = self
            .client
            .get(self.url(ME_PATH))
            .query(&[("currentfuncao", profile.as_str())])
            .bearer_auth(token);
        send_json(req).await
    }

    async fn refresh(&self, token: &str) -> Result<RefreshResponse, ApiError> {
        let req = self.client.post(self.url(REFRESH_PATH)).bearer_auth(token);
        send_json(req).await
    }

    async fn logout(&self, token: &str) -> Result<(), ApiError> {
        let req = self.client.post(self.url(LOGOUT_PATH)).bearer_auth(token);
        let resp = req.send().await.map_err(map_reqwest)?;
        check_status(resp).await.map(|_| ())
    }
}

async fn send_json<T: DeserializeOwned>(req: reqwest::RequestBuilder) -> Result<T, ApiError> {
    let resp = req.send().await.map_err(map_reqwest)?;
    let resp = check_status(resp).await?;
    resp.json::<T>().await.map_err(|e| ApiError::Parse(e.to_string()))
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, ApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        return Err(ApiError::Api(status.as_u16(), resp.text().await.unwrap_or_default()));
    }
    Ok(resp)
}

fn map_reqwest(err: reqwest::Error) -> ApiError {
    if err.is_decode() {
        ApiError::Parse(err.to_string())
    } else {
        ApiError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed_from_base_url() {
        let api = HttpAuthApi::new("http://localhost:8080/api/", Duration::from_secs(1)).unwrap();
        assert_eq!(api.url(ME_PATH), "http://localhost:8080/api/auth/me");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_network_error() {
        // Port 9 (discard) on localhost is not expected to serve HTTP.
        let api = HttpAuthApi::new("http://127.0.0.1:9", Duration::from_millis(500)).unwrap();
        let err = api.refresh("token").await.unwrap_err();
        assert!(err.is_network(), "unexpected error: {err:?}");
    }
}
