//! HTTP client for the coordinator's API.
//!
//! The shuttle asks the coordinator two things: who a bearer token belongs to
//! (`GET /viewer`), and to register freshly uploaded content
//! (`POST /content/create`).

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use shuttle_core::ContentAddress;
use url::Url;

/// Minimum permission level for regular users.
pub const PERM_LEVEL_USER: i32 = 2;
/// Permission level of coordinator administrators.
pub const PERM_LEVEL_ADMIN: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    #[error("invalid coordinator url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The coordinator answered with its structured error body.
    #[error("coordinator rejected request: {message} ({code})")]
    Rejected { code: i64, message: String },

    /// Non-success status without a decodable error body.
    #[error("coordinator returned unexpected status {0}")]
    UnexpectedStatus(StatusCode),

    #[error("failed to decode coordinator response: {0}")]
    Decode(String),

    #[error("create content request failed, got back content id zero")]
    ZeroContentId,
}

/// A user as resolved from their bearer token.
#[derive(Clone, Debug, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub perms: i32,
    #[serde(skip)]
    pub auth_token: String,
    pub storage_disabled: bool,
}

#[derive(Debug, Deserialize)]
struct ViewerResponse {
    id: i64,
    username: String,
    perms: i32,
    #[serde(default)]
    settings: ViewerSettings,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ViewerSettings {
    #[serde(default)]
    content_adding_disabled: bool,
}

/// Error body the coordinator sends with non-200 responses.
#[derive(Debug, Deserialize)]
struct HttpErrorBody {
    code: i64,
    message: String,
}

#[derive(Debug, Serialize)]
struct CreateContentBody<'a> {
    root: String,
    name: &'a str,
    collections: Vec<&'a str>,
    location: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreateContentResponse {
    id: i64,
}

#[derive(Clone, Debug)]
pub struct CoordinatorClient {
    http: reqwest::Client,
    base_url: Url,
    handle: String,
}

impl CoordinatorClient {
    /// `handle` is sent as the `location` of content created through this node.
    pub fn new(api_url: &str, handle: &str) -> Result<Self, CoordinatorError> {
        Ok(Self {
            http: reqwest::Client::new(),
            base_url: Url::parse(api_url)?,
            handle: handle.to_string(),
        })
    }

    fn url(&self, path: &str) -> Result<Url, CoordinatorError> {
        Ok(self.base_url.join(path)?)
    }

    /// Resolve a bearer token to its user.
    #[tracing::instrument(skip_all)]
    pub async fn viewer(&self, token: &str) -> Result<User, CoordinatorError> {
        let response = self
            .http
            .get(self.url("/viewer")?)
            .bearer_auth(token)
            .send()
            .await?;

        let status = response.status();
        let body = response.bytes().await?;
        if status != StatusCode::OK {
            return Err(match serde_json::from_slice::<HttpErrorBody>(&body) {
                Ok(err) => CoordinatorError::Rejected {
                    code: err.code,
                    message: err.message,
                },
                Err(_) => CoordinatorError::UnexpectedStatus(status),
            });
        }

        let viewer: ViewerResponse =
            serde_json::from_slice(&body).map_err(|e| CoordinatorError::Decode(e.to_string()))?;
        Ok(User {
            id: viewer.id,
            username: viewer.username,
            perms: viewer.perms,
            auth_token: token.to_string(),
            storage_disabled: viewer.settings.content_adding_disabled,
        })
    }

    /// Register uploaded content on behalf of `user`, returning its content id.
    #[tracing::instrument(skip(self, user), fields(user_id = user.id, root = %root))]
    pub async fn create_content(
        &self,
        user: &User,
        root: &ContentAddress,
        name: &str,
        collection: Option<&str>,
    ) -> Result<i64, CoordinatorError> {
        let body = CreateContentBody {
            root: root.to_string(),
            name,
            collections: collection.into_iter().filter(|c| !c.is_empty()).collect(),
            location: &self.handle,
        };

        let response = self
            .http
            .post(self.url("/content/create")?)
            .bearer_auth(&user.auth_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        let bytes = response.bytes().await?;
        let created: CreateContentResponse = serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                CoordinatorError::Decode(e.to_string())
            } else {
                CoordinatorError::UnexpectedStatus(status)
            }
        })?;

        if created.id == 0 {
            return Err(CoordinatorError::ZeroContentId);
        }
        Ok(created.id)
    }
}
