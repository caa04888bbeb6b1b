//! GitLab API client.
//!
//! Provides HTTP client for GitLab API v4 with authentication and pagination,
//! and implements [`RemoteSource`] for the sync engine.

use crate::error::ReplicaError;
use crate::services::remote::{GroupsQuery, IssuesQuery, ProjectsQuery, RemoteSource};
use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Default GitLab instance.
pub const DEFAULT_BASE_URL: &str = "https://gitlab.com";

/// GitLab API client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitLabClientConfig {
    /// Base URL of the GitLab instance (e.g., `https://gitlab.com`).
    pub base_url: String,

    /// Personal access token for authentication.
    #[serde(skip_serializing)]
    pub token: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GitLabClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: String::new(),
            timeout_secs: 30,
        }
    }
}

/// GitLab API client.
#[derive(Debug, Clone)]
pub struct GitLabClient {
    client: Client,
    config: GitLabClientConfig,
}

/// GitLab user from API (`GET /user`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabUser {
    pub id: i64,
    pub username: String,
    pub name: String,
    /// Only returned for the authenticated user.
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

/// User reference embedded in an issue.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabUserRef {
    pub id: i64,
    pub username: String,
    pub name: String,
}

/// GitLab group from API (`GET /groups`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabGroup {
    pub id: i64,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub full_name: Option<String>,
    pub full_path: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Namespace a project lives in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabNamespace {
    pub id: i64,
    #[serde(default)]
    pub full_path: Option<String>,
}

/// GitLab project from API (`GET /projects`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabProject {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub name_with_namespace: String,
    pub path_with_namespace: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default_branch: Option<String>,
    #[serde(default)]
    pub visibility: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub namespace: Option<GitLabNamespace>,
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub last_activity_at: Option<String>,
    #[serde(default)]
    pub archived: bool,
    /// Set when the project is scheduled for deletion.
    #[serde(default, alias = "marked_for_deletion_at")]
    pub marked_for_deletion_on: Option<String>,
    #[serde(default)]
    pub open_issues_count: Option<i64>,
}

/// GitLab issue from API (`GET /issues`, `GET /groups/:id/issues`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLabIssue {
    pub id: i64,
    pub iid: i64,
    pub project_id: i64,
    pub title: String,
    pub state: String,
    #[serde(default)]
    pub description: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub author: Option<GitLabUserRef>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub assignees: Vec<GitLabUserRef>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
    #[serde(default)]
    pub closed_at: Option<String>,
    #[serde(default)]
    pub due_date: Option<String>,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub confidential: bool,
}

impl GitLabClient {
    /// Create a new GitLab client.
    pub fn new(config: GitLabClientConfig) -> Result<Self, ReplicaError> {
        if config.token.is_empty() {
            return Err(ReplicaError::config_field("GitLab token is required", "token"));
        }

        let mut headers = header::HeaderMap::new();

        // Add the private token header for authentication
        let token_value = header::HeaderValue::from_str(&config.token)
            .map_err(|_| ReplicaError::config_field("Invalid token format", "token"))?;
        headers.insert("PRIVATE-TOKEN", token_value);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReplicaError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client, config })
    }

    /// Base URL of the configured instance.
    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn api_url(&self, path: &str) -> String {
        api_url(&self.config.base_url, path)
    }

    /// Handle API response errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: Response,
        endpoint: &str,
    ) -> Result<T, ReplicaError> {
        let status = response.status();

        if status.is_success() {
            return response.json::<T>().await.map_err(|e| {
                ReplicaError::transport_full(
                    format!("Failed to parse response: {}", e),
                    status.as_u16(),
                    endpoint,
                )
            });
        }

        let status_code = status.as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = match status {
            StatusCode::UNAUTHORIZED => "GitLab token expired or revoked".to_string(),
            StatusCode::FORBIDDEN => "Access denied".to_string(),
            StatusCode::NOT_FOUND => "Resource not found".to_string(),
            StatusCode::TOO_MANY_REQUESTS => "Rate limit exceeded".to_string(),
            _ => error_body_message(&body)
                .unwrap_or_else(|| format!("Request failed ({}): {}", status_code, body)),
        };

        log::warn!("[sync] GET {} failed: {} ({})", endpoint, message, status_code);
        Err(ReplicaError::transport_full(message, status_code, endpoint))
    }

    /// GET one endpoint with query parameters.
    async fn get<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        query: Option<&impl Serialize>,
    ) -> Result<T, ReplicaError> {
        let mut request = self.client.get(self.api_url(endpoint));
        if let Some(q) = query {
            request = request.query(q);
        }

        let response = request.send().await.map_err(|e| {
            let mut err = ReplicaError::from(e);
            if let ReplicaError::Transport { endpoint: ep, .. } = &mut err {
                *ep = Some(endpoint.to_string());
            }
            err
        })?;
        self.handle_response(response, endpoint).await
    }

    /// Validate the token by fetching the current user.
    pub async fn validate_token(&self) -> Result<GitLabUser, ReplicaError> {
        self.get("/user", None::<&()>).await
    }
}

impl RemoteSource for GitLabClient {
    async fn current_user(&self) -> Result<GitLabUser, ReplicaError> {
        self.validate_token().await
    }

    async fn groups_page(&self, query: GroupsQuery) -> Result<Vec<GitLabGroup>, ReplicaError> {
        self.get("/groups", Some(&query)).await
    }

    async fn projects_page(&self, query: ProjectsQuery) -> Result<Vec<GitLabProject>, ReplicaError> {
        self.get("/projects", Some(&query)).await
    }

    async fn issues_page(&self, query: IssuesQuery) -> Result<Vec<GitLabIssue>, ReplicaError> {
        self.get("/issues", Some(&query)).await
    }

    async fn group_issues_page(
        &self,
        group_id: i64,
        query: IssuesQuery,
    ) -> Result<Vec<GitLabIssue>, ReplicaError> {
        let endpoint = format!("/groups/{}/issues", group_id);
        self.get(&endpoint, Some(&query)).await
    }
}

fn api_url(base_url: &str, path: &str) -> String {
    format!("{}/api/v4{}", base_url.trim_end_matches('/'), path)
}

/// GitLab returns errors as `{"message": ...}` or `{"error": ...}`; the
/// message is sometimes an object like `{"base": ["msg"]}`.
fn error_body_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<serde_json::Value>(body).ok()?;
    let message = value.get("message").or_else(|| value.get("error"))?;
    Some(match message.as_str() {
        Some(s) => s.to_string(),
        None => message.to_string(),
    })
}
