//! Authenticated GitLab user model.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// The user the access token belongs to. The replica keeps at most one row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub id: i64,
    pub name: String,
    pub username: String,
    pub email: String,
    pub web_url: String,
    #[serde(default)]
    pub synced_at: i64,
}
