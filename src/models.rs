use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use utoipa::ToSchema;

pub type Id = i64;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct User {
    pub id: Id,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewUser {
    pub username: String,
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Category {
    pub id: Id,
    pub title: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCategory {
    pub title: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateCategory {
    pub title: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Post {
    pub id: Id,
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub user_id: Id,
    pub category_id: Id,
    pub created_at: DateTime<Utc>,
    // Initialized to created_at on insert, refreshed on every update.
    pub updated_at: DateTime<Utc>,
    pub views_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPost {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category_id: Id,
}

/// Full-field replacement; partial updates are not offered for posts.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdatePost {
    pub title: String,
    pub description: String,
    pub image_url: Option<String>,
    pub category_id: Id,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Like {
    pub id: Id,
    pub user_id: Id,
    pub post_id: Id,
    /// Reaction polarity. Persisted as-is; the server attaches no meaning.
    pub status: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewLike {
    pub post_id: Id,
    pub status: bool,
}

/// Sort direction for post listings, restricted to a closed token set so the
/// ORDER BY clause is never built from raw request text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl FromStr for SortOrder {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(()),
        }
    }
}

/// Filter/pagination descriptor for the post listing.
///
/// `page` is 1-based. An empty `search` and `None` id filters mean "match
/// everything". Both backends reject page/limit values below 1 rather than
/// clamping them.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListPostsParams {
    pub page: i64,
    pub limit: i64,
    pub search: String,
    pub user_id: Option<Id>,
    pub category_id: Option<Id>,
    pub sort_by_date: Option<SortOrder>,
}

impl ListPostsParams {
    pub fn offset(&self) -> i64 {
        (self.page - 1) * self.limit
    }

    pub fn order(&self) -> SortOrder {
        self.sort_by_date.unwrap_or(SortOrder::Desc)
    }
}

impl Default for ListPostsParams {
    fn default() -> Self {
        Self {
            page: 1,
            limit: 10,
            search: String::new(),
            user_id: None,
            category_id: None,
            sort_by_date: None,
        }
    }
}

/// One page of posts plus the total match count ignoring pagination.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PostPage {
    pub posts: Vec<Post>,
    pub total: i64,
}
