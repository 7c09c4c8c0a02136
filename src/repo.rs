use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::Utc;

use crate::models::*;

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("invalid request: {0}")] Invalid(&'static str),
    #[error("storage failure: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn create_user(&self, new: NewUser) -> RepoResult<User>;
    async fn get_user(&self, id: Id) -> RepoResult<User>;
    async fn delete_user(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait CategoryRepo: Send + Sync {
    async fn list_categories(&self) -> RepoResult<Vec<Category>>;
    async fn create_category(&self, new: NewCategory) -> RepoResult<Category>;
    async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category>;
    async fn delete_category(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Insert a post owned by `user_id`, returning the stored row with its
    /// generated id and timestamps.
    async fn create_post(&self, user_id: Id, new: NewPost) -> RepoResult<Post>;
    async fn get_post(&self, id: Id) -> RepoResult<Post>;
    /// One page of posts matching `params`, plus the total match count
    /// ignoring pagination. Rejects page/limit < 1 with `Invalid`.
    async fn list_posts(&self, params: ListPostsParams) -> RepoResult<PostPage>;
    /// Full-field update; refreshes `updated_at`.
    async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post>;
    async fn delete_post(&self, id: Id) -> RepoResult<()>;
    /// views_count += 1. Lives outside the listing/CRUD path; called by the
    /// read handler.
    async fn bump_post_views(&self, id: Id) -> RepoResult<()>;
}

#[async_trait]
pub trait LikeRepo: Send + Sync {
    /// Atomic insert-or-overwrite for the (user, post) pair. Callers cannot
    /// tell an insert from an update; the pair ends up with `new.status`.
    async fn create_or_update_like(&self, user_id: Id, new: NewLike) -> RepoResult<Like>;
    async fn get_like(&self, user_id: Id, post_id: Id) -> RepoResult<Like>;
}

pub trait Repo: UserRepo + CategoryRepo + PostRepo + LikeRepo {}

impl<T> Repo for T where T: UserRepo + CategoryRepo + PostRepo + LikeRepo {}

/// Shared by both backends so the page contract holds for library consumers,
/// not just the HTTP layer. Out-of-range values are rejected, never clamped.
pub(crate) fn validate_list_params(params: &ListPostsParams) -> RepoResult<()> {
    if params.page < 1 {
        return Err(RepoError::Invalid("page must be >= 1"));
    }
    if params.limit < 1 {
        return Err(RepoError::Invalid("limit must be >= 1"));
    }
    Ok(())
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        users: HashMap<Id, User>,
        categories: HashMap<Id, Category>,
        posts: HashMap<Id, Post>,
        likes: HashMap<Id, Like>,
        next_id: Id,
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("QUILL_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("QUILL_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        tracing::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        tracing::warn!("failed to parse snapshot '{}': {e}; starting empty", path.display());
                        State::default()
                    }
                },
                Err(_) => State::default(),
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    tracing::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }

        fn next_id(state: &mut State) -> Id {
            state.next_id += 1;
            state.next_id
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let mut s = self.state.write().unwrap();
            if s.users
                .values()
                .any(|u| u.username == new.username || u.email == new.email)
            {
                return Err(RepoError::Conflict);
            }
            let id = Self::next_id(&mut s);
            let user = User {
                id,
                username: new.username,
                email: new.email,
                created_at: Utc::now(),
            };
            s.users.insert(id, user.clone());
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            let s = self.state.read().unwrap();
            s.users.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.users.remove(&id).ok_or(RepoError::NotFound)?;
            // cascade, mirroring the schema's ON DELETE CASCADE
            let owned: Vec<Id> = s
                .posts
                .values()
                .filter(|p| p.user_id == id)
                .map(|p| p.id)
                .collect();
            for post_id in &owned {
                s.posts.remove(post_id);
            }
            s.likes
                .retain(|_, l| l.user_id != id && !owned.contains(&l.post_id));
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl CategoryRepo for InMemRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.categories.values().cloned().collect();
            v.sort_by_key(|c| c.id);
            Ok(v)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            let id = Self::next_id(&mut s);
            let category = Category {
                id,
                title: new.title,
                created_at: Utc::now(),
            };
            s.categories.insert(id, category.clone());
            drop(s);
            self.persist();
            Ok(category)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            let mut s = self.state.write().unwrap();
            let category = s.categories.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title {
                category.title = title;
            }
            let updated = category.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            if !s.categories.contains_key(&id) {
                return Err(RepoError::NotFound);
            }
            // posts keep a plain FK to categories; refuse like the store would
            if s.posts.values().any(|p| p.category_id == id) {
                return Err(RepoError::Conflict);
            }
            s.categories.remove(&id);
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn create_post(&self, user_id: Id, new: NewPost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&user_id) || !s.categories.contains_key(&new.category_id) {
                return Err(RepoError::Conflict);
            }
            let now = Utc::now();
            let id = Self::next_id(&mut s);
            let post = Post {
                id,
                title: new.title,
                description: new.description,
                image_url: new.image_url,
                user_id,
                category_id: new.category_id,
                created_at: now,
                updated_at: now,
                views_count: 0,
            };
            s.posts.insert(id, post.clone());
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let s = self.state.read().unwrap();
            s.posts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, params: ListPostsParams) -> RepoResult<PostPage> {
            validate_list_params(&params)?;
            let s = self.state.read().unwrap();
            let needle = params.search.to_lowercase();
            let mut matches: Vec<Post> = s
                .posts
                .values()
                .filter(|p| needle.is_empty() || p.title.to_lowercase().contains(&needle))
                .filter(|p| params.user_id.map_or(true, |u| p.user_id == u))
                .filter(|p| params.category_id.map_or(true, |c| p.category_id == c))
                .cloned()
                .collect();
            match params.order() {
                SortOrder::Asc => matches.sort_by(|a, b| a.created_at.cmp(&b.created_at)),
                SortOrder::Desc => matches.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
            }
            let total = matches.len() as i64;
            let posts = matches
                .into_iter()
                .skip(params.offset() as usize)
                .take(params.limit as usize)
                .collect();
            Ok(PostPage { posts, total })
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let mut s = self.state.write().unwrap();
            if !s.categories.contains_key(&upd.category_id) {
                return Err(RepoError::Conflict);
            }
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.title = upd.title;
            post.description = upd.description;
            post.image_url = upd.image_url;
            post.category_id = upd.category_id;
            post.updated_at = Utc::now();
            let updated = post.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.posts.remove(&id).ok_or(RepoError::NotFound)?;
            s.likes.retain(|_, l| l.post_id != id);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn bump_post_views(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            let post = s.posts.get_mut(&id).ok_or(RepoError::NotFound)?;
            post.views_count += 1;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl LikeRepo for InMemRepo {
        async fn create_or_update_like(&self, user_id: Id, new: NewLike) -> RepoResult<Like> {
            // find-or-insert under one write lock; same guarantee the SQL
            // backend gets from ON CONFLICT
            let mut s = self.state.write().unwrap();
            if !s.users.contains_key(&user_id) || !s.posts.contains_key(&new.post_id) {
                return Err(RepoError::Conflict);
            }
            if let Some(existing) = s
                .likes
                .values_mut()
                .find(|l| l.user_id == user_id && l.post_id == new.post_id)
            {
                existing.status = new.status;
                let like = existing.clone();
                drop(s);
                self.persist();
                return Ok(like);
            }
            let id = Self::next_id(&mut s);
            let like = Like {
                id,
                user_id,
                post_id: new.post_id,
                status: new.status,
            };
            s.likes.insert(id, like.clone());
            drop(s);
            self.persist();
            Ok(like)
        }

        async fn get_like(&self, user_id: Id, post_id: Id) -> RepoResult<Like> {
            let s = self.state.read().unwrap();
            s.likes
                .values()
                .find(|l| l.user_id == user_id && l.post_id == post_id)
                .cloned()
                .ok_or(RepoError::NotFound)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::{Pool, Postgres};

    const POST_COLS: &str =
        "id, title, description, image_url, user_id, category_id, created_at, updated_at, views_count";

    // Guard predicates make one static statement cover every filter
    // combination; all request values arrive as bound parameters.
    const LIST_FILTER: &str = "($1 = '' OR title ILIKE '%' || $1 || '%') \
         AND ($2::bigint IS NULL OR user_id = $2) \
         AND ($3::bigint IS NULL OR category_id = $3)";

    fn map_sqlx(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) => match db.kind() {
                sqlx::error::ErrorKind::UniqueViolation
                | sqlx::error::ErrorKind::ForeignKeyViolation => RepoError::Conflict,
                _ => RepoError::Internal(db.to_string()),
            },
            other => RepoError::Internal(other.to_string()),
        }
    }

    #[derive(Clone)]
    pub struct PgRepo {
        pool: Pool<Postgres>,
    }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self {
            Self { pool }
        }
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn create_user(&self, new: NewUser) -> RepoResult<User> {
            let rec = sqlx::query_as::<_, User>(
                "INSERT INTO users (username, email) VALUES ($1, $2) \
                 RETURNING id, username, email, created_at",
            )
            .bind(&new.username)
            .bind(&new.email)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(rec)
        }

        async fn get_user(&self, id: Id) -> RepoResult<User> {
            sqlx::query_as::<_, User>(
                "SELECT id, username, email, created_at FROM users WHERE id = $1",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_user(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl CategoryRepo for PgRepo {
        async fn list_categories(&self) -> RepoResult<Vec<Category>> {
            let recs = sqlx::query_as::<_, Category>(
                "SELECT id, title, created_at FROM categories ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(recs)
        }

        async fn create_category(&self, new: NewCategory) -> RepoResult<Category> {
            let rec = sqlx::query_as::<_, Category>(
                "INSERT INTO categories (title) VALUES ($1) RETURNING id, title, created_at",
            )
            .bind(&new.title)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(rec)
        }

        async fn update_category(&self, id: Id, upd: UpdateCategory) -> RepoResult<Category> {
            sqlx::query_as::<_, Category>(
                "UPDATE categories SET title = COALESCE($2, title) WHERE id = $1 \
                 RETURNING id, title, created_at",
            )
            .bind(id)
            .bind(upd.title.as_ref())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or(RepoError::NotFound)
        }

        async fn delete_category(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM categories WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn create_post(&self, user_id: Id, new: NewPost) -> RepoResult<Post> {
            let sql = format!(
                "INSERT INTO posts (title, description, image_url, user_id, category_id) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING {POST_COLS}"
            );
            let rec = sqlx::query_as::<_, Post>(&sql)
                .bind(&new.title)
                .bind(&new.description)
                .bind(new.image_url.as_ref())
                .bind(user_id)
                .bind(new.category_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(rec)
        }

        async fn get_post(&self, id: Id) -> RepoResult<Post> {
            let sql = format!("SELECT {POST_COLS} FROM posts WHERE id = $1");
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?
                .ok_or(RepoError::NotFound)
        }

        async fn list_posts(&self, params: ListPostsParams) -> RepoResult<PostPage> {
            validate_list_params(&params)?;
            let select = format!(
                "SELECT {POST_COLS} FROM posts WHERE {LIST_FILTER} \
                 ORDER BY created_at {} LIMIT $4 OFFSET $5",
                params.order().as_sql()
            );
            let posts = sqlx::query_as::<_, Post>(&select)
                .bind(&params.search)
                .bind(params.user_id)
                .bind(params.category_id)
                .bind(params.limit)
                .bind(params.offset())
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)?;
            // same predicate, no ordering/pagination
            let count = format!("SELECT count(*) FROM posts WHERE {LIST_FILTER}");
            let total: i64 = sqlx::query_scalar(&count)
                .bind(&params.search)
                .bind(params.user_id)
                .bind(params.category_id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(PostPage { posts, total })
        }

        async fn update_post(&self, id: Id, upd: UpdatePost) -> RepoResult<Post> {
            let sql = format!(
                "UPDATE posts SET title = $2, description = $3, image_url = $4, \
                 category_id = $5, updated_at = now() WHERE id = $1 RETURNING {POST_COLS}"
            );
            sqlx::query_as::<_, Post>(&sql)
                .bind(id)
                .bind(&upd.title)
                .bind(&upd.description)
                .bind(upd.image_url.as_ref())
                .bind(upd.category_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?
                .ok_or(RepoError::NotFound)
        }

        async fn delete_post(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn bump_post_views(&self, id: Id) -> RepoResult<()> {
            let res = sqlx::query("UPDATE posts SET views_count = views_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl LikeRepo for PgRepo {
        async fn create_or_update_like(&self, user_id: Id, new: NewLike) -> RepoResult<Like> {
            // single conflict-resolving statement; never check-then-insert
            let rec = sqlx::query_as::<_, Like>(
                "INSERT INTO likes (user_id, post_id, status) VALUES ($1, $2, $3) \
                 ON CONFLICT (user_id, post_id) DO UPDATE SET status = EXCLUDED.status \
                 RETURNING id, user_id, post_id, status",
            )
            .bind(user_id)
            .bind(new.post_id)
            .bind(new.status)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(rec)
        }

        async fn get_like(&self, user_id: Id, post_id: Id) -> RepoResult<Like> {
            sqlx::query_as::<_, Like>(
                "SELECT id, user_id, post_id, status FROM likes \
                 WHERE user_id = $1 AND post_id = $2",
            )
            .bind(user_id)
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?
            .ok_or(RepoError::NotFound)
        }
    }
}
