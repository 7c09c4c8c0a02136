use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::Lazy;

use crate::auth::Auth;
use crate::error::ApiError;
use crate::models::*;
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            .service(
                web::resource("/posts")
                    .route(web::get().to(list_posts))
                    .route(web::post().to(create_post)),
            )
            .service(
                web::resource("/posts/{id}")
                    .route(web::get().to(get_post))
                    .route(web::put().to(update_post))
                    .route(web::delete().to(delete_post)),
            )
            .service(web::resource("/likes").route(web::post().to(create_or_update_like)))
            .service(web::resource("/likes/user-post").route(web::get().to(get_like)))
            .service(
                web::resource("/categories")
                    .route(web::get().to(list_categories))
                    .route(web::post().to(create_category)),
            )
            .service(
                web::resource("/categories/{id}")
                    .route(web::patch().to(update_category))
                    .route(web::delete().to(delete_category)),
            )
            .service(web::resource("/users").route(web::post().to(create_user)))
            .service(
                web::resource("/users/{id}")
                    .route(web::get().to(get_user))
                    .route(web::delete().to(delete_user)),
            )
            .service(web::resource("/auth/me").route(web::get().to(auth_me))),
    );
    // no /api/v1 prefix so Prometheus scrape configs stay conventional
    cfg.route("/metrics", web::get().to(render_metrics));
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub rate_limiter: RateLimiterFacade,
}

fn peer_ip(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

static PROMETHEUS: Lazy<PrometheusHandle> = Lazy::new(|| {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder")
});

/// Install the Prometheus recorder. Counters recorded before this land in the
/// no-op recorder, so call it during bootstrap.
pub fn init_metrics() {
    Lazy::force(&PROMETHEUS);
}

pub async fn render_metrics() -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/plain; version=0.0.4")
        .body(PROMETHEUS.render())
}

// ---------------- posts ----------------

#[derive(Debug, serde::Deserialize)]
pub struct ListPostsQuery {
    #[serde(default = "default_page")]
    page: i64,
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    search: String,
    user_id: Option<Id>,
    category_id: Option<Id>,
    sort_by_date: Option<String>,
}

fn default_page() -> i64 {
    1
}

fn default_limit() -> i64 {
    10
}

#[utoipa::path(
    get,
    path = "/api/v1/posts",
    params(
        ("page" = Option<i64>, Query, description = "1-based page number (default 1)"),
        ("limit" = Option<i64>, Query, description = "Page size (default 10)"),
        ("search" = Option<String>, Query, description = "Case-insensitive title substring"),
        ("user_id" = Option<i64>, Query, description = "Filter by author; 0 or absent = no filter"),
        ("category_id" = Option<i64>, Query, description = "Filter by category; 0 or absent = no filter"),
        ("sort_by_date" = Option<String>, Query, description = "asc or desc (default desc)")
    ),
    responses(
        (status = 200, description = "One page of posts plus total match count", body = PostPage),
        (status = 400, description = "Invalid pagination or sort token")
    )
)]
pub async fn list_posts(
    data: web::Data<AppState>,
    query: web::Query<ListPostsQuery>,
) -> Result<HttpResponse, ApiError> {
    let q = query.into_inner();
    let sort_by_date = match q.sort_by_date.as_deref() {
        None | Some("") => None,
        Some(tok) => Some(tok.parse::<SortOrder>().map_err(|_| {
            ApiError::BadRequest("sort_by_date must be 'asc' or 'desc'".into())
        })?),
    };
    let params = ListPostsParams {
        page: q.page,
        limit: q.limit,
        search: q.search,
        // wire compat: 0 means "no filter"
        user_id: q.user_id.filter(|&u| u != 0),
        category_id: q.category_id.filter(|&c| c != 0),
        sort_by_date,
    };
    let page = data.repo.list_posts(params).await?;
    Ok(HttpResponse::Ok().json(page))
}

#[utoipa::path(
    post,
    path = "/api/v1/posts",
    request_body = NewPost,
    responses(
        (status = 201, description = "Post created", body = Post),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Unknown category"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_post(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPost>,
) -> Result<HttpResponse, ApiError> {
    if !data.rate_limiter.allow_post(&peer_ip(&req)) {
        return Err(ApiError::RateLimited);
    }
    let post = data
        .repo
        .create_post(auth.0.user_id, payload.into_inner())
        .await?;
    metrics::counter!("quill_posts_created_total", 1);
    Ok(HttpResponse::Created().json(post))
}

#[utoipa::path(
    get,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post", body = Post),
        (status = 404, description = "Post not found")
    )
)]
pub async fn get_post(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let post = data.repo.get_post(id).await?;
    // read-path counter; a lost bump is not worth failing the request
    if let Err(e) = data.repo.bump_post_views(id).await {
        log::warn!("views bump failed for post {id}: {e}");
    }
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    put,
    path = "/api/v1/posts/{id}",
    request_body = UpdatePost,
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 200, description = "Post updated", body = Post),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn update_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePost>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_post(id).await?;
    if existing.user_id != auth.0.user_id && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let post = data.repo.update_post(id, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(post))
}

#[utoipa::path(
    delete,
    path = "/api/v1/posts/{id}",
    params(("id" = Id, Path, description = "Post id")),
    responses(
        (status = 204, description = "Post deleted"),
        (status = 403, description = "Not the author"),
        (status = 404, description = "Post not found")
    )
)]
pub async fn delete_post(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let id = path.into_inner();
    let existing = data.repo.get_post(id).await?;
    if existing.user_id != auth.0.user_id && !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_post(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- likes ----------------

#[utoipa::path(
    post,
    path = "/api/v1/likes",
    request_body = NewLike,
    responses(
        (status = 201, description = "Like recorded (inserted or overwritten)", body = Like),
        (status = 401, description = "Missing or invalid token"),
        (status = 409, description = "Unknown post"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_or_update_like(
    req: HttpRequest,
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewLike>,
) -> Result<HttpResponse, ApiError> {
    if !data.rate_limiter.allow_like(&peer_ip(&req)) {
        return Err(ApiError::RateLimited);
    }
    let like = data
        .repo
        .create_or_update_like(auth.0.user_id, payload.into_inner())
        .await?;
    metrics::counter!("quill_likes_recorded_total", 1);
    Ok(HttpResponse::Created().json(like))
}

#[derive(Debug, serde::Deserialize)]
pub struct LikeQuery {
    post_id: Id,
}

#[utoipa::path(
    get,
    path = "/api/v1/likes/user-post",
    params(("post_id" = Id, Query, description = "Post id")),
    responses(
        (status = 200, description = "The caller's like for the post", body = Like),
        (status = 404, description = "No like recorded for this pair")
    )
)]
pub async fn get_like(
    auth: Auth,
    data: web::Data<AppState>,
    query: web::Query<LikeQuery>,
) -> Result<HttpResponse, ApiError> {
    let like = data.repo.get_like(auth.0.user_id, query.post_id).await?;
    Ok(HttpResponse::Ok().json(like))
}

// ---------------- categories ----------------

#[utoipa::path(
    get,
    path = "/api/v1/categories",
    responses((status = 200, description = "List categories", body = [Category]))
)]
pub async fn list_categories(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    let categories = data.repo.list_categories().await?;
    Ok(HttpResponse::Ok().json(categories))
}

#[utoipa::path(
    post,
    path = "/api/v1/categories",
    request_body = NewCategory,
    responses(
        (status = 201, description = "Category created", body = Category),
        (status = 403, description = "Forbidden - Admins only")
    )
)]
pub async fn create_category(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCategory>,
) -> Result<HttpResponse, ApiError> {
    if !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let category = data.repo.create_category(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(category))
}

pub async fn update_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCategory>,
) -> Result<HttpResponse, ApiError> {
    if !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    let category = data
        .repo
        .update_category(path.into_inner(), payload.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(category))
}

pub async fn delete_category(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_category(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- users ----------------

#[utoipa::path(
    post,
    path = "/api/v1/users",
    request_body = NewUser,
    responses(
        (status = 201, description = "User created", body = User),
        (status = 409, description = "Username or email taken"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_user(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<NewUser>,
) -> Result<HttpResponse, ApiError> {
    if !data.rate_limiter.allow_signup(&peer_ip(&req)) {
        return Err(ApiError::RateLimited);
    }
    let user = data.repo.create_user(payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

#[utoipa::path(
    get,
    path = "/api/v1/users/{id}",
    params(("id" = Id, Path, description = "User id")),
    responses(
        (status = 200, description = "User", body = User),
        (status = 404, description = "User not found")
    )
)]
pub async fn get_user(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user = data.repo.get_user(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(user))
}

pub async fn delete_user(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !auth.0.is_admin() {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_user(path.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

// ---------------- auth ----------------

#[derive(serde::Serialize)]
struct MeResponse {
    user_id: Id,
    username: String,
    role: String,
}

#[utoipa::path(
    get,
    path = "/api/v1/auth/me",
    responses(
        (status = 200, description = "Current user claims"),
        (status = 401, description = "Unauthorized")
    )
)]
pub async fn auth_me(auth: Auth) -> Result<HttpResponse, ApiError> {
    let role = if auth.0.is_admin() { "admin" } else { "user" };
    let me = MeResponse {
        user_id: auth.0.user_id,
        username: auth.0.sub.clone(),
        role: role.to_string(),
    };
    Ok(HttpResponse::Ok().json(me))
}
