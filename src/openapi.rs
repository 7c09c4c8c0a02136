use crate::models::{
    Category, Like, ListPostsParams, NewCategory, NewLike, NewPost, NewUser, Post, PostPage,
    SortOrder, UpdateCategory, UpdatePost, User,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_posts,
        crate::routes::create_post,
        crate::routes::get_post,
        crate::routes::update_post,
        crate::routes::delete_post,
        crate::routes::create_or_update_like,
        crate::routes::get_like,
        crate::routes::list_categories,
        crate::routes::create_category,
        crate::routes::create_user,
        crate::routes::get_user,
        crate::routes::auth_me,
    ),
    components(schemas(
        Post, NewPost, UpdatePost, PostPage, ListPostsParams, SortOrder,
        Like, NewLike, Category, NewCategory, UpdateCategory, User, NewUser
    )),
    tags(
        (name = "posts", description = "Post CRUD and listing"),
        (name = "likes", description = "Like upsert and lookup"),
        (name = "categories", description = "Category operations"),
        (name = "users", description = "User operations"),
    )
)]
pub struct ApiDoc;
