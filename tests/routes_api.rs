#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use quill::auth::{create_jwt, Role};
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::{config, AppState, SecurityHeaders};
use serial_test::serial;
use std::sync::Arc;

// Helper to ensure JWT secret present & unique temp data dir per test
fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("QUILL_DATA_DIR", tmp.path().to_str().unwrap());
}

fn test_state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        // limiter off so flow tests never trip it; covered in tests/rate_limit.rs
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig::from_env(),
        ),
    }
}

fn admin_token() -> String {
    create_jwt(1_000, "admin", vec![Role::Admin]).unwrap()
}

fn user_token(user_id: i64, name: &str) -> String {
    create_jwt(user_id, name, vec![Role::User]).unwrap()
}

#[actix_web::test]
#[serial]
async fn test_post_lifecycle_routes() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(test_state()))
            .configure(config),
    )
    .await;

    // sign up an author
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(&serde_json::json!({"username":"alice","email":"alice@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let user: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let user_id = user["id"].as_i64().unwrap();

    // category creation is admin-only
    let req = test::TestRequest::post()
        .uri("/api/v1/categories")
        .insert_header(("Authorization", format!("Bearer {}", user_token(user_id, "alice"))))
        .set_json(&serde_json::json!({"title":"Tech"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::post()
        .uri("/api/v1/categories")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"title":"Tech"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let category: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let category_id = category["id"].as_i64().unwrap();

    // unauthenticated post creation is rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .set_json(&serde_json::json!({
            "title": "Hello",
            "description": "first post",
            "image_url": null,
            "category_id": category_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);

    // authorship comes from the token, not the body
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", format!("Bearer {}", user_token(user_id, "alice"))))
        .set_json(&serde_json::json!({
            "title": "Hello",
            "description": "first post",
            "image_url": null,
            "category_id": category_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let post: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    let post_id = post["id"].as_i64().unwrap();
    assert_eq!(post["user_id"].as_i64().unwrap(), user_id);

    // list: one match, total 1
    let req = test::TestRequest::get().uri("/api/v1/posts").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page["posts"].as_array().unwrap().len(), 1);
    assert_eq!(page["total"].as_i64().unwrap(), 1);

    // each read bumps the view counter
    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{post_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{post_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    let seen: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(seen["views_count"].as_i64().unwrap(), 1);

    // only the author (or an admin) may update
    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .insert_header(("Authorization", format!("Bearer {}", user_token(user_id + 1, "mallory"))))
        .set_json(&serde_json::json!({
            "title": "Hijacked",
            "description": "",
            "image_url": null,
            "category_id": category_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 403);

    let req = test::TestRequest::put()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .insert_header(("Authorization", format!("Bearer {}", user_token(user_id, "alice"))))
        .set_json(&serde_json::json!({
            "title": "Hello, edited",
            "description": "first post, longer now",
            "image_url": "https://img.example.com/cover.png",
            "category_id": category_id
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let upd: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(upd["title"], "Hello, edited");

    // delete, then confirm 404s
    let req = test::TestRequest::delete()
        .uri(&format!("/api/v1/posts/{post_id}"))
        .insert_header(("Authorization", format!("Bearer {}", user_token(user_id, "alice"))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 204);

    let req = test::TestRequest::get().uri(&format!("/api/v1/posts/{post_id}")).to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
#[serial]
async fn test_listing_validation_routes() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(test_state()))
            .configure(config),
    )
    .await;

    // page below 1 is rejected, not clamped
    let req = test::TestRequest::get().uri("/api/v1/posts?page=0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    let req = test::TestRequest::get().uri("/api/v1/posts?limit=0").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // sort token outside the allow-list
    let req = test::TestRequest::get()
        .uri("/api/v1/posts?sort_by_date=sideways")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);

    // empty store still answers with an empty page
    let req = test::TestRequest::get().uri("/api/v1/posts?page=7&limit=50").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let page: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(page["total"].as_i64().unwrap(), 0);
    assert!(page["posts"].as_array().unwrap().is_empty());
}

#[actix_web::test]
#[serial]
async fn test_like_routes() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(test_state()))
            .configure(config),
    )
    .await;

    // author + category + post fixtures
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(&serde_json::json!({"username":"bob","email":"bob@example.com"}))
        .to_request();
    let user: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let user_id = user["id"].as_i64().unwrap();

    let req = test::TestRequest::post()
        .uri("/api/v1/categories")
        .insert_header(("Authorization", format!("Bearer {}", admin_token())))
        .set_json(&serde_json::json!({"title":"General"}))
        .to_request();
    let category: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();

    let token = user_token(user_id, "bob");
    let req = test::TestRequest::post()
        .uri("/api/v1/posts")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({
            "title": "Likeable",
            "description": "react to me",
            "image_url": null,
            "category_id": category["id"].as_i64().unwrap()
        }))
        .to_request();
    let post: serde_json::Value =
        serde_json::from_slice(&test::read_body(test::call_service(&app, req).await).await).unwrap();
    let post_id = post["id"].as_i64().unwrap();

    // nothing recorded yet -> 404, distinguishable from a server error
    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/likes/user-post?post_id={post_id}"))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);

    // first reaction
    let req = test::TestRequest::post()
        .uri("/api/v1/likes")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({"post_id": post_id, "status": true}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let first: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(first["status"], true);

    // same pair again overwrites instead of duplicating
    let req = test::TestRequest::post()
        .uri("/api/v1/likes")
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .set_json(&serde_json::json!({"post_id": post_id, "status": false}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 201);
    let second: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["status"], false);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/likes/user-post?post_id={post_id}"))
        .insert_header(("Authorization", format!("Bearer {}", token)))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let fetched: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(fetched["status"], false);
}

#[actix_web::test]
#[serial]
async fn test_auth_me() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(test_state()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get()
        .uri("/api/v1/auth/me")
        .insert_header(("Authorization", format!("Bearer {}", user_token(7, "greta"))))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());
    let me: serde_json::Value = serde_json::from_slice(&test::read_body(resp).await).unwrap();
    assert_eq!(me["role"], "user");
    assert_eq!(me["user_id"].as_i64().unwrap(), 7);

    // no token -> 401
    let req = test::TestRequest::get().uri("/api/v1/auth/me").to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 401);
}
