#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::{config, AppState};
use serial_test::serial;
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("QUILL_DATA_DIR", tmp.path().to_str().unwrap());
}

#[actix_web::test]
#[serial]
async fn signup_rate_limit_enforced() {
    setup_env();
    std::env::set_var("RL_SIGNUP_LIMIT", "2");
    std::env::set_var("RL_SIGNUP_WINDOW", "60");

    let state = AppState {
        repo: Arc::new(InMemRepo::new()),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(true),
            RateLimitConfig::from_env(),
        ),
    };
    let app = test::init_service(
        App::new()
            .app_data(actix_web::web::Data::new(state))
            .configure(config),
    )
    .await;

    for i in 0..2 {
        let req = test::TestRequest::post()
            .uri("/api/v1/users")
            .set_json(&serde_json::json!({
                "username": format!("user{i}"),
                "email": format!("user{i}@example.com")
            }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), 201);
    }

    // window is full: third signup from the same peer is rejected
    let req = test::TestRequest::post()
        .uri("/api/v1/users")
        .set_json(&serde_json::json!({"username":"user2","email":"user2@example.com"}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 429);

    std::env::remove_var("RL_SIGNUP_LIMIT");
    std::env::remove_var("RL_SIGNUP_WINDOW");
}
