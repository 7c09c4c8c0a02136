#![cfg(feature = "inmem-store")]

use actix_web::{test, App};
use quill::rate_limit::{InMemoryRateLimiter, RateLimitConfig, RateLimiterFacade};
use quill::repo::inmem::InMemRepo;
use quill::{config, AppState, SecurityHeaders};
use serial_test::serial;
use std::sync::Arc;

fn setup_env() {
    std::env::set_var("JWT_SECRET", "test-secret-must-be-32-bytes-long!!");
    let tmp = tempfile::tempdir().unwrap();
    std::env::set_var("QUILL_DATA_DIR", tmp.path().to_str().unwrap());
    std::env::remove_var("ENABLE_HSTS");
}

fn state() -> AppState {
    AppState {
        repo: Arc::new(InMemRepo::new()),
        rate_limiter: RateLimiterFacade::new(
            InMemoryRateLimiter::new(false),
            RateLimitConfig::from_env(),
        ),
    }
}

#[actix_web::test]
#[serial]
async fn baseline_headers_present() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env())
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
    let resp = test::call_service(&app, req).await;
    assert!(resp.status().is_success());

    let headers = resp.headers();
    assert!(headers
        .get("content-security-policy")
        .unwrap()
        .to_str()
        .unwrap()
        .contains("default-src 'self'"));
    assert_eq!(headers.get("x-content-type-options").unwrap(), "nosniff");
    assert_eq!(headers.get("x-frame-options").unwrap(), "DENY");
    assert_eq!(headers.get("referrer-policy").unwrap(), "no-referrer");
    // HSTS only when opted in
    assert!(headers.get("strict-transport-security").is_none());
}

#[actix_web::test]
#[serial]
async fn hsts_enabled_by_flag() {
    setup_env();
    let app = test::init_service(
        App::new()
            .wrap(SecurityHeaders::from_env().with_hsts(true))
            .app_data(actix_web::web::Data::new(state()))
            .configure(config),
    )
    .await;

    let req = test::TestRequest::get().uri("/api/v1/categories").to_request();
    let resp = test::call_service(&app, req).await;
    let hsts = resp.headers().get("strict-transport-security").unwrap();
    assert!(hsts.to_str().unwrap().contains("max-age="));
}
