use actix_web::{
    dev::{forward_ready, Service, ServiceRequest, ServiceResponse, Transform},
    Error,
};
use futures::future::LocalBoxFuture;
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::future::{ready, Ready};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::utils::AppError;

struct Bucket {
    hits: u32,
    started: Instant,
    window: Duration,
}

impl Bucket {
    fn expired(&self) -> bool {
        self.started.elapsed() > self.window
    }
}

lazy_static! {
    /// Fixed-window counters keyed by `scope:peer-ip`.
    static ref BUCKETS: Mutex<HashMap<String, Bucket>> = Mutex::new(HashMap::new());
}

/// Returns `false` once `key` has used up `limit` requests in the current window.
///
/// Windows that have run out are dropped on every call, so the map only
/// holds clients seen within their scope's window.
pub fn check(key: &str, limit: u32, window: Duration) -> bool {
    let mut buckets = BUCKETS.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    buckets.retain(|_, bucket| !bucket.expired());

    let bucket = buckets.entry(key.to_string()).or_insert_with(|| Bucket {
        hits: 0,
        started: Instant::now(),
        window,
    });
    if bucket.hits >= limit {
        return false;
    }
    bucket.hits += 1;
    true
}

/// Per-client request budget. Separate scopes keep separate counters, so
/// the global limiter and the auth limiter do not share a budget.
pub struct RateLimit {
    scope: &'static str,
    limit: u32,
    window: Duration,
}

impl RateLimit {
    pub fn new(scope: &'static str, limit: u32, window: Duration) -> Self {
        RateLimit { scope, limit, window }
    }
}

impl<S, B> Transform<S, ServiceRequest> for RateLimit
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = RateLimitMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(RateLimitMiddleware {
            service,
            scope: self.scope,
            limit: self.limit,
            window: self.window,
        }))
    }
}

pub struct RateLimitMiddleware<S> {
    service: S,
    scope: &'static str,
    limit: u32,
    window: Duration,
}

impl<S, B> Service<ServiceRequest> for RateLimitMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error>,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    forward_ready!(service);

    fn call(&self, req: ServiceRequest) -> Self::Future {
        // Forwarded headers are client-controlled; only the socket peer counts.
        let ip = req
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let key = format!("{}:{}", self.scope, ip);

        if !check(&key, self.limit, self.window) {
            log::warn!("🚦 Rate limit exceeded for {} on {}", ip, req.path());
            return Box::pin(async move {
                Err(AppError::TooManyRequests(
                    "Too many requests, please try again later".to_string(),
                )
                .into())
            });
        }

        let fut = self.service.call(req);
        Box::pin(async move { fut.await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{http::StatusCode, test as actix_test, web, App, HttpResponse};

    fn tracked(key: &str) -> bool {
        BUCKETS
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .contains_key(key)
    }

    #[test]
    fn test_check_counts_per_key() {
        let window = Duration::from_secs(60);
        for _ in 0..3 {
            assert!(check("check-test:1.1.1.1", 3, window));
        }
        assert!(!check("check-test:1.1.1.1", 3, window));
        assert!(check("check-test:2.2.2.2", 3, window));
    }

    #[test]
    fn test_window_resets() {
        let window = Duration::from_millis(200);
        assert!(check("reset-test:ip", 1, window));
        assert!(!check("reset-test:ip", 1, window));
        std::thread::sleep(Duration::from_millis(300));
        assert!(check("reset-test:ip", 1, window));
    }

    #[test]
    fn test_expired_windows_are_evicted() {
        assert!(check("evict-test:old", 1, Duration::from_millis(200)));
        assert!(tracked("evict-test:old"));
        std::thread::sleep(Duration::from_millis(300));

        assert!(check("evict-test:new", 1, Duration::from_secs(60)));
        assert!(!tracked("evict-test:old"));
        assert!(tracked("evict-test:new"));
    }

    #[actix_rt::test]
    async fn test_forwarded_headers_do_not_reset_the_budget() {
        let app = actix_test::init_service(
            App::new().service(
                web::scope("/register")
                    .wrap(RateLimit::new("forwarded-test", 5, Duration::from_secs(900)))
                    .route("", web::post().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let mut accepted = 0;
        for i in 0..20 {
            let req = actix_test::TestRequest::post()
                .uri("/register")
                .peer_addr("10.0.0.8:4000".parse().unwrap())
                .insert_header(("x-forwarded-for", format!("1.2.3.{}", i)))
                .insert_header(("forwarded", format!("for=4.5.6.{}", i)))
                .to_request();
            match actix_test::try_call_service(&app, req).await {
                Ok(resp) => {
                    assert_eq!(resp.status(), StatusCode::OK);
                    accepted += 1;
                }
                Err(e) => assert_eq!(e.as_response_error().status_code(), StatusCode::TOO_MANY_REQUESTS),
            }
        }
        assert_eq!(accepted, 5);
        assert!(!tracked("forwarded-test:1.2.3.0"));
        assert!(tracked("forwarded-test:10.0.0.8"));
    }

    #[actix_rt::test]
    async fn test_middleware_returns_429_after_limit() {
        let app = actix_test::init_service(
            App::new().service(
                web::scope("/login")
                    .wrap(RateLimit::new("middleware-test", 5, Duration::from_secs(900)))
                    .route("", web::post().to(|| async { HttpResponse::Ok().finish() })),
            ),
        )
        .await;

        let request = || {
            actix_test::TestRequest::post()
                .uri("/login")
                .peer_addr("10.0.0.7:4000".parse().unwrap())
                .to_request()
        };

        for _ in 0..5 {
            let resp = actix_test::try_call_service(&app, request()).await.unwrap();
            assert_eq!(resp.status(), StatusCode::OK);
        }

        let err = actix_test::try_call_service(&app, request()).await.unwrap_err();
        assert_eq!(err.as_response_error().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }
}
