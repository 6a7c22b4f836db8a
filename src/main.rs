use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::JoinHandle;
use std::time::Duration;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use axum::body::Body;
use http::{HeaderValue, StatusCode};
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::SmartIpKeyExtractor;
use tower_governor::{GovernorError, GovernorLayer};

mod config;
mod db;
mod error;
mod i18n;
mod middleware;
mod routes;
mod services;
#[cfg(test)]
mod test_support;

use config::Config;
use services::captcha::CaptchaVerifier;
use services::eventbrite::{EventbriteOAuth, TicketingApi};
use services::init;
use services::membership::MembershipApi;

pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub config: Config,
    pub eventbrite: Arc<dyn TicketingApi>,
    pub oauth: EventbriteOAuth,
    pub membership: Arc<dyn MembershipApi>,
    pub captcha: Arc<dyn CaptchaVerifier>,
}

/// Error response for both rate limiters, in the same shape as `AppError::RateLimited`.
fn rate_limit_response(error: GovernorError) -> http::Response<Body> {
    let (status, body, headers, retry_after) = match error {
        GovernorError::TooManyRequests { wait_time, headers } => (
            StatusCode::TOO_MANY_REQUESTS,
            serde_json::json!({
                "error": {
                    "code": "RATE_LIMITED",
                    "message": "Rate limit exceeded",
                    "details": { "retry_after_seconds": wait_time }
                }
            }),
            headers,
            Some(wait_time),
        ),
        GovernorError::UnableToExtractKey => (
            StatusCode::BAD_REQUEST,
            serde_json::json!({
                "error": {
                    "code": "INVALID_REQUEST",
                    "message": "Unable to determine client IP for rate limiting"
                }
            }),
            None,
            None,
        ),
        GovernorError::Other { code, msg, headers } => (
            StatusCode::from_u16(code.as_u16()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            serde_json::json!({
                "error": {
                    "code": "RATE_LIMIT_ERROR",
                    "message": msg.unwrap_or_else(|| "Rate limiting error".to_string())
                }
            }),
            headers,
            None,
        ),
    };

    let mut resp = http::Response::new(Body::from(body.to_string()));
    *resp.status_mut() = status;
    resp.headers_mut().insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );

    // Include any headers provided by the governor (e.g., X-RateLimit-* if enabled)
    if let Some(hmap) = headers {
        for (name, value) in hmap.iter() {
            resp.headers_mut().append(name.clone(), value.clone());
        }
    }
    if let Some(seconds) = retry_after {
        resp.headers_mut()
            .insert(http::header::RETRY_AFTER, HeaderValue::from(seconds));
    }

    resp
}

/// Periodically drops stale limiter entries until `flag` is raised.
fn spawn_limiter_cleanup<F>(name: &'static str, flag: Arc<AtomicBool>, retain: F) -> JoinHandle<()>
where
    F: Fn() -> usize + Send + 'static,
{
    std::thread::spawn(move || {
        let interval = Duration::from_secs(60);
        // Use smaller sleep granularity to allow quick shutdown.
        let tick = Duration::from_secs(1);
        loop {
            for _ in 0..interval.as_secs() {
                if flag.load(Ordering::SeqCst) {
                    tracing::info!("{} rate limiter cleanup thread exiting", name);
                    return;
                }
                std::thread::sleep(tick);
            }
            tracing::debug!("{} rate limiter size: {}", name, retain());
        }
    })
}

async fn shutdown_signal(flag: Arc<AtomicBool>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to bind SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, draining connections");
    flag.store(true, Ordering::SeqCst);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "member_discounts=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    tracing::info!("Starting member discounts service");

    let pool = init::init_db(&config).await?;
    let app_state = init::build_state(config.clone(), pool)?;

    let thread_shutdown = Arc::new(AtomicBool::new(false));

    // Organizer login is public; throttle it per client IP.
    let mut auth_builder = GovernorConfigBuilder::default();
    auth_builder.per_second(config.rate_limit.auth_per_second.into());
    auth_builder.burst_size(config.rate_limit.auth_burst);
    auth_builder.key_extractor(SmartIpKeyExtractor);
    auth_builder.error_handler(rate_limit_response);
    let auth_gov_conf = Arc::new(
        auth_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build auth governor config"))?,
    );
    let auth_cleaner = {
        let limiter = auth_gov_conf.limiter().clone();
        spawn_limiter_cleanup("Auth", thread_shutdown.clone(), move || {
            limiter.retain_recent();
            limiter.len()
        })
    };
    let auth_rate_layer = GovernorLayer {
        config: auth_gov_conf.clone(),
    };

    // Buyer pages and the redeem form call Eventbrite and the membership registry.
    let mut redeem_builder = GovernorConfigBuilder::default();
    redeem_builder.per_second(config.rate_limit.redeem_per_second.into());
    redeem_builder.burst_size(config.rate_limit.redeem_burst);
    redeem_builder.key_extractor(SmartIpKeyExtractor);
    redeem_builder.error_handler(rate_limit_response);
    let redeem_gov_conf = Arc::new(
        redeem_builder
            .finish()
            .ok_or_else(|| anyhow::anyhow!("Failed to build redeem governor config"))?,
    );
    let redeem_cleaner = {
        let limiter = redeem_gov_conf.limiter().clone();
        spawn_limiter_cleanup("Redeem", thread_shutdown.clone(), move || {
            limiter.retain_recent();
            limiter.len()
        })
    };
    let redeem_rate_layer = GovernorLayer {
        config: redeem_gov_conf.clone(),
    };

    let allowed_origin = config
        .server
        .public_url
        .trim_end_matches('/')
        .parse::<HeaderValue>()
        .map_err(|e| anyhow::anyhow!("Invalid PUBLIC_URL for CORS: {}", e))?;

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        // Eventbrite OAuth login
        .nest("/api/auth", routes::auth::router().layer(auth_rate_layer))
        // Organizer event selection and discount management
        .nest("/api/events", routes::organizer::router())
        // Public buyer pages and redemption
        .nest(
            "/api/landing",
            routes::buyer::router().layer(redeem_rate_layer),
        )
        .nest("/language", routes::language::router())
        .with_state(app_state.clone())
        .layer(axum::middleware::from_fn(middleware::csp::csp_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin)
                .allow_methods([
                    http::Method::GET,
                    http::Method::POST,
                    http::Method::DELETE,
                    http::Method::OPTIONS,
                ])
                .allow_headers([
                    http::header::CONTENT_TYPE,
                    http::header::AUTHORIZATION,
                    http::header::ACCEPT,
                    http::header::ACCEPT_LANGUAGE,
                ])
                .allow_credentials(true),
        );

    let addr = format!("{}:{}", config.server.host, config.server.port);
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal(thread_shutdown.clone()));

    if let Err(e) = server.await {
        tracing::error!("Server error: {}", e);
    }

    // Also covers a server error, where the signal never fired.
    thread_shutdown.store(true, Ordering::SeqCst);
    if let Err(e) = auth_cleaner.join() {
        tracing::warn!("Auth cleanup thread join failed: {:?}", e);
    }
    if let Err(e) = redeem_cleaner.join() {
        tracing::warn!("Redeem cleanup thread join failed: {:?}", e);
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
