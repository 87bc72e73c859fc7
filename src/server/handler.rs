// Axum request dispatcher: validates scrape requests and maps session outcomes to HTTP.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use super::rate_limit::ClientRateLimiter;
use crate::config::ServiceConfig;
use crate::engine::session::SessionManager;
use crate::error::{PortalError, ScrapeError};
use crate::model::{Airline, Schedule, SessionKey};
use crate::vault::Credentials;

/// Slack on top of the scrape timeout before the HTTP layer gives up on a request.
const REQUEST_TIMEOUT_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<SessionManager>,
    pub limiter: Arc<ClientRateLimiter>,
}

pub struct ScrapeServer {
    addr: SocketAddr,
    manager: Arc<SessionManager>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    cleanup_token: CancellationToken,
    server_task: JoinHandle<()>,
}

impl ScrapeServer {
    /// Bind the configured address and start serving in the background.
    pub async fn start(config: &ServiceConfig, manager: Arc<SessionManager>) -> Result<Self> {
        let listener =
            TcpListener::bind((config.server.bind_addr, config.server.port)).await?;
        let addr = listener.local_addr()?;

        let limiter = Arc::new(ClientRateLimiter::new(&config.rate_limit));
        let state = AppState {
            manager: Arc::clone(&manager),
            limiter: Arc::clone(&limiter),
        };
        let app = router(state, config.scrape.timeout + REQUEST_TIMEOUT_GRACE);

        let cleanup_token = CancellationToken::new();
        spawn_limiter_cleanup(limiter, cleanup_token.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_task = tokio::spawn(async move {
            let served = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await;
            if let Err(e) = served {
                warn!("scrape server stopped with error: {}", e);
            }
        });

        info!("scrape server listening on {}", addr);

        Ok(Self {
            addr,
            manager,
            shutdown_tx: Some(shutdown_tx),
            cleanup_token,
            server_task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Build a loopback URL for `path` on this server.
    pub fn url(&self, path: &str) -> String {
        let host = if self.addr.ip().is_unspecified() {
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        } else {
            self.addr.ip()
        };
        format!("http://{}{}", SocketAddr::new(host, self.addr.port()), path)
    }

    pub fn manager(&self) -> &Arc<SessionManager> {
        &self.manager
    }

    /// Stop accepting connections and wait for in-progress requests to drain.
    pub async fn shutdown(mut self) {
        self.cleanup_token.cancel();
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.server_task.await {
            warn!("scrape server task failed: {}", e);
        }
        info!("scrape server shut down");
    }
}

fn spawn_limiter_cleanup(limiter: Arc<ClientRateLimiter>, token: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(limiter.window());
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let dropped = limiter.cleanup();
                    if dropped > 0 {
                        debug!("rate limiter forgot {} idle clients", dropped);
                    }
                }
                _ = token.cancelled() => return,
            }
        }
    });
}

/// Assemble the HTTP surface: health, scrape, CORS for any origin.
///
/// Per-client rate limiting needs the peer address. Serve the router with
/// `into_make_service_with_connect_info::<SocketAddr>()`, otherwise requests
/// pass the limiter unchecked.
pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let scrape_routes = Router::new()
        .route("/api/scrape", post(scrape_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .merge(scrape_routes)
        .fallback(not_found)
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Request body of `POST /api/scrape`. Not `Debug`, it carries a password.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub airline: Option<String>,
    #[serde(default)]
    pub force_refresh: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapeResponse {
    pub success: bool,
    pub pilot: String,
    pub airline: Airline,
    pub schedule: Vec<ScheduleItem>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ScheduleItem {
    pub flight: String,
    pub date: String,
    pub time: Option<String>,
    pub route: String,
    pub crew: Vec<String>,
}

impl From<&Schedule> for ScrapeResponse {
    fn from(schedule: &Schedule) -> Self {
        let items = schedule
            .entries
            .iter()
            .map(|entry| ScheduleItem {
                flight: entry.flight_number.clone(),
                date: entry.date.clone(),
                time: entry.departure_time.clone(),
                route: entry.route.to_string(),
                crew: entry.crew_roster.clone(),
            })
            .collect();
        Self {
            success: true,
            pilot: schedule.pilot.clone(),
            airline: schedule.airline,
            schedule: items,
            fetched_at: schedule.fetched_at,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Scrape(#[from] ScrapeError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Scrape(ScrapeError::Portal(portal)) => match portal {
                PortalError::Auth => StatusCode::UNAUTHORIZED,
                PortalError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
                PortalError::Network(_) => StatusCode::BAD_GATEWAY,
                PortalError::Parse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Scrape(ScrapeError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Scrape(ScrapeError::Aborted) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the client. Portal internals stay in the logs.
    fn public_message(&self) -> String {
        match self {
            ApiError::Validation(msg) => msg.clone(),
            ApiError::Scrape(ScrapeError::Portal(portal)) => match portal {
                PortalError::Auth => "invalid username or password".to_string(),
                PortalError::RateLimited { .. } => {
                    "crew portal is rate limiting requests, try again later".to_string()
                }
                PortalError::Network(_) => "crew portal is unavailable".to_string(),
                PortalError::Parse(_) => "unexpected response from crew portal".to_string(),
            },
            ApiError::Scrape(ScrapeError::Timeout(_)) => {
                "crew portal did not respond in time".to_string()
            }
            ApiError::Scrape(ScrapeError::Aborted) => "scrape aborted".to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({ "success": false, "error": self.public_message() }));
        let mut resp = (status, body).into_response();

        if let ApiError::Scrape(ScrapeError::Portal(PortalError::RateLimited {
            retry_after: Some(delay),
        })) = &self
        {
            if let Ok(value) = HeaderValue::from_str(&delay.as_secs().to_string()) {
                resp.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        resp
    }
}

fn required(field: Option<String>) -> Option<String> {
    field.filter(|value| !value.trim().is_empty())
}

/// POST /api/scrape: log in to the pilot's crew portal and return the schedule.
async fn scrape_handler(
    State(state): State<AppState>,
    payload: Result<Json<ScrapeRequest>, JsonRejection>,
) -> Result<Json<ScrapeResponse>, ApiError> {
    let Json(request) =
        payload.map_err(|_| ApiError::Validation("invalid request body".to_string()))?;

    let (username, password, airline) = match (
        required(request.username),
        required(request.password),
        required(request.airline),
    ) {
        (Some(u), Some(p), Some(a)) => (u, p, a),
        _ => {
            return Err(ApiError::Validation(
                "username, password and airline are required".to_string(),
            ))
        }
    };

    let airline: Airline = airline
        .parse()
        .map_err(|_| ApiError::Validation("unknown airline".to_string()))?;

    let key = SessionKey::new(username.as_str(), airline);
    let credentials = Credentials::new(username, password, airline);
    debug!(
        "scrape request pilot={} force_refresh={}",
        key, request.force_refresh
    );

    let schedule = state
        .manager
        .get_schedule(key, credentials, request.force_refresh)
        .await?;

    Ok(Json(ScrapeResponse::from(schedule.as_ref())))
}

/// GET /health: liveness plus session manager counters.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.manager.health())
}

async fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "success": false, "error": "not found" })),
    )
        .into_response()
}

async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(ip) = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
    else {
        debug!("peer address unknown, skipping rate limit");
        return next.run(req).await;
    };

    match state.limiter.check(ip) {
        Ok(()) => next.run(req).await,
        Err(retry_after) => {
            let secs = retry_after.as_secs().max(1);
            warn!("rate limit exceeded for client {}", ip);
            let mut resp = (
                StatusCode::TOO_MANY_REQUESTS,
                Json(json!({
                    "success": false,
                    "error": "too many requests",
                    "retryAfter": secs,
                })),
            )
                .into_response();
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
            resp
        }
    }
}
