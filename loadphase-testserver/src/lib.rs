use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Json;
use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::post;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::time::{Duration, sleep};

pub const PATH_APPLY: &str = "/coupon/apply";

pub const DEFAULT_COUPON_LIMIT: u64 = 100;

/// Behaviour of the emulated coupon endpoint.
#[derive(Debug, Clone)]
pub struct CouponConfig {
    /// Number of coupons that can be issued before every new applicant gets 422.
    pub limit: u64,
    /// Added to every apply request before it is handled.
    pub delay: Duration,
    /// Every n-th apply request answers 503 without touching state. 0 disables.
    pub fail_every: u64,
}

impl Default for CouponConfig {
    fn default() -> Self {
        Self {
            limit: DEFAULT_COUPON_LIMIT,
            delay: Duration::ZERO,
            fail_every: 0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    issued: Arc<AtomicU64>,
    duplicates: Arc<AtomicU64>,
    exhausted: Arc<AtomicU64>,
    faults: Arc<AtomicU64>,
}

impl TestServerStats {
    fn inc_requests_total(&self) -> u64 {
        self.requests_total.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    pub fn issued(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn exhausted(&self) -> u64 {
        self.exhausted.load(Ordering::Relaxed)
    }

    pub fn faults(&self) -> u64 {
        self.faults.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Default)]
struct Ledger {
    applied: HashSet<u64>,
    issued: u64,
}

#[derive(Clone)]
struct AppState {
    config: Arc<CouponConfig>,
    ledger: Arc<Mutex<Ledger>>,
    stats: TestServerStats,
}

#[derive(Debug, Deserialize)]
struct ApplyQuery {
    #[serde(rename = "userId")]
    user_id: Option<u64>,
}

#[derive(Debug, Serialize)]
struct ApplyResponse {
    status: &'static str,
    #[serde(rename = "userId", skip_serializing_if = "Option::is_none")]
    user_id: Option<u64>,
}

fn reply(
    code: StatusCode,
    status: &'static str,
    user_id: Option<u64>,
) -> (StatusCode, Json<ApplyResponse>) {
    (code, Json(ApplyResponse { status, user_id }))
}

async fn handle_apply(
    State(state): State<AppState>,
    Query(query): Query<ApplyQuery>,
) -> (StatusCode, Json<ApplyResponse>) {
    let seq = state.stats.inc_requests_total();

    if !state.config.delay.is_zero() {
        sleep(state.config.delay).await;
    }

    if state.config.fail_every > 0 && seq % state.config.fail_every == 0 {
        state.stats.faults.fetch_add(1, Ordering::Relaxed);
        return reply(StatusCode::SERVICE_UNAVAILABLE, "unavailable", None);
    }

    let Some(user_id) = query.user_id else {
        return reply(StatusCode::BAD_REQUEST, "missing_user_id", None);
    };

    let mut ledger = state.ledger.lock().await;

    // A user is remembered even when the pool is already empty.
    if !ledger.applied.insert(user_id) {
        state.stats.duplicates.fetch_add(1, Ordering::Relaxed);
        return reply(StatusCode::CONFLICT, "duplicate", Some(user_id));
    }

    ledger.issued += 1;
    if ledger.issued > state.config.limit {
        state.stats.exhausted.fetch_add(1, Ordering::Relaxed);
        return reply(StatusCode::UNPROCESSABLE_ENTITY, "exhausted", Some(user_id));
    }

    state.stats.issued.fetch_add(1, Ordering::Relaxed);
    reply(StatusCode::OK, "issued", Some(user_id))
}

pub fn router(config: CouponConfig, stats: TestServerStats) -> Router {
    let state = AppState {
        config: Arc::new(config),
        ledger: Arc::new(Mutex::new(Ledger::default())),
        stats,
    };

    Router::new()
        .route(PATH_APPLY, post(handle_apply))
        .with_state(state)
}

pub struct TestServer {
    addr: SocketAddr,
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        Self::start_with(CouponConfig::default()).await
    }

    pub async fn start_with(config: CouponConfig) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();
        let app = router(config, stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            addr,
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn apply_url(&self, user_id: u64) -> String {
        format!("{}{PATH_APPLY}?userId={user_id}", self.base_url)
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
