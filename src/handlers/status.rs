//! Status and health check handlers for the EventSub relay.
//!
//! - `/status` - ingestion counters, socket state and ack latency
//! - `/health` - simple liveness probe
//! - `/ready` - readiness probe
//!
//! # Architecture
//!
//! ```text
//! WebhookReceiver ──┐
//!                   ├──> RelayStats ──> status_handler ──> JSON Response
//! SocketListener ───┘        │
//!                            └── LatencyHistogram (webhook ack latency)
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use hdrhistogram::Histogram;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tracing::{debug, instrument};

/// Server version from Cargo.toml
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Server name from Cargo.toml
pub const SERVER_NAME: &str = env!("CARGO_PKG_NAME");

// ============================================================================
// Response Types
// ============================================================================

/// Health check response for simple liveness probes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Health status (always "healthy" if responding)
    pub status: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "healthy".to_string(),
        }
    }
}

/// Detailed relay status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    /// Server version
    pub version: String,
    /// Server name
    pub name: String,
    /// Uptime in seconds
    pub uptime_seconds: u64,
    /// Webhook transport counters
    pub webhook: WebhookCounters,
    /// Socket transport counters
    pub socket: SocketCounters,
    /// Memory usage of the process
    pub memory: MemoryMetrics,
    /// Webhook acknowledgment latency
    pub ack_latency: LatencyMetrics,
    /// RFC 3339 time the status was generated
    pub timestamp: String,
}

/// Webhook transport counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookCounters {
    /// Deliveries received
    pub received: u64,
    /// Deliveries rejected (auth, replay, malformed)
    pub rejected: u64,
    /// Duplicate message ids acknowledged without dispatch
    pub duplicates: u64,
    /// Notifications scheduled for dispatch
    pub dispatched: u64,
}

/// Socket transport counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocketCounters {
    /// Current connection state
    pub state: String,
    /// Completed session handshakes
    pub sessions: u64,
    /// Failed or redirected connection attempts
    pub failed_attempts: u64,
    /// Notifications queued for dispatch
    pub notifications: u64,
}

/// Memory usage metrics collected from sysinfo.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MemoryMetrics {
    /// Resident Set Size (bytes)
    pub rss_bytes: u64,
    /// Virtual memory size (bytes)
    pub virtual_bytes: u64,
}

/// Latency percentiles in milliseconds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LatencyMetrics {
    /// Median
    pub p50_ms: f64,
    /// 95th percentile
    pub p95_ms: f64,
    /// 99th percentile
    pub p99_ms: f64,
    /// Samples recorded
    pub samples: u64,
    /// Maximum in milliseconds
    pub max_ms: f64,
}

// ============================================================================
// Latency Histogram
// ============================================================================

/// Thread-safe latency histogram tracking 1us to 60s with 3 significant figures.
#[derive(Debug)]
pub struct LatencyHistogram {
    inner: RwLock<Histogram<u64>>,
}

impl LatencyHistogram {
    /// Create a new latency histogram.
    pub fn new() -> Self {
        let histogram =
            Histogram::new_with_bounds(1, 60_000_000, 3).expect("Failed to create histogram");
        Self {
            inner: RwLock::new(histogram),
        }
    }

    /// Record a latency duration; out-of-range values are ignored.
    pub fn record(&self, duration: Duration) {
        let micros = (duration.as_micros() as u64).max(1);
        let _ = self.inner.write().record(micros);
    }

    /// Percentile summary in milliseconds.
    pub fn metrics(&self) -> LatencyMetrics {
        let hist = self.inner.read();
        LatencyMetrics {
            p50_ms: hist.value_at_percentile(50.0) as f64 / 1000.0,
            p95_ms: hist.value_at_percentile(95.0) as f64 / 1000.0,
            p99_ms: hist.value_at_percentile(99.0) as f64 / 1000.0,
            samples: hist.len(),
            max_ms: hist.max() as f64 / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Relay Stats
// ============================================================================

/// Shared ingestion counters, updated by both transports.
///
/// All counters are atomics; the socket state and histogram sit behind
/// short-lived `parking_lot` locks.
#[derive(Debug)]
pub struct RelayStats {
    start_time: Instant,
    webhooks_received: AtomicU64,
    webhooks_rejected: AtomicU64,
    webhook_duplicates: AtomicU64,
    webhooks_dispatched: AtomicU64,
    socket_state: Mutex<&'static str>,
    socket_sessions: AtomicU64,
    socket_failed_attempts: AtomicU64,
    socket_notifications: AtomicU64,
    ack_latency: LatencyHistogram,
}

impl RelayStats {
    /// Create zeroed stats
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            webhooks_received: AtomicU64::new(0),
            webhooks_rejected: AtomicU64::new(0),
            webhook_duplicates: AtomicU64::new(0),
            webhooks_dispatched: AtomicU64::new(0),
            socket_state: Mutex::new("idle"),
            socket_sessions: AtomicU64::new(0),
            socket_failed_attempts: AtomicU64::new(0),
            socket_notifications: AtomicU64::new(0),
            ack_latency: LatencyHistogram::new(),
        }
    }

    /// Uptime in seconds
    #[inline]
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Count a received delivery and its ack latency
    pub fn record_webhook(&self, latency: Duration) {
        self.webhooks_received.fetch_add(1, Ordering::Relaxed);
        self.ack_latency.record(latency);
    }

    /// Count a rejected delivery
    #[inline]
    pub fn record_rejection(&self) {
        self.webhooks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a suppressed duplicate
    #[inline]
    pub fn record_duplicate(&self) {
        self.webhook_duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a webhook notification scheduled for dispatch
    #[inline]
    pub fn record_webhook_dispatch(&self) {
        self.webhooks_dispatched.fetch_add(1, Ordering::Relaxed);
    }

    /// Publish the listener's connection state
    pub fn set_socket_state(&self, state: &'static str) {
        *self.socket_state.lock() = state;
    }

    /// Count a completed session handshake
    #[inline]
    pub fn record_socket_session(&self) {
        self.socket_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a failed connection attempt
    #[inline]
    pub fn record_socket_failure(&self) {
        self.socket_failed_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Count a socket notification queued for dispatch
    #[inline]
    pub fn record_socket_notification(&self) {
        self.socket_notifications.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of webhook counters
    pub fn webhook_counters(&self) -> WebhookCounters {
        WebhookCounters {
            received: self.webhooks_received.load(Ordering::Relaxed),
            rejected: self.webhooks_rejected.load(Ordering::Relaxed),
            duplicates: self.webhook_duplicates.load(Ordering::Relaxed),
            dispatched: self.webhooks_dispatched.load(Ordering::Relaxed),
        }
    }

    /// Snapshot of socket counters
    pub fn socket_counters(&self) -> SocketCounters {
        SocketCounters {
            state: self.socket_state.lock().to_string(),
            sessions: self.socket_sessions.load(Ordering::Relaxed),
            failed_attempts: self.socket_failed_attempts.load(Ordering::Relaxed),
            notifications: self.socket_notifications.load(Ordering::Relaxed),
        }
    }

    /// Webhook ack latency percentiles
    pub fn ack_latency(&self) -> LatencyMetrics {
        self.ack_latency.metrics()
    }
}

impl Default for RelayStats {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// System Metrics Collection
// ============================================================================

fn collect_memory_metrics() -> MemoryMetrics {
    let pid = Pid::from_u32(std::process::id());
    let mut system = System::new();
    system.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);

    match system.process(pid) {
        Some(process) => MemoryMetrics {
            rss_bytes: process.memory(),
            virtual_bytes: process.virtual_memory(),
        },
        None => {
            debug!("Could not find current process in sysinfo");
            MemoryMetrics::default()
        }
    }
}

// ============================================================================
// HTTP Handlers
// ============================================================================

/// `GET /health`: always 200 while the process serves requests.
#[instrument(skip_all)]
pub async fn health_handler() -> impl IntoResponse {
    debug!("Health check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

/// `GET /status`: counters, socket state, memory and ack latency.
///
/// ```bash
/// curl http://localhost:8080/status
/// # {
/// #   "version": "0.1.1",
/// #   "name": "eventsub-relay",
/// #   "uptime_seconds": 3600,
/// #   "webhook": {"received": 120, "rejected": 2, "duplicates": 5, "dispatched": 113},
/// #   "socket": {"state": "listening", "sessions": 3, "failed_attempts": 2, "notifications": 40},
/// #   ...
/// # }
/// ```
#[instrument(skip_all)]
pub async fn status_handler(State(stats): State<Arc<RelayStats>>) -> impl IntoResponse {
    debug!("Status check requested");

    let response = StatusResponse {
        version: SERVER_VERSION.to_string(),
        name: SERVER_NAME.to_string(),
        uptime_seconds: stats.uptime_seconds(),
        webhook: stats.webhook_counters(),
        socket: stats.socket_counters(),
        memory: collect_memory_metrics(),
        ack_latency: stats.ack_latency(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    };

    (StatusCode::OK, Json(response))
}

/// `GET /ready`: mirrors the health check.
#[instrument(skip_all)]
pub async fn readiness_handler() -> impl IntoResponse {
    debug!("Readiness check requested");
    (StatusCode::OK, Json(HealthResponse::default()))
}

// ============================================================================
// Router Setup
// ============================================================================

/// Router with `/health`, `/status` and `/ready`.
pub fn status_router(stats: Arc<RelayStats>) -> axum::Router {
    use axum::routing::get;

    axum::Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .route("/ready", get(readiness_handler))
        .with_state(stats)
}

// ============================================================================
// Tests
// ============================================================================
