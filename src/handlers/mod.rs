//! HTTP handlers for operational endpoints

pub mod status;

pub use status::{
    health_handler, readiness_handler, status_handler, status_router, HealthResponse,
    LatencyHistogram, RelayStats, StatusResponse,
};
