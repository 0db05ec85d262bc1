//! Application state

use metrics_exporter_prometheus::PrometheusHandle;
use passage_auth::JwtManager;
use passage_core::SessionManager;
use passage_db::Database;
use std::sync::Arc;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub sessions: Arc<SessionManager>,
    pub jwt: Arc<JwtManager>,
}

impl AppState {
    pub fn new(db: Database, sessions: Arc<SessionManager>, jwt: Arc<JwtManager>) -> Self {
        Self { db, sessions, jwt }
    }
}

/// Handle for rendering the Prometheus exposition payload
#[derive(Clone)]
pub struct MetricsHandle {
    handle: PrometheusHandle,
}

impl MetricsHandle {
    pub fn new(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }
}
